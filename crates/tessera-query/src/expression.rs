use bson::{Bson, Document, doc};
use regex::Regex;

/// A recursive filter expression tree.
///
/// Owns field names and values so the expression can outlive the document
/// it was parsed from. The empty `And` matches every document.
#[derive(Debug, Clone)]
pub enum Expression {
    // Logical
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Nor(Vec<Expression>),
    // Comparison
    Eq(String, Bson),
    Ne(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Lte(String, Bson),
    In(String, Vec<Bson>),
    Nin(String, Vec<Bson>),
    // Pattern
    Regex(String, Regex),
    // Existence
    Exists(String, bool),
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        use Expression::*;
        match (self, other) {
            (And(a), And(b)) | (Or(a), Or(b)) | (Nor(a), Nor(b)) => a == b,
            (Eq(fa, va), Eq(fb, vb))
            | (Ne(fa, va), Ne(fb, vb))
            | (Gt(fa, va), Gt(fb, vb))
            | (Gte(fa, va), Gte(fb, vb))
            | (Lt(fa, va), Lt(fb, vb))
            | (Lte(fa, va), Lte(fb, vb)) => fa == fb && va == vb,
            (In(fa, va), In(fb, vb)) | (Nin(fa, va), Nin(fb, vb)) => fa == fb && va == vb,
            (Regex(fa, ra), Regex(fb, rb)) => fa == fb && ra.as_str() == rb.as_str(),
            (Exists(fa, a), Exists(fb, b)) => fa == fb && a == b,
            _ => false,
        }
    }
}

impl Expression {
    /// The expression that matches everything.
    pub fn always() -> Self {
        Expression::And(Vec::new())
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Expression::And(children) if children.is_empty())
    }

    /// Conjoin, flattening nested ANDs. A single child is returned as-is.
    pub fn and(children: Vec<Expression>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Expression::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or_else(Expression::always)
        } else {
            Expression::And(flat)
        }
    }

    /// Top-level conjuncts: the children of an AND, or the expression itself.
    pub fn conjuncts(&self) -> Vec<&Expression> {
        match self {
            Expression::And(children) => children.iter().collect(),
            other => vec![other],
        }
    }

    /// The field a leaf predicate constrains.
    pub fn field(&self) -> Option<&str> {
        match self {
            Expression::Eq(f, _)
            | Expression::Ne(f, _)
            | Expression::Gt(f, _)
            | Expression::Gte(f, _)
            | Expression::Lt(f, _)
            | Expression::Lte(f, _)
            | Expression::In(f, _)
            | Expression::Nin(f, _)
            | Expression::Regex(f, _)
            | Expression::Exists(f, _) => Some(f),
            Expression::And(_) | Expression::Or(_) | Expression::Nor(_) => None,
        }
    }

    /// Every field path referenced anywhere in the tree.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::And(c) | Expression::Or(c) | Expression::Nor(c) => {
                for child in c {
                    child.collect_fields(out);
                }
            }
            leaf => {
                if let Some(f) = leaf.field()
                    && !out.contains(&f)
                {
                    out.push(f);
                }
            }
        }
    }

    /// Fields pinned to a single value by top-level equalities.
    ///
    /// Used to seed the document an upsert inserts.
    pub fn equality_seed(&self) -> Vec<(&str, &Bson)> {
        self.conjuncts()
            .into_iter()
            .filter_map(|c| match c {
                Expression::Eq(f, v) => Some((f.as_str(), v)),
                Expression::In(f, vs) if vs.len() == 1 => Some((f.as_str(), &vs[0])),
                _ => None,
            })
            .collect()
    }

    /// Render back to filter-document form.
    pub fn to_document(&self) -> Document {
        match self {
            Expression::And(c) if c.is_empty() => Document::new(),
            Expression::And(c) => doc! { "$and": children_to_bson(c) },
            Expression::Or(c) => doc! { "$or": children_to_bson(c) },
            Expression::Nor(c) => doc! { "$nor": children_to_bson(c) },
            Expression::Eq(f, v) => operator_doc(f, "$eq", v.clone()),
            Expression::Ne(f, v) => operator_doc(f, "$ne", v.clone()),
            Expression::Gt(f, v) => operator_doc(f, "$gt", v.clone()),
            Expression::Gte(f, v) => operator_doc(f, "$gte", v.clone()),
            Expression::Lt(f, v) => operator_doc(f, "$lt", v.clone()),
            Expression::Lte(f, v) => operator_doc(f, "$lte", v.clone()),
            Expression::In(f, vs) => operator_doc(f, "$in", Bson::Array(vs.clone())),
            Expression::Nin(f, vs) => operator_doc(f, "$nin", Bson::Array(vs.clone())),
            Expression::Regex(f, re) => operator_doc(f, "$regex", Bson::String(re.as_str().into())),
            Expression::Exists(f, b) => operator_doc(f, "$exists", Bson::Boolean(*b)),
        }
    }
}

fn children_to_bson(children: &[Expression]) -> Vec<Bson> {
    children.iter().map(|c| Bson::Document(c.to_document())).collect()
}

fn operator_doc(field: &str, op: &str, value: Bson) -> Document {
    let mut inner = Document::new();
    inner.insert(op, value);
    let mut outer = Document::new();
    outer.insert(field, inner);
    outer
}
