//! Aggregation pipelines. A leading run of `$match` stages and an optional
//! `$sort` after them are answered by the planner; the rest runs in memory
//! under the operation collation.

use std::cmp::Ordering;

use bson::{Bson, Document, doc};
use tessera_collation::Collator;
use tessera_query::value::{compare_values, values_equal};
use tessera_query::{Expression, Projection, Sort, SortDirection, parse_filter, parse_sort, path};

use crate::error::DbError;
use crate::expression::{matches, sort_value};

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Field(String),
    Literal(Bson),
}

impl Operand {
    fn parse(value: &Bson) -> Operand {
        match value {
            Bson::String(s) if s.starts_with('$') => Operand::Field(s[1..].to_string()),
            other => Operand::Literal(other.clone()),
        }
    }

    /// Missing fields evaluate to `None`.
    fn evaluate(&self, doc: &Document) -> Option<Bson> {
        match self {
            Operand::Field(field) => path::get(doc, field).cloned(),
            Operand::Literal(value) => Some(value.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Accumulator {
    Sum(Operand),
    First(Operand),
    Push(Operand),
    AddToSet(Operand),
}

#[derive(Debug, Clone)]
pub(crate) struct GroupSpec {
    id: Operand,
    fields: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub(crate) enum Stage {
    Match(Expression),
    Sort(Vec<Sort>),
    Skip(u64),
    Limit(u64),
    Project(Projection),
    Count(String),
    Group(GroupSpec),
}

/// A pipeline split into the part the planner answers and the rest.
#[derive(Debug, Clone, Default)]
pub(crate) struct Pipeline {
    pub filter: Document,
    pub sort: Option<Document>,
    pub stages: Vec<Stage>,
}

pub(crate) fn parse_pipeline(pipeline: &[Document]) -> Result<Pipeline, DbError> {
    let mut out = Pipeline::default();
    let mut filters = Vec::new();
    let mut leading = true;

    for spec in pipeline {
        let mut entries = spec.iter();
        let (Some((name, arg)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::BadValue(
                "A pipeline stage specification object must contain exactly one field.".into(),
            ));
        };
        match (name.as_str(), arg) {
            ("$match", Bson::Document(filter)) => {
                if leading && out.sort.is_none() {
                    filters.push(Bson::Document(filter.clone()));
                } else {
                    out.stages.push(Stage::Match(parse_filter(filter)?));
                }
            }
            ("$sort", Bson::Document(sort)) => {
                if leading && out.sort.is_none() {
                    out.sort = Some(sort.clone());
                } else {
                    out.stages.push(Stage::Sort(parse_sort(sort)?));
                }
                leading = false;
            }
            ("$skip", n) => {
                out.stages.push(Stage::Skip(count_arg("$skip", n)?));
                leading = false;
            }
            ("$limit", n) => {
                let n = count_arg("$limit", n)?;
                if n == 0 {
                    return Err(DbError::BadValue("the limit must be positive".into()));
                }
                out.stages.push(Stage::Limit(n));
                leading = false;
            }
            ("$project", Bson::Document(projection)) => {
                out.stages.push(Stage::Project(Projection::parse(projection)?));
                leading = false;
            }
            ("$count", Bson::String(field)) => {
                if field.is_empty() || field.starts_with('$') || field.contains('.') {
                    return Err(DbError::BadValue(format!("invalid $count field name: {field}")));
                }
                out.stages.push(Stage::Count(field.clone()));
                leading = false;
            }
            ("$group", Bson::Document(group)) => {
                out.stages.push(Stage::Group(parse_group(group)?));
                leading = false;
            }
            ("$match" | "$sort" | "$project" | "$group" | "$count", other) => {
                return Err(DbError::BadValue(format!(
                    "the {name} stage specification must be an object, got {other}"
                )));
            }
            _ => return Err(DbError::UnrecognizedPipelineStage(name.clone())),
        }
    }

    out.filter = match filters.len() {
        0 => Document::new(),
        1 => match filters.pop() {
            Some(Bson::Document(d)) => d,
            _ => Document::new(),
        },
        _ => doc! { "$and": filters },
    };
    Ok(out)
}

fn count_arg(stage: &str, value: &Bson) -> Result<u64, DbError> {
    let n = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(d) if d.fract() == 0.0 => *d as i64,
        other => {
            return Err(DbError::BadValue(format!(
                "{stage} argument must be a number, got {other}"
            )));
        }
    };
    u64::try_from(n).map_err(|_| DbError::BadValue(format!("{stage} argument must be non-negative")))
}

fn parse_group(spec: &Document) -> Result<GroupSpec, DbError> {
    let id = spec
        .get("_id")
        .map(Operand::parse)
        .ok_or_else(|| DbError::BadValue("a group specification must include an _id".into()))?;
    let mut fields = Vec::new();
    for (name, value) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(acc) = value else {
            return Err(DbError::BadValue(format!("the field '{name}' must be an accumulator object")));
        };
        let mut entries = acc.iter();
        let (Some((op, arg)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::BadValue(format!(
                "the field '{name}' must specify one accumulator"
            )));
        };
        let operand = Operand::parse(arg);
        let accumulator = match op.as_str() {
            "$sum" => Accumulator::Sum(operand),
            "$first" => Accumulator::First(operand),
            "$push" => Accumulator::Push(operand),
            "$addToSet" => Accumulator::AddToSet(operand),
            other => return Err(DbError::BadValue(format!("unknown group operator '{other}'"))),
        };
        fields.push((name.clone(), accumulator));
    }
    Ok(GroupSpec { id, fields })
}

// ── Execution ───────────────────────────────────────────────────

pub(crate) fn run_stages(
    mut docs: Vec<Document>,
    stages: &[Stage],
    collator: Option<&Collator>,
) -> Result<Vec<Document>, DbError> {
    for stage in stages {
        docs = match stage {
            Stage::Match(expr) => docs.into_iter().filter(|d| matches(d, expr, collator)).collect(),
            Stage::Sort(sorts) => sort_documents(docs, sorts, collator),
            Stage::Skip(n) => docs
                .into_iter()
                .skip(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Stage::Limit(n) => docs
                .into_iter()
                .take(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Stage::Project(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
            Stage::Count(field) => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), count_value(docs.len()));
                    vec![out]
                }
            }
            Stage::Group(spec) => group(&docs, spec, collator),
        };
    }
    Ok(docs)
}

fn count_value(n: usize) -> Bson {
    match i32::try_from(n) {
        Ok(n) => Bson::Int32(n),
        Err(_) => Bson::Int64(n as i64),
    }
}

fn sort_documents(docs: Vec<Document>, sorts: &[Sort], collator: Option<&Collator>) -> Vec<Document> {
    let mut keyed: Vec<(Vec<Bson>, Document)> = docs
        .into_iter()
        .map(|d| {
            let keys = sorts
                .iter()
                .map(|s| sort_value(&d, &s.field, s.direction, collator))
                .collect();
            (keys, d)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), sort) in a.iter().zip(b).zip(sorts) {
            let ord = compare_values(x, y, collator);
            let ord = match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    keyed.into_iter().map(|(_, d)| d).collect()
}

enum Accumulated {
    Sum { int: i64, float: f64, is_float: bool },
    First(Option<Bson>),
    Values(Vec<Bson>),
}

impl Accumulated {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => Accumulated::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            Accumulator::First(_) => Accumulated::First(None),
            Accumulator::Push(_) | Accumulator::AddToSet(_) => Accumulated::Values(Vec::new()),
        }
    }

    fn add(&mut self, acc: &Accumulator, doc: &Document, seen_first: bool, collator: Option<&Collator>) {
        match (self, acc) {
            (Accumulated::Sum { int, float, is_float }, Accumulator::Sum(operand)) => {
                match operand.evaluate(doc) {
                    Some(Bson::Int32(n)) => *int += i64::from(n),
                    Some(Bson::Int64(n)) => *int += n,
                    Some(Bson::Double(d)) => {
                        *float += d;
                        *is_float = true;
                    }
                    _ => {}
                }
            }
            (Accumulated::First(value), Accumulator::First(operand)) => {
                if !seen_first {
                    *value = Some(operand.evaluate(doc).unwrap_or(Bson::Null));
                }
            }
            (Accumulated::Values(values), Accumulator::Push(operand)) => {
                if let Some(v) = operand.evaluate(doc) {
                    values.push(v);
                }
            }
            (Accumulated::Values(values), Accumulator::AddToSet(operand)) => {
                if let Some(v) = operand.evaluate(doc)
                    && !values.iter().any(|existing| values_equal(existing, &v, collator))
                {
                    values.push(v);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulated::Sum { int, float, is_float } => {
                if is_float {
                    Bson::Double(float + int as f64)
                } else {
                    match i32::try_from(int) {
                        Ok(n) => Bson::Int32(n),
                        Err(_) => Bson::Int64(int),
                    }
                }
            }
            Accumulated::First(value) => value.unwrap_or(Bson::Null),
            Accumulated::Values(values) => Bson::Array(values),
        }
    }
}

/// Group in first-seen order; group keys compare under the collation.
fn group(docs: &[Document], spec: &GroupSpec, collator: Option<&Collator>) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<Accumulated>)> = Vec::new();
    for doc in docs {
        let key = spec.id.evaluate(doc).unwrap_or(Bson::Null);
        let position = groups
            .iter()
            .position(|(k, _)| values_equal(k, &key, collator));
        let (index, seen) = match position {
            Some(i) => (i, true),
            None => {
                let accs = spec.fields.iter().map(|(_, a)| Accumulated::new(a)).collect();
                groups.push((key, accs));
                (groups.len() - 1, false)
            }
        };
        for (state, (_, acc)) in groups[index].1.iter_mut().zip(&spec.fields) {
            state.add(acc, doc, seen, collator);
        }
    }

    groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = doc! { "_id": key };
            for (state, (name, _)) in accs.into_iter().zip(&spec.fields) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}
