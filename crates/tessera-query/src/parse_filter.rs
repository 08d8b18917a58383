use bson::{Bson, Document};
use regex::Regex;

use crate::error::QueryError;
use crate::expression::Expression;

/// Parse a BSON filter document into an Expression tree.
///
/// Follows MongoDB query semantics:
/// - Top-level document is an implicit AND of all entries
/// - `{ "field": value }` is implicit `$eq`
/// - `{ "field": { "$gt": v } }` uses operator sub-documents
/// - `{ "$or": [...] }` / `{ "$and": [...] }` / `{ "$nor": [...] }` for logical ops
/// - `{ "field": { "$regex": "pattern", "$options": "i" } }` for regex
/// - `{ "field": { "$exists": true } }` for field existence checks
///
/// The empty document parses to the always-true expression.
pub fn parse_filter(doc: &Document) -> Result<Expression, QueryError> {
    let mut children = Vec::new();

    for (key, value) in doc {
        match key.as_str() {
            "$and" => children.push(parse_logical_array(key, value, Expression::And)?),
            "$or" => children.push(parse_logical_array(key, value, Expression::Or)?),
            "$nor" => children.push(parse_logical_array(key, value, Expression::Nor)?),
            "$comment" => {}
            k if k.starts_with('$') => {
                return Err(QueryError::bad_value(format!(
                    "unknown top level operator: {k}"
                )));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    Ok(Expression::and(children))
}

/// Parse a `$and`, `$or` or `$nor` array value into a logical expression.
fn parse_logical_array(
    op: &str,
    value: &Bson,
    make: fn(Vec<Expression>) -> Expression,
) -> Result<Expression, QueryError> {
    let arr = match value {
        Bson::Array(a) => a,
        _ => return Err(QueryError::bad_value(format!("{op} must be an array"))),
    };

    let mut children = Vec::with_capacity(arr.len());
    for elem in arr {
        match elem {
            Bson::Document(sub_doc) => children.push(parse_filter(sub_doc)?),
            _ => {
                return Err(QueryError::bad_value(format!(
                    "{op} argument's entries must be objects"
                )));
            }
        }
    }

    if children.is_empty() {
        return Err(QueryError::bad_value(format!(
            "{op} argument must be a non-empty array"
        )));
    }

    Ok(make(children))
}

/// Parse a field condition: either implicit $eq or an operator sub-document.
fn parse_field_condition(field: &str, value: &Bson) -> Result<Expression, QueryError> {
    // A document whose first key starts with $ is an operator doc
    if let Bson::Document(sub_doc) = value
        && let Some(first_key) = sub_doc.keys().next()
        && first_key.starts_with('$')
    {
        return parse_operator_doc(field, sub_doc);
    }

    Ok(Expression::Eq(field.to_string(), value.clone()))
}

/// Parse an operator sub-document like `{ "$gt": 21, "$lte": 100 }`.
fn parse_operator_doc(field: &str, doc: &Document) -> Result<Expression, QueryError> {
    let mut conditions: Vec<Expression> = Vec::new();
    let f = || field.to_string();

    for (op_key, op_value) in doc {
        // $regex consumes its $options sibling
        if op_key == "$regex" {
            conditions.push(parse_regex(field, doc)?);
            continue;
        }

        let expr = match op_key.as_str() {
            "$eq" => Expression::Eq(f(), op_value.clone()),
            "$ne" => Expression::Ne(f(), op_value.clone()),
            "$gt" => Expression::Gt(f(), op_value.clone()),
            "$gte" => Expression::Gte(f(), op_value.clone()),
            "$lt" => Expression::Lt(f(), op_value.clone()),
            "$lte" => Expression::Lte(f(), op_value.clone()),
            "$in" => Expression::In(f(), expect_array(op_key, op_value)?),
            "$nin" => Expression::Nin(f(), expect_array(op_key, op_value)?),
            "$exists" => Expression::Exists(f(), truthy(op_value)),
            "$options" => {
                if doc.contains_key("$regex") {
                    continue;
                }
                return Err(QueryError::bad_value("$options needs a $regex"));
            }
            k if k.starts_with('$') => {
                return Err(QueryError::bad_value(format!("unknown operator: {k}")));
            }
            _ => {
                return Err(QueryError::bad_value(format!(
                    "cannot mix operators and fields under '{field}'"
                )));
            }
        };
        conditions.push(expr);
    }

    match conditions.len() {
        0 => Err(QueryError::bad_value("empty operator document")),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Expression::And(conditions)),
    }
}

fn expect_array(op: &str, value: &Bson) -> Result<Vec<Bson>, QueryError> {
    match value {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(QueryError::bad_value(format!("{op} needs an array"))),
    }
}

/// `$exists` accepts any value; numbers and booleans are read for truth.
fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Parse a `$regex` + optional `$options` pair.
fn parse_regex(field: &str, doc: &Document) -> Result<Expression, QueryError> {
    let pattern = match doc.get("$regex") {
        Some(Bson::String(s)) => s.as_str(),
        _ => return Err(QueryError::bad_value("$regex has to be a string")),
    };
    let options = match doc.get("$options") {
        Some(Bson::String(s)) => Some(s.as_str()),
        None => None,
        Some(_) => return Err(QueryError::bad_value("$options has to be a string")),
    };

    // Build final pattern with flags
    let full_pattern = match options {
        Some(opts) if !opts.is_empty() => {
            let mut prefix = String::with_capacity(4 + opts.len() + pattern.len());
            prefix.push_str("(?");
            for ch in opts.chars() {
                match ch {
                    'i' | 's' | 'm' | 'x' => prefix.push(ch),
                    c => {
                        return Err(QueryError::bad_value(format!(
                            "invalid flag in regex options: {c}"
                        )));
                    }
                }
            }
            prefix.push(')');
            prefix.push_str(pattern);
            prefix
        }
        _ => pattern.to_string(),
    };

    let re = Regex::new(&full_pattern)
        .map_err(|e| QueryError::bad_value(format!("regular expression is invalid: {e}")))?;

    Ok(Expression::Regex(field.to_string(), re))
}
