//! Update documents: operator form (`$set`, `$unset`, `$inc`, `$setOnInsert`)
//! or whole-document replacement.

use bson::{Bson, Document};

use crate::error::QueryError;
use crate::path;

/// A single field-level update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Set a field to a value. Creates the field if it doesn't exist.
    Set(String, Bson),
    /// Remove a field from the document.
    Unset(String),
    /// Increment a numeric field by the given amount.
    Inc(String, Bson),
    /// Like `Set`, but only when the update inserts a new document.
    SetOnInsert(String, Bson),
}

impl UpdateOp {
    fn field(&self) -> &str {
        match self {
            UpdateOp::Set(f, _)
            | UpdateOp::Unset(f)
            | UpdateOp::Inc(f, _)
            | UpdateOp::SetOnInsert(f, _) => f,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    Operators(Vec<UpdateOp>),
    Replacement(Document),
}

/// Parse an update document. Documents whose keys are all operators are
/// operator updates; documents without operator keys are replacements.
pub fn parse_update(doc: &Document) -> Result<UpdateSpec, QueryError> {
    let has_operator = doc.keys().any(|k| k.starts_with('$'));
    if !has_operator {
        return Ok(UpdateSpec::Replacement(doc.clone()));
    }

    let mut ops = Vec::new();
    for (key, value) in doc {
        let fields = match value {
            Bson::Document(d) => d,
            _ => {
                return Err(QueryError::FailedToParse(format!(
                    "modifiers operate on fields but we found type {} instead",
                    type_label(value)
                )));
            }
        };
        for (field, arg) in fields {
            let op = match key.as_str() {
                "$set" => UpdateOp::Set(field.clone(), arg.clone()),
                "$unset" => UpdateOp::Unset(field.clone()),
                "$setOnInsert" => UpdateOp::SetOnInsert(field.clone(), arg.clone()),
                "$inc" => {
                    if !crate::value::is_number(arg) {
                        return Err(QueryError::TypeMismatch(format!(
                            "cannot increment with non-numeric argument: {{{field}: {arg}}}"
                        )));
                    }
                    UpdateOp::Inc(field.clone(), arg.clone())
                }
                k if k.starts_with('$') => {
                    return Err(QueryError::FailedToParse(format!("unknown modifier: {k}")));
                }
                _ => {
                    return Err(QueryError::FailedToParse(
                        "update document cannot mix operators and fields".into(),
                    ));
                }
            };
            ops.push(op);
        }
    }

    for op in &ops {
        let root = op.field().split('.').next().unwrap_or_default();
        if root == "_id" {
            return Err(QueryError::ImmutableField(op.field().to_string()));
        }
    }

    if ops.is_empty() {
        return Err(QueryError::FailedToParse("'update' is empty".into()));
    }

    Ok(UpdateSpec::Operators(ops))
}

impl UpdateSpec {
    /// Apply to `doc`, returning the new document. `inserting` enables
    /// `$setOnInsert`. The `_id` of `doc` is always preserved.
    pub fn apply(&self, doc: &Document, inserting: bool) -> Result<Document, QueryError> {
        match self {
            UpdateSpec::Replacement(replacement) => {
                let mut out = Document::new();
                match (doc.get("_id"), replacement.get("_id")) {
                    (Some(old), Some(new)) if old != new => {
                        return Err(QueryError::ImmutableField("_id".into()));
                    }
                    (Some(id), _) | (None, Some(id)) => {
                        out.insert("_id", id.clone());
                    }
                    (None, None) => {}
                }
                for (k, v) in replacement {
                    if k != "_id" {
                        out.insert(k.clone(), v.clone());
                    }
                }
                Ok(out)
            }
            UpdateSpec::Operators(ops) => {
                let mut out = doc.clone();
                for op in ops {
                    match op {
                        UpdateOp::Set(field, value) => path::set(&mut out, field, value.clone())?,
                        UpdateOp::SetOnInsert(field, value) if inserting => {
                            path::set(&mut out, field, value.clone())?
                        }
                        UpdateOp::SetOnInsert(..) => {}
                        UpdateOp::Unset(field) => {
                            path::remove(&mut out, field);
                        }
                        UpdateOp::Inc(field, amount) => {
                            let next = match path::get(&out, field) {
                                None => amount.clone(),
                                Some(current) => add_numbers(current, amount).ok_or_else(|| {
                                    QueryError::TypeMismatch(format!(
                                        "cannot apply $inc to a value of non-numeric type at '{field}'"
                                    ))
                                })?,
                            };
                            path::set(&mut out, field, next)?;
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    Some(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match x.checked_add(*y) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*x) + i64::from(*y)),
        },
        (Bson::Int32(x), Bson::Int64(y)) => Bson::Int64(i64::from(*x).checked_add(*y)?),
        (Bson::Int64(x), Bson::Int32(y)) => Bson::Int64(x.checked_add(i64::from(*y))?),
        (Bson::Int64(x), Bson::Int64(y)) => Bson::Int64(x.checked_add(*y)?),
        _ => Bson::Double(crate::value::as_f64(a)? + crate::value::as_f64(b)?),
    })
}

fn type_label(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Null => "null",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "number",
        _ => "value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_unset_inc() {
        let spec = parse_update(&doc! {
            "$set": { "a.b": "x" },
            "$unset": { "gone": "" },
            "$inc": { "n": 2 },
        })
        .unwrap();
        let out = spec
            .apply(&doc! { "_id": 1, "gone": true, "n": 40 }, false)
            .unwrap();
        assert_eq!(out, doc! { "_id": 1, "n": 42, "a": { "b": "x" } });
    }

    #[test]
    fn set_on_insert_only_when_inserting() {
        let spec = parse_update(&doc! { "$setOnInsert": { "created": true } }).unwrap();
        assert_eq!(spec.apply(&doc! { "_id": 1 }, false).unwrap(), doc! { "_id": 1 });
        assert_eq!(
            spec.apply(&doc! { "_id": 1 }, true).unwrap(),
            doc! { "_id": 1, "created": true }
        );
    }

    #[test]
    fn replacement_keeps_id() {
        let spec = parse_update(&doc! { "str": "bar" }).unwrap();
        let out = spec.apply(&doc! { "_id": 7, "str": "foo", "x": 1 }, false).unwrap();
        assert_eq!(out, doc! { "_id": 7, "str": "bar" });
    }

    #[test]
    fn replacement_cannot_change_id() {
        let spec = parse_update(&doc! { "_id": 8 }).unwrap();
        let err = spec.apply(&doc! { "_id": 7 }, false).unwrap_err();
        assert!(matches!(err, QueryError::ImmutableField(_)));
    }

    #[test]
    fn operators_cannot_target_id() {
        let err = parse_update(&doc! { "$set": { "_id": 1 } }).unwrap_err();
        assert!(matches!(err, QueryError::ImmutableField(_)));
    }

    #[test]
    fn inc_requires_numbers() {
        assert!(matches!(
            parse_update(&doc! { "$inc": { "n": "x" } }).unwrap_err(),
            QueryError::TypeMismatch(_)
        ));
        let spec = parse_update(&doc! { "$inc": { "n": 1 } }).unwrap();
        assert!(spec.apply(&doc! { "n": "str" }, false).is_err());
    }

    #[test]
    fn unknown_modifier() {
        assert!(matches!(
            parse_update(&doc! { "$push": { "a": 1 } }).unwrap_err(),
            QueryError::FailedToParse(_)
        ));
    }
}
