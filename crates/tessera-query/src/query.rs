use bson::{Bson, Document};

use crate::error::QueryError;

/// Index selection forced by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// Index by name.
    Name(String),
    /// Index by key pattern.
    KeyPattern(Document),
    /// Collection scan in natural order; `true` for forward.
    Natural(bool),
}

impl Hint {
    /// Read a hint from its document or string form.
    pub fn from_bson(value: &Bson) -> Result<Self, QueryError> {
        match value {
            Bson::String(name) => Ok(Hint::Name(name.clone())),
            Bson::Document(d) => match d.get("$natural") {
                Some(direction) if d.len() == 1 => {
                    let forward = crate::value::as_f64(direction)
                        .ok_or_else(|| QueryError::bad_value("$natural hint must be 1 or -1"))?;
                    Ok(Hint::Natural(forward >= 0.0))
                }
                _ if d.is_empty() => Err(QueryError::bad_value("hint must not be empty")),
                _ => Ok(Hint::KeyPattern(d.clone())),
            },
            other => Err(QueryError::bad_value(format!(
                "hint must be a string or an object, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub hint: Option<Hint>,
    pub min: Option<Document>,
    pub max: Option<Document>,
    /// Return index keys instead of documents.
    pub return_key: bool,
    pub collation: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountQuery {
    pub filter: Document,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistinctQuery {
    pub key: String,
    pub filter: Document,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateQuery {
    pub pipeline: Vec<Document>,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}

/// One update statement; a bulk write carries several.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStatement {
    pub filter: Document,
    pub update: Document,
    pub multi: bool,
    pub upsert: bool,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}

/// One delete statement. `multi: false` removes at most one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteStatement {
    pub filter: Document,
    pub multi: bool,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    /// Update document; `None` together with `remove` deletes the match.
    pub update: Option<Document>,
    pub remove: bool,
    /// Return the post-image instead of the pre-image.
    pub new: bool,
    pub fields: Option<Document>,
    pub upsert: bool,
    pub hint: Option<Hint>,
    pub collation: Option<Bson>,
}
