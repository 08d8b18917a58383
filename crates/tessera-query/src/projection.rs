use bson::{Bson, Document};

use crate::error::QueryError;
use crate::path;

/// A find projection: either an inclusion list or an exclusion list.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields: Vec<String>,
    inclusion: bool,
    include_id: bool,
}

impl Projection {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        let mut fields = Vec::new();
        let mut inclusion: Option<bool> = None;
        let mut include_id = true;

        for (field, value) in doc {
            let include = match value {
                Bson::Boolean(b) => *b,
                Bson::Int32(n) => *n != 0,
                Bson::Int64(n) => *n != 0,
                Bson::Double(d) => *d != 0.0,
                other => {
                    return Err(QueryError::bad_value(format!(
                        "unsupported projection value {other} for '{field}'"
                    )));
                }
            };
            if field == "_id" {
                include_id = include;
                continue;
            }
            match inclusion {
                Some(mode) if mode != include => {
                    return Err(QueryError::bad_value(format!(
                        "cannot do {} on field {field} in {} projection",
                        if include { "inclusion" } else { "exclusion" },
                        if mode { "inclusion" } else { "exclusion" },
                    )));
                }
                _ => inclusion = Some(include),
            }
            fields.push(field.clone());
        }

        // `{_id: 0}` alone is an exclusion projection; `{_id: 1}` alone
        // keeps only `_id`.
        Ok(Projection {
            inclusion: inclusion.unwrap_or(include_id && !doc.is_empty()),
            fields,
            include_id,
        })
    }

    pub fn is_inclusion(&self) -> bool {
        self.inclusion
    }

    pub fn includes_id(&self) -> bool {
        self.include_id
    }

    /// Fields an inclusion projection reads, excluding `_id`.
    pub fn included_fields(&self) -> Option<&[String]> {
        self.inclusion.then_some(self.fields.as_slice())
    }

    pub fn apply(&self, doc: &Document) -> Document {
        if self.inclusion {
            let mut out = Document::new();
            if self.include_id
                && let Some(id) = doc.get("_id")
            {
                out.insert("_id", id.clone());
            }
            for field in &self.fields {
                if let Some(value) = path::get(doc, field) {
                    // Parents of a dotted path are documents in `out`.
                    let _ = path::set(&mut out, field, value.clone());
                }
            }
            out
        } else {
            let mut out = doc.clone();
            for field in &self.fields {
                path::remove(&mut out, field);
            }
            if !self.include_id {
                out.remove("_id");
            }
            out
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if !self.include_id {
            doc.insert("_id", 0);
        }
        for field in &self.fields {
            doc.insert(field.clone(), if self.inclusion { 1 } else { 0 });
        }
        doc
    }
}
