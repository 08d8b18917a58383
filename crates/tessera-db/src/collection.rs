use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Default collation for the collection's operations and indexes.
    #[serde(default)]
    pub collation: Option<Bson>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        CollectionConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_collation(mut self, collation: impl Into<Bson>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }
}

/// A request to build one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub key: Document,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub collation: Option<Bson>,
    /// Index format version, 1 or 2.
    #[serde(default, rename = "v")]
    pub version: Option<i32>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub partial_filter_expression: Option<Document>,
}

impl IndexSpec {
    pub fn new(key: Document) -> Self {
        IndexSpec {
            key,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<Bson>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, filter: Document) -> Self {
        self.partial_filter_expression = Some(filter);
        self
    }

    /// Read an index specification from a `createIndexes` entry.
    pub fn from_document(doc: &Document) -> Result<Self, DbError> {
        let mut spec = IndexSpec::default();
        let mut has_key = false;
        for (field, value) in doc {
            match (field.as_str(), value) {
                ("key", Bson::Document(key)) => {
                    spec.key = key.clone();
                    has_key = true;
                }
                ("name", Bson::String(name)) => spec.name = Some(name.clone()),
                ("collation", value) => spec.collation = Some(value.clone()),
                ("v", v) => {
                    let version = tessera_query::value::as_f64(v).ok_or_else(|| {
                        DbError::CannotCreateIndex(format!("index version must be a number, got {v}"))
                    })?;
                    spec.version = Some(version as i32);
                }
                ("unique", Bson::Boolean(b)) => spec.unique = *b,
                ("partialFilterExpression", Bson::Document(filter)) => {
                    spec.partial_filter_expression = Some(filter.clone())
                }
                ("background" | "ns", _) => {}
                (other, value) => {
                    return Err(DbError::InvalidIndexOption(format!(
                        "the field '{other}' with value {value} is not valid for an index specification"
                    )));
                }
            }
        }
        if !has_key {
            return Err(DbError::CannotCreateIndex(
                "index specification must contain a 'key' document".into(),
            ));
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn index_spec_from_document() {
        let spec = IndexSpec::from_document(&doc! {
            "key": { "a": 1 },
            "name": "a_fr",
            "collation": { "locale": "fr" },
            "v": 2,
            "partialFilterExpression": { "a": { "$gt": 0 } },
        })
        .unwrap();
        assert_eq!(spec.key, doc! { "a": 1 });
        assert_eq!(spec.name.as_deref(), Some("a_fr"));
        assert_eq!(spec.version, Some(2));
        assert!(spec.partial_filter_expression.is_some());
    }

    #[test]
    fn unknown_option_rejected() {
        let err = IndexSpec::from_document(&doc! { "key": { "a": 1 }, "bogus": 1 }).unwrap_err();
        assert!(matches!(err, DbError::InvalidIndexOption(_)));
    }
}
