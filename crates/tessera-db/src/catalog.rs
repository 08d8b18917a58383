use std::sync::Arc;

use bson::{Bson, Document, doc};
use tessera_collation::{CollationSpec, Collator, collators_match, parse_collation_with_version};
use tessera_query::{Expression, KeyPattern, parse_filter};
use tracing::info;

use crate::collection::{CollectionConfig, IndexSpec};
use crate::error::DbError;

pub const ID_INDEX_NAME: &str = "_id_";
const DEFAULT_INDEX_VERSION: i32 = 2;

/// A partial index's membership predicate.
#[derive(Debug, Clone)]
pub struct PartialFilter {
    pub document: Document,
    pub expression: Expression,
}

/// Catalog entry for one index. The collation is bound at creation and never
/// changes afterwards.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_pattern: KeyPattern,
    pub collator: Option<Collator>,
    pub version: i32,
    pub unique: bool,
    pub partial_filter: Option<PartialFilter>,
}

impl IndexDescriptor {
    pub fn collation(&self) -> Option<&CollationSpec> {
        self.collator.as_ref().map(|c| c.spec())
    }

    pub fn is_id(&self) -> bool {
        self.name == ID_INDEX_NAME
    }

    /// The `listIndexes` entry.
    pub fn to_document(&self) -> Document {
        let mut doc = doc! {
            "v": self.version,
            "key": self.key_pattern.to_document(),
            "name": self.name.as_str(),
        };
        if self.unique && !self.is_id() {
            doc.insert("unique", true);
        }
        if let Some(partial) = &self.partial_filter {
            doc.insert("partialFilterExpression", partial.document.clone());
        }
        if let Some(spec) = self.collation() {
            doc.insert("collation", spec.to_document());
        }
        doc
    }

    fn same_definition(&self, other: &IndexDescriptor) -> bool {
        self.key_pattern == other.key_pattern
            && collators_match(self.collator.as_ref(), other.collator.as_ref())
            && self.unique == other.unique
            && self.version == other.version
            && self.partial_filter.as_ref().map(|p| &p.document)
                == other.partial_filter.as_ref().map(|p| &p.document)
    }
}

/// Outcome of checking a new index against the existing catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IndexAdmission {
    Create,
    AlreadyExists,
}

// ── Collections ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CollectionMeta {
    pub name: String,
    /// `None` is the simple collation.
    pub default_collator: Option<Collator>,
    pub indexes: Vec<Arc<IndexDescriptor>>,
}

impl CollectionMeta {
    /// Resolve the default collation and build the `_id` index under it.
    pub(crate) fn new(config: &CollectionConfig, installed: &str) -> Result<Self, DbError> {
        if config.name.is_empty() || config.name.contains('$') || config.name.contains('\0') {
            return Err(DbError::InvalidOptions(format!(
                "invalid collection name: '{}'",
                config.name
            )));
        }
        let default_collator = match &config.collation {
            Some(value) => parse_collation_with_version(value, installed)?
                .map(Collator::new)
                .transpose()?,
            None => None,
        };
        let id_index = IndexDescriptor {
            name: ID_INDEX_NAME.to_string(),
            key_pattern: KeyPattern::ascending("_id"),
            collator: default_collator.clone(),
            version: DEFAULT_INDEX_VERSION,
            unique: true,
            partial_filter: None,
        };
        info!(
            collection = %config.name,
            collation = ?default_collator.as_ref().map(|c| c.spec().locale.as_str()),
            "collection created"
        );
        Ok(CollectionMeta {
            name: config.name.clone(),
            default_collator,
            indexes: vec![Arc::new(id_index)],
        })
    }

    pub fn default_collation(&self) -> Option<&CollationSpec> {
        self.default_collator.as_ref().map(|c| c.spec())
    }

    pub fn index(&self, name: &str) -> Option<&Arc<IndexDescriptor>> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn id_index(&self) -> Option<&Arc<IndexDescriptor>> {
        self.index(ID_INDEX_NAME)
    }

    /// Indexes whose key pattern equals `key`.
    pub fn indexes_with_key(&self, key: &KeyPattern) -> Vec<&Arc<IndexDescriptor>> {
        self.indexes.iter().filter(|i| &i.key_pattern == key).collect()
    }

    /// The `listCollections` entry. A simple default collation is omitted.
    pub fn to_info_document(&self) -> Document {
        let mut options = Document::new();
        if let Some(spec) = self.default_collation() {
            options.insert("collation", spec.to_document());
        }
        let mut info = doc! {
            "name": self.name.as_str(),
            "type": "collection",
            "options": options,
            "info": { "readOnly": false },
        };
        if let Some(id) = self.id_index() {
            info.insert("idIndex", id.to_document());
        }
        info
    }

    // ── Indexes ─────────────────────────────────────────────────

    /// Validate an index request and bind its collation.
    ///
    /// Precedence: explicit collation, else the collection default, else
    /// simple. Version 1 indexes are always simple.
    pub(crate) fn describe_index(
        &self,
        spec: &IndexSpec,
        installed: &str,
    ) -> Result<IndexDescriptor, DbError> {
        let key_pattern = KeyPattern::parse(&spec.key)
            .map_err(|e| DbError::CannotCreateIndex(e.to_string()))?;

        let version = spec.version.unwrap_or(DEFAULT_INDEX_VERSION);
        if version != 1 && version != 2 {
            return Err(DbError::CannotCreateIndex(format!(
                "invalid index specification; index version {version} is not supported"
            )));
        }

        let explicit = match &spec.collation {
            Some(value) => Some(parse_collation_with_version(value, installed)?),
            None => None,
        };

        let collator = if version == 1 {
            if let Some(Some(_)) = &explicit {
                return Err(DbError::CannotCreateIndex(
                    "invalid index specification; cannot create a v1 index with a collation"
                        .into(),
                ));
            }
            None
        } else {
            match explicit {
                Some(parsed) => parsed.map(Collator::new).transpose()?,
                None => self.default_collator.clone(),
            }
        };

        if key_pattern.has_text()
            && let Some(c) = &collator
        {
            return Err(DbError::CannotCreateIndex(format!(
                "Index type 'text' does not support collation: {}",
                c.spec()
            )));
        }

        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| key_pattern.default_name());
        if name.is_empty() {
            return Err(DbError::CannotCreateIndex("index name cannot be empty".into()));
        }

        if key_pattern.is_id() {
            if !collators_match(collator.as_ref(), self.default_collator.as_ref()) {
                return Err(DbError::CannotCreateIndex(
                    "the _id index must have the same collation as the collection".into(),
                ));
            }
            if spec.partial_filter_expression.is_some() {
                return Err(DbError::CannotCreateIndex(
                    "the _id index cannot be a partial index".into(),
                ));
            }
        }

        let partial_filter = match &spec.partial_filter_expression {
            Some(filter) => {
                let expression = parse_filter(filter)
                    .map_err(|e| DbError::CannotCreateIndex(e.to_string()))?;
                check_partial_filter(&expression)?;
                Some(PartialFilter {
                    document: filter.clone(),
                    expression,
                })
            }
            None => None,
        };

        Ok(IndexDescriptor {
            unique: spec.unique || key_pattern.is_id(),
            name: if key_pattern.is_id() {
                ID_INDEX_NAME.to_string()
            } else {
                name
            },
            key_pattern,
            collator,
            version,
            partial_filter,
        })
    }

    /// Decide whether `desc` is new, already present, or conflicting.
    pub(crate) fn admit_index(&self, desc: &IndexDescriptor) -> Result<IndexAdmission, DbError> {
        if let Some(existing) = self.index(&desc.name) {
            if existing.same_definition(desc) {
                return Ok(IndexAdmission::AlreadyExists);
            }
            if existing.key_pattern == desc.key_pattern {
                return Err(DbError::IndexOptionsConflict(format!(
                    "an existing index has the same name as the requested index but different options: {}",
                    existing.name
                )));
            }
            return Err(DbError::IndexKeySpecsConflict(format!(
                "an existing index has the same name as the requested index but a different key pattern: {}",
                existing.name
            )));
        }

        for existing in self.indexes_with_key(&desc.key_pattern) {
            let same_collation = collators_match(existing.collator.as_ref(), desc.collator.as_ref());
            let same_partial = existing.partial_filter.as_ref().map(|p| &p.document)
                == desc.partial_filter.as_ref().map(|p| &p.document);
            if same_collation && same_partial {
                return Err(DbError::IndexOptionsConflict(format!(
                    "index already exists with a different name: {}",
                    existing.name
                )));
            }
        }

        Ok(IndexAdmission::Create)
    }
}

/// Partial filters may only use equality, ranges, `$exists: true` and `$and`.
fn check_partial_filter(expr: &Expression) -> Result<(), DbError> {
    match expr {
        Expression::And(children) => children.iter().try_for_each(check_partial_filter),
        Expression::Eq(..)
        | Expression::Gt(..)
        | Expression::Gte(..)
        | Expression::Lt(..)
        | Expression::Lte(..)
        | Expression::Exists(_, true) => Ok(()),
        other => Err(DbError::CannotCreateIndex(format!(
            "unsupported expression in partial index: {}",
            other.to_document()
        ))),
    }
}

/// Normalized collation document, or `None` for simple.
pub(crate) fn collation_document(collator: Option<&Collator>) -> Option<Bson> {
    collator.map(|c| Bson::Document(c.spec().to_document()))
}
