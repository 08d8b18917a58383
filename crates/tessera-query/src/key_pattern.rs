use bson::{Bson, Document};

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Ascending,
    Descending,
    Text,
    Geo2dSphere,
    Hashed,
}

impl KeyKind {
    fn to_bson(self) -> Bson {
        match self {
            KeyKind::Ascending => Bson::Int32(1),
            KeyKind::Descending => Bson::Int32(-1),
            KeyKind::Text => Bson::String("text".into()),
            KeyKind::Geo2dSphere => Bson::String("2dsphere".into()),
            KeyKind::Hashed => Bson::String("hashed".into()),
        }
    }

    fn name_suffix(self) -> &'static str {
        match self {
            KeyKind::Ascending => "1",
            KeyKind::Descending => "-1",
            KeyKind::Text => "text",
            KeyKind::Geo2dSphere => "2dsphere",
            KeyKind::Hashed => "hashed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub field: String,
    pub kind: KeyKind,
}

/// The ordered field list an index is built over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    fields: Vec<KeyField>,
}

impl KeyPattern {
    pub fn parse(doc: &Document) -> Result<Self, QueryError> {
        if doc.is_empty() {
            return Err(QueryError::bad_value("index key pattern must not be empty"));
        }
        let mut fields = Vec::with_capacity(doc.len());
        for (field, value) in doc {
            if field.is_empty() || field.starts_with('$') {
                return Err(QueryError::bad_value(format!(
                    "invalid index key field name: '{field}'"
                )));
            }
            let kind = match value {
                Bson::Int32(n) if *n > 0 => KeyKind::Ascending,
                Bson::Int32(n) if *n < 0 => KeyKind::Descending,
                Bson::Int64(n) if *n > 0 => KeyKind::Ascending,
                Bson::Int64(n) if *n < 0 => KeyKind::Descending,
                Bson::Double(d) if *d > 0.0 => KeyKind::Ascending,
                Bson::Double(d) if *d < 0.0 => KeyKind::Descending,
                Bson::String(s) if s == "text" => KeyKind::Text,
                Bson::String(s) if s == "2dsphere" => KeyKind::Geo2dSphere,
                Bson::String(s) if s == "hashed" => KeyKind::Hashed,
                other => {
                    return Err(QueryError::bad_value(format!(
                        "values in index key pattern can only be positive or negative numbers or a known index type, got {other} for '{field}'"
                    )));
                }
            };
            fields.push(KeyField {
                field: field.clone(),
                kind,
            });
        }
        Ok(KeyPattern { fields })
    }

    pub fn ascending(field: &str) -> Self {
        KeyPattern {
            fields: vec![KeyField {
                field: field.to_string(),
                kind: KeyKind::Ascending,
            }],
        }
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ordered index made only of ascending/descending fields.
    pub fn is_btree(&self) -> bool {
        self.fields
            .iter()
            .all(|f| matches!(f.kind, KeyKind::Ascending | KeyKind::Descending))
    }

    pub fn has_text(&self) -> bool {
        self.fields.iter().any(|f| f.kind == KeyKind::Text)
    }

    pub fn is_id(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].field == "_id" && self.is_btree()
    }

    /// Generated index name, e.g. `a_1_b_-1`.
    pub fn default_name(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}_{}", f.field, f.kind.name_suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for f in &self.fields {
            doc.insert(f.field.clone(), f.kind.to_bson());
        }
        doc
    }
}
