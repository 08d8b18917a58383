use std::sync::Arc;

use bson::Document;
use tessera_query::{Projection, path};

use crate::executor::{KeyRef, Row, StageStats};

pub(crate) fn execute(
    projection: &Projection,
    (source, child): (Vec<Row>, StageStats),
) -> (Vec<Row>, StageStats) {
    let rows = source
        .into_iter()
        .map(|row| {
            let projected = projection.apply(&row.to_document());
            Row {
                doc: Some(Arc::new(projected)),
                ..row
            }
        })
        .collect();
    (rows, StageStats::with_child(child))
}

/// Replace each row with its index key. Keys hold the indexed values as
/// stored, whatever the index collation.
pub(crate) fn return_key((source, child): (Vec<Row>, StageStats)) -> (Vec<Row>, StageStats) {
    let rows = source
        .into_iter()
        .map(|row| {
            let doc = match &row.key {
                Some(key) => key_fields(key),
                None => Document::new(),
            };
            Row {
                doc: Some(Arc::new(doc)),
                ..row
            }
        })
        .collect();
    (rows, StageStats::with_child(child))
}

/// The document a covered stage sees: key fields set to their key values.
pub(crate) fn key_document(key: &KeyRef) -> Document {
    let mut doc = Document::new();
    for (field, value) in key.index.key_pattern.field_names().zip(key.values.iter()) {
        // Parents of a dotted key field are documents built here.
        let _ = path::set(&mut doc, field, value.clone());
    }
    doc
}

fn key_fields(key: &KeyRef) -> Document {
    key.index
        .key_pattern
        .field_names()
        .zip(key.values.iter())
        .map(|(field, value)| (field.to_string(), value.clone()))
        .collect()
}
