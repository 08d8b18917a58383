use std::sync::Arc;

use tessera_collation::Collator;
use tessera_query::Expression;

use crate::error::DbError;
use crate::executor::{Row, StageStats};
use crate::expression::matches;
use crate::store::CollectionState;

/// Read each row's document and apply the residual filter.
pub(crate) fn execute(
    collection: &CollectionState,
    filter: Option<&Expression>,
    collator: Option<&Collator>,
    (source, child): (Vec<Row>, StageStats),
) -> Result<(Vec<Row>, StageStats), DbError> {
    let mut stats = StageStats::with_child(child);
    let mut rows = Vec::with_capacity(source.len());
    for mut row in source {
        if row.doc.is_none() {
            let Some(rid) = row.rid else {
                continue;
            };
            let doc = collection
                .document(rid)
                .ok_or_else(|| DbError::Storage(format!("index entry points at missing record {}", rid.0)))?;
            stats.docs_examined += 1;
            row.doc = Some(Arc::clone(doc));
        }
        let keep = match (filter, &row.doc) {
            (Some(f), Some(doc)) => matches(doc, f, collator),
            _ => true,
        };
        if keep {
            rows.push(row);
        }
    }
    Ok((rows, stats))
}
