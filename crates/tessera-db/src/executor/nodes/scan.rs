use std::sync::Arc;

use tessera_collation::Collator;
use tessera_query::Expression;

use crate::executor::{Row, StageStats};
use crate::expression::matches;
use crate::planner::plan::ScanDirection;
use crate::store::CollectionState;

pub(crate) fn execute(
    collection: &CollectionState,
    filter: Option<&Expression>,
    direction: ScanDirection,
    collator: Option<&Collator>,
) -> (Vec<Row>, StageStats) {
    let mut stats = StageStats::default();
    let records: Box<dyn Iterator<Item = _>> = match direction {
        ScanDirection::Forward => Box::new(collection.records.iter()),
        ScanDirection::Backward => Box::new(collection.records.iter().rev()),
    };
    let mut rows = Vec::new();
    for (rid, doc) in records {
        stats.docs_examined += 1;
        if filter.is_none_or(|f| matches(doc, f, collator)) {
            rows.push(Row::document(*rid, Arc::clone(doc)));
        }
    }
    (rows, stats)
}

/// Count from the record store without reading documents.
pub(crate) fn fast_count(collection: &CollectionState) -> (Vec<Row>, StageStats) {
    let stats = StageStats {
        n_counted: collection.records.len() as u64,
        ..StageStats::default()
    };
    (Vec::new(), stats)
}
