use std::cmp::Ordering;

use bson::{Bson, Document};
use tessera_collation::Collator;
use tessera_query::value::compare_values;
use tessera_query::{Sort, SortDirection};

use crate::error::DbError;
use crate::executor::{Row, StageStats};
use crate::expression::sort_value;

/// Blocking sort under the operation collation. Only `limit` rows are kept
/// when the sort absorbed a limit.
pub(crate) fn execute(
    sorts: &[Sort],
    limit: Option<u64>,
    collator: Option<&Collator>,
    max_documents: usize,
    (source, child): (Vec<Row>, StageStats),
) -> Result<(Vec<Row>, StageStats), DbError> {
    if limit.is_none() && source.len() > max_documents {
        return Err(DbError::SortLimitExceeded(max_documents));
    }

    // Resolve sort keys once per row rather than on every comparison.
    let mut keyed: Vec<(Vec<Bson>, Row)> = source
        .into_iter()
        .map(|row| {
            let keys = sort_keys(&row, sorts, collator);
            (keys, row)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, sorts, collator));

    let mut rows: Vec<Row> = keyed.into_iter().map(|(_, row)| row).collect();
    if let Some(n) = limit.filter(|n| *n > 0) {
        rows.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    }
    Ok((rows, StageStats::with_child(child)))
}

fn sort_keys(row: &Row, sorts: &[Sort], collator: Option<&Collator>) -> Vec<Bson> {
    let rebuilt: Document;
    let doc = match &row.doc {
        Some(doc) => doc.as_ref(),
        None => {
            rebuilt = row.to_document();
            &rebuilt
        }
    };
    sorts
        .iter()
        .map(|s| sort_value(doc, &s.field, s.direction, collator))
        .collect()
}

fn compare_keys(a: &[Bson], b: &[Bson], sorts: &[Sort], collator: Option<&Collator>) -> Ordering {
    for ((x, y), sort) in a.iter().zip(b).zip(sorts) {
        let ord = compare_values(x, y, collator);
        let ord = match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
