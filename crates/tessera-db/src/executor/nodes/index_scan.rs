use std::collections::HashSet;
use std::ops::Bound;
use std::sync::Arc;

use bson::Bson;
use tessera_query::KeyKind;
use tessera_query::value::compare_values;

use crate::catalog::IndexDescriptor;
use crate::error::DbError;
use crate::executor::{KeyRef, Row, StageStats};
use crate::keys::Slot;
use crate::planner::bounds::IndexBounds;
use crate::planner::plan::{ScanBounds, ScanDirection};
use crate::store::{CollectionState, IndexData, RecordId};

/// Index entries as `(record, key values)`, in scan order.
type Entries = Vec<(RecordId, Arc<Vec<Bson>>)>;

fn index_data<'a>(collection: &'a CollectionState, index: &IndexDescriptor) -> Result<&'a IndexData, DbError> {
    collection
        .index_data(&index.name)
        .ok_or_else(|| DbError::IndexNotFound(index.name.clone()))
}

pub(crate) fn execute(
    collection: &CollectionState,
    index: &Arc<IndexDescriptor>,
    bounds: &ScanBounds,
    direction: ScanDirection,
    multikey: bool,
) -> Result<(Vec<Row>, StageStats), DbError> {
    let data = index_data(collection, index)?;
    let mut stats = StageStats::default();
    let mut entries = match bounds {
        ScanBounds::Intervals(bounds) => walk_bounds(data, index, bounds, &mut stats),
        ScanBounds::KeyRange {
            min,
            max,
            end_inclusive,
        } => {
            let start = Bound::Included(data.key(Arc::new(min.clone()), Slot::Before));
            let end = if *end_inclusive {
                Bound::Included(data.key(Arc::new(max.clone()), Slot::After))
            } else {
                Bound::Excluded(data.key(Arc::new(max.clone()), Slot::Before))
            };
            let entries: Entries = data
                .range(start, end)
                .filter_map(|(k, v)| Some((k.rid()?, Arc::clone(v))))
                .collect();
            stats.keys_examined = entries.len() as u64;
            entries
        }
    };
    if direction == ScanDirection::Backward {
        entries.reverse();
    }

    let mut seen = HashSet::new();
    let rows = entries
        .into_iter()
        .filter(|(rid, _)| !multikey || seen.insert(*rid))
        .map(|(rid, values)| Row::keyed(rid, key_ref(index, values)))
        .collect();
    Ok((rows, stats))
}

/// Entries inside `bounds`, ascending in key order.
///
/// Each interval of the leading field becomes one key range; the key
/// values are then checked against every field's intervals.
fn walk_bounds(
    data: &IndexData,
    index: &IndexDescriptor,
    bounds: &IndexBounds,
    stats: &mut StageStats,
) -> Entries {
    let collator = index.collator.as_ref();
    let Some(leading) = index.key_pattern.fields().first() else {
        return Vec::new();
    };
    let Some(intervals) = bounds.fields.first().map(|f| &f.intervals) else {
        return Vec::new();
    };

    let mut ranges: Vec<_> = intervals
        .iter()
        .map(|interval| {
            let (first, last) = match leading.kind {
                KeyKind::Descending => (&interval.high, &interval.low),
                _ => (&interval.low, &interval.high),
            };
            (
                data.key(Arc::new(vec![first.clone()]), Slot::Before),
                data.key(Arc::new(vec![last.clone()]), Slot::After),
            )
        })
        .filter(|(start, end)| start <= end)
        .collect();
    if leading.kind == KeyKind::Descending {
        ranges.reverse();
    }

    let mut out = Vec::new();
    for (start, end) in ranges {
        for (key, values) in data.range(Bound::Included(start), Bound::Included(end)) {
            stats.keys_examined += 1;
            if let Some(rid) = key.rid()
                && bounds.contains(values, collator)
            {
                out.push((rid, Arc::clone(values)));
            }
        }
    }
    out
}

fn key_ref(index: &Arc<IndexDescriptor>, values: Arc<Vec<Bson>>) -> KeyRef {
    KeyRef {
        index: Arc::clone(index),
        values,
    }
}

/// Single-document lookup on the `_id` index.
pub(crate) fn id_lookup(
    collection: &CollectionState,
    index: &Arc<IndexDescriptor>,
    key: &Bson,
) -> Result<(Vec<Row>, StageStats), DbError> {
    let data = index_data(collection, index)?;
    let values = Arc::new(vec![key.clone()]);
    let mut stats = StageStats::default();
    let mut rows = Vec::new();
    for rid in data.records_with_key(&values) {
        stats.keys_examined += 1;
        if let Some(doc) = collection.document(rid) {
            stats.docs_examined += 1;
            rows.push(Row {
                rid: Some(rid),
                doc: Some(Arc::clone(doc)),
                key: Some(key_ref(index, Arc::clone(&values))),
            });
        }
    }
    Ok((rows, stats))
}

/// The first entry of each distinct leading key inside `bounds`.
pub(crate) fn distinct_scan(
    collection: &CollectionState,
    index: &Arc<IndexDescriptor>,
    bounds: &IndexBounds,
    fetching: bool,
) -> Result<(Vec<Row>, StageStats), DbError> {
    let data = index_data(collection, index)?;
    let collator = index.collator.as_ref();
    let mut stats = StageStats::default();
    let entries = walk_bounds(data, index, bounds, &mut stats);

    let mut rows: Vec<Row> = Vec::new();
    let mut last: Option<Bson> = None;
    for (rid, values) in entries {
        let Some(leading) = values.first() else {
            continue;
        };
        if last
            .as_ref()
            .is_some_and(|prev| compare_values(prev, leading, collator).is_eq())
        {
            continue;
        }
        last = Some(leading.clone());
        let mut row = Row::keyed(rid, key_ref(index, Arc::clone(&values)));
        if fetching && let Some(doc) = collection.document(rid) {
            stats.docs_examined += 1;
            row.doc = Some(Arc::clone(doc));
        }
        rows.push(row);
    }
    Ok((rows, stats))
}

/// Entries inside `bounds`, without reading documents.
pub(crate) fn count_scan(
    collection: &CollectionState,
    index: &Arc<IndexDescriptor>,
    bounds: &IndexBounds,
) -> Result<(Vec<Row>, StageStats), DbError> {
    let data = index_data(collection, index)?;
    let mut stats = StageStats::default();
    let rows = walk_bounds(data, index, bounds, &mut stats)
        .into_iter()
        .map(|(rid, values)| Row::keyed(rid, key_ref(index, values)))
        .collect();
    Ok((rows, stats))
}
