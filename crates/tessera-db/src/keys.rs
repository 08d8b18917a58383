use std::cmp::Ordering;
use std::sync::Arc;

use bson::{Bson, Document};
use tessera_collation::Collator;
use tessera_query::KeyKind;
use tessera_query::path::{self, PathValue};
use tessera_query::value::compare_values;

use crate::catalog::IndexDescriptor;
use crate::error::DbError;
use crate::expression::matches;
use crate::store::RecordId;

// ── Key order ───────────────────────────────────────────────────
//
// Index keys keep their original values. Entries are ordered field by field
// with the BSON value order under the index collation, descending fields
// reversed, then by record id.

/// How one index orders its key tuples.
#[derive(Debug)]
pub(crate) struct KeyOrder {
    descending: Vec<bool>,
    collator: Option<Collator>,
}

impl KeyOrder {
    pub fn for_index(index: &IndexDescriptor) -> Arc<Self> {
        Arc::new(KeyOrder {
            descending: index
                .key_pattern
                .fields()
                .iter()
                .map(|f| f.kind == KeyKind::Descending)
                .collect(),
            collator: index.collator.clone(),
        })
    }

    /// Compare the fields both tuples have.
    pub fn compare(&self, a: &[Bson], b: &[Bson]) -> Ordering {
        for ((x, y), descending) in a.iter().zip(b).zip(&self.descending) {
            let ord = compare_values(x, y, self.collator.as_ref());
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn same_key(&self, a: &[Bson], b: &[Bson]) -> bool {
        a.len() == b.len() && self.compare(a, b) == Ordering::Equal
    }
}

/// Where a key sits among the entries sharing its values.
///
/// `Before` and `After` never name a stored entry; they bound range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Slot {
    Before,
    Record(RecordId),
    After,
}

/// One index entry, or a bound between entries when its slot is not a record.
///
/// A bound may carry fewer values than the key pattern has fields; it then
/// sits before or after every entry with that prefix.
#[derive(Debug, Clone)]
pub(crate) struct IndexKey {
    pub values: Arc<Vec<Bson>>,
    pub slot: Slot,
    order: Arc<KeyOrder>,
}

impl IndexKey {
    pub fn new(order: &Arc<KeyOrder>, values: Arc<Vec<Bson>>, slot: Slot) -> Self {
        IndexKey {
            values,
            slot,
            order: Arc::clone(order),
        }
    }

    /// The record this entry points at. Bounds have none.
    pub fn rid(&self) -> Option<RecordId> {
        match self.slot {
            Slot::Record(rid) => Some(rid),
            Slot::Before | Slot::After => None,
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let prefix_edge = |slot: Slot| match slot {
            Slot::After => Ordering::Greater,
            Slot::Before | Slot::Record(_) => Ordering::Less,
        };
        self.order
            .compare(&self.values, &other.values)
            .then_with(|| match self.values.len().cmp(&other.values.len()) {
                Ordering::Equal => self.slot.cmp(&other.slot),
                Ordering::Less => prefix_edge(self.slot),
                Ordering::Greater => prefix_edge(other.slot).reverse(),
            })
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

// ── Key extraction ──────────────────────────────────────────────

/// The key tuples an index holds for `doc`, and whether any came from an
/// array. Missing fields index as null; arrays index once per element.
pub(crate) fn extract_keys(
    doc: &Document,
    index: &IndexDescriptor,
) -> Result<(Vec<Vec<Bson>>, bool), DbError> {
    if let Some(partial) = &index.partial_filter
        && !matches(doc, &partial.expression, index.collator.as_ref())
    {
        return Ok((Vec::new(), false));
    }

    let mut per_field: Vec<Vec<Bson>> = Vec::with_capacity(index.key_pattern.len());
    let mut array_field: Option<&str> = None;
    let mut multikey = false;

    for field in index.key_pattern.fields() {
        let mut values = Vec::new();
        let mut from_array = false;
        let found = path::lookup(doc, &field.field);
        if found.len() > 1 {
            from_array = true;
        }
        for value in found {
            match value {
                PathValue::Found(Bson::Array(items)) => {
                    from_array = true;
                    if items.is_empty() {
                        values.push(Bson::Undefined);
                    }
                    values.extend(items.iter().cloned());
                }
                PathValue::Found(v) => values.push(v.clone()),
                PathValue::Missing => values.push(Bson::Null),
            }
        }
        if from_array {
            if let Some(other) = array_field {
                return Err(DbError::ParallelArrays(other.to_string(), field.field.clone()));
            }
            array_field = Some(&field.field);
            multikey = true;
        }
        per_field.push(values);
    }

    let mut keys: Vec<Vec<Bson>> = vec![Vec::new()];
    for values in per_field {
        let mut next = Vec::with_capacity(keys.len() * values.len());
        for prefix in &keys {
            for v in &values {
                let mut key = prefix.clone();
                key.push(v.clone());
                next.push(key);
            }
        }
        keys = next;
    }
    Ok((keys, multikey))
}
