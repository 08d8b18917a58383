use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use imbl::OrdMap;
use tracing::debug;

use crate::catalog::{CollectionMeta, IndexDescriptor};
use crate::error::DbError;
use crate::keys::{IndexKey, KeyOrder, Slot, extract_keys};

/// Position of a document in its collection's record map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

/// Entries of one index, ordered by key then record. Values are the
/// original key values, kept so bounds can be checked exactly and keys can
/// be returned.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    pub entries: OrdMap<IndexKey, Arc<Vec<Bson>>>,
    pub multikey: bool,
    order: Arc<KeyOrder>,
}

impl IndexData {
    pub fn new(index: &IndexDescriptor) -> Self {
        IndexData {
            entries: OrdMap::new(),
            multikey: false,
            order: KeyOrder::for_index(index),
        }
    }

    pub fn order(&self) -> &KeyOrder {
        &self.order
    }

    /// A key positioned at `slot` among entries with `values`.
    pub fn key(&self, values: Arc<Vec<Bson>>, slot: Slot) -> IndexKey {
        IndexKey::new(&self.order, values, slot)
    }

    pub fn range(
        &self,
        start: Bound<IndexKey>,
        end: Bound<IndexKey>,
    ) -> impl DoubleEndedIterator<Item = (&IndexKey, &Arc<Vec<Bson>>)> {
        self.entries.range((start, end))
    }

    /// Records stored under a key equal to `values`.
    pub fn records_with_key(&self, values: &[Bson]) -> Vec<RecordId> {
        let values = Arc::new(values.to_vec());
        let start = Bound::Included(self.key(Arc::clone(&values), Slot::Before));
        let end = Bound::Included(self.key(values, Slot::After));
        self.range(start, end).filter_map(|(k, _)| k.rid()).collect()
    }

    fn insert(&mut self, rid: RecordId, values: Vec<Bson>) {
        let values = Arc::new(values);
        let key = self.key(Arc::clone(&values), Slot::Record(rid));
        self.entries.insert(key, values);
    }

    fn remove(&mut self, rid: RecordId, values: Vec<Bson>) {
        let key = self.key(Arc::new(values), Slot::Record(rid));
        self.entries.remove(&key);
    }
}

// ── Collection state ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    pub meta: Arc<CollectionMeta>,
    pub records: OrdMap<RecordId, Arc<Document>>,
    pub indexes: OrdMap<String, IndexData>,
    next_record: u64,
}

type IndexEntries = Vec<(String, Vec<Vec<Bson>>, bool)>;

impl CollectionState {
    pub fn new(meta: CollectionMeta) -> Self {
        let indexes = meta
            .indexes
            .iter()
            .map(|i| (i.name.clone(), IndexData::new(i)))
            .collect();
        CollectionState {
            meta: Arc::new(meta),
            records: OrdMap::new(),
            indexes,
            next_record: 1,
        }
    }

    pub fn index_data(&self, name: &str) -> Option<&IndexData> {
        self.indexes.get(name)
    }

    pub fn is_multikey(&self, name: &str) -> bool {
        self.indexes.get(name).is_some_and(|i| i.multikey)
    }

    pub fn document(&self, rid: RecordId) -> Option<&Arc<Document>> {
        self.records.get(&rid)
    }

    /// Insert a document, generating an `_id` when it has none.
    pub fn insert(&mut self, doc: Document) -> Result<(RecordId, Bson), DbError> {
        let doc = with_id(doc);
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        let entries = self.index_entries(&doc)?;
        self.check_unique(&entries, None, &doc)?;

        let rid = RecordId(self.next_record);
        self.next_record += 1;
        self.add_entries(rid, entries);
        self.records.insert(rid, Arc::new(doc));
        Ok((rid, id))
    }

    /// Replace the document at `rid`, re-keying every index.
    pub fn replace(&mut self, rid: RecordId, doc: Document) -> Result<(), DbError> {
        let entries = self.index_entries(&doc)?;
        self.check_unique(&entries, Some(rid), &doc)?;
        if let Some(old) = self.records.get(&rid).cloned() {
            self.remove_entries(rid, &old)?;
        }
        self.add_entries(rid, entries);
        self.records.insert(rid, Arc::new(doc));
        Ok(())
    }

    pub fn remove(&mut self, rid: RecordId) -> Result<Option<Arc<Document>>, DbError> {
        let Some(old) = self.records.remove(&rid) else {
            return Ok(None);
        };
        self.remove_entries(rid, &old)?;
        Ok(Some(old))
    }

    /// Build a new index over every existing document.
    pub fn add_index(&mut self, desc: IndexDescriptor) -> Result<(), DbError> {
        let mut data = IndexData::new(&desc);
        for (rid, doc) in self.records.iter() {
            let (keys, multikey) = extract_keys(doc, &desc)?;
            data.multikey |= multikey;
            for values in dedupe_keys(data.order(), keys) {
                if desc.unique && !data.records_with_key(&values).is_empty() {
                    return Err(self.duplicate(&desc, &values));
                }
                data.insert(*rid, values);
            }
        }
        debug!(
            collection = %self.meta.name,
            index = %desc.name,
            entries = data.entries.len(),
            "index built"
        );
        self.indexes.insert(desc.name.clone(), data);
        Arc::make_mut(&mut self.meta).indexes.push(Arc::new(desc));
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) {
        self.indexes.remove(name);
        Arc::make_mut(&mut self.meta).indexes.retain(|i| i.name != name);
    }

    /// Rebuild every index from the stored documents, keeping each index's
    /// bound collation.
    pub fn rebuild_indexes(&mut self) -> Result<(), DbError> {
        let descriptors: Vec<Arc<IndexDescriptor>> = self.meta.indexes.clone();
        Arc::make_mut(&mut self.meta).indexes.clear();
        self.indexes = OrdMap::new();
        for desc in descriptors {
            self.add_index(desc.as_ref().clone())?;
        }
        Ok(())
    }

    fn index_entries(&self, doc: &Document) -> Result<IndexEntries, DbError> {
        let mut out = Vec::with_capacity(self.meta.indexes.len());
        for desc in &self.meta.indexes {
            let (keys, multikey) = extract_keys(doc, desc)?;
            let keys = match self.indexes.get(&desc.name) {
                Some(data) => dedupe_keys(data.order(), keys),
                None => keys,
            };
            out.push((desc.name.clone(), keys, multikey));
        }
        Ok(out)
    }

    fn check_unique(
        &self,
        entries: &IndexEntries,
        own: Option<RecordId>,
        doc: &Document,
    ) -> Result<(), DbError> {
        for (name, keys, _) in entries {
            let Some(desc) = self.meta.index(name) else {
                continue;
            };
            if !desc.unique {
                continue;
            }
            let Some(data) = self.indexes.get(name) else {
                continue;
            };
            for values in keys {
                if data
                    .records_with_key(values)
                    .into_iter()
                    .any(|rid| Some(rid) != own)
                {
                    debug!(collection = %self.meta.name, index = %name, id = ?doc.get("_id"), "duplicate key");
                    return Err(self.duplicate(desc, values));
                }
            }
        }
        Ok(())
    }

    fn duplicate(&self, desc: &IndexDescriptor, values: &[Bson]) -> DbError {
        let mut key = Document::new();
        for (field, value) in desc.key_pattern.field_names().zip(values) {
            key.insert(field, value.clone());
        }
        DbError::DuplicateKey {
            collection: self.meta.name.clone(),
            index: desc.name.clone(),
            key: Bson::Document(key).to_string(),
        }
    }

    fn add_entries(&mut self, rid: RecordId, entries: IndexEntries) {
        for (name, keys, multikey) in entries {
            let Some(data) = self.indexes.get_mut(&name) else {
                continue;
            };
            data.multikey |= multikey;
            for values in keys {
                data.insert(rid, values);
            }
        }
    }

    fn remove_entries(&mut self, rid: RecordId, doc: &Document) -> Result<(), DbError> {
        for (name, keys, _) in self.index_entries(doc)? {
            if let Some(data) = self.indexes.get_mut(&name) {
                for values in keys {
                    data.remove(rid, values);
                }
            }
        }
        Ok(())
    }
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut out = Document::new();
    out.insert("_id", ObjectId::new());
    out.extend(doc);
    out
}

/// Drop key tuples equal under the index order to one kept earlier.
fn dedupe_keys(order: &KeyOrder, keys: Vec<Vec<Bson>>) -> Vec<Vec<Bson>> {
    let mut out: Vec<Vec<Bson>> = Vec::with_capacity(keys.len());
    for values in keys {
        if !out.iter().any(|kept| order.same_key(kept, &values)) {
            out.push(values);
        }
    }
    out
}

// ── Database state ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub collections: OrdMap<String, CollectionState>,
}

/// Published database snapshots plus the single-writer lock.
pub(crate) struct Store {
    current: ArcSwap<DatabaseState>,
    write_lock: Mutex<()>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(DatabaseState::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// The latest committed state. Cheap due to imbl structural sharing.
    pub fn snapshot(&self) -> DatabaseState {
        (**self.current.load()).clone()
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ()>, DbError> {
        self.write_lock
            .lock()
            .map_err(|e| DbError::Storage(format!("write lock poisoned: {e}")))
    }

    pub fn publish(&self, state: DatabaseState) {
        self.current.store(Arc::new(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionConfig, IndexSpec};
    use bson::doc;
    use tessera_collation::COLLATOR_VERSION;

    fn collection(collation: Option<Document>) -> CollectionState {
        let mut config = CollectionConfig::new("coll");
        config.collation = collation.map(Bson::Document);
        CollectionState::new(CollectionMeta::new(&config, COLLATOR_VERSION).unwrap())
    }

    fn add(state: &mut CollectionState, spec: IndexSpec) {
        let desc = state.meta.describe_index(&spec, COLLATOR_VERSION).unwrap();
        state.add_index(desc).unwrap();
    }

    #[test]
    fn insert_generates_id_first() {
        let mut state = collection(None);
        let (rid, id) = state.insert(doc! { "a": 1 }).unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));
        let stored = state.document(rid).unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut state = collection(None);
        state.insert(doc! { "_id": 1 }).unwrap();
        let err = state.insert(doc! { "_id": 1 }).unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { .. }));
        assert_eq!(state.records.len(), 1);
    }

    #[test]
    fn adjacent_large_longs_are_separate_ids() {
        let mut state = collection(None);
        let two_53 = 9_007_199_254_740_992_i64;
        state.insert(doc! { "_id": Bson::Int64(two_53) }).unwrap();
        state.insert(doc! { "_id": Bson::Int64(two_53 + 1) }).unwrap();
        let ids = state.index_data("_id_").unwrap();
        assert_eq!(ids.records_with_key(&[Bson::Int64(two_53 + 1)]), vec![RecordId(2)]);
        assert_eq!(ids.records_with_key(&[Bson::Double(two_53 as f64)]), vec![RecordId(1)]);
    }

    #[test]
    fn collated_id_index_rejects_case_variants() {
        let mut state = collection(Some(doc! { "locale": "en_US", "strength": 2 }));
        state.insert(doc! { "_id": "foo" }).unwrap();
        assert!(state.insert(doc! { "_id": "FOO" }).is_err());
    }

    #[test]
    fn multikey_and_parallel_arrays() {
        let mut state = collection(None);
        add(&mut state, IndexSpec::new(doc! { "a": 1, "b": 1 }));
        state.insert(doc! { "a": [1, 2], "b": 1 }).unwrap();
        assert!(state.is_multikey("a_1_b_1"));
        assert_eq!(state.index_data("a_1_b_1").unwrap().entries.len(), 2);

        let err = state.insert(doc! { "a": [1], "b": [2] }).unwrap_err();
        assert!(matches!(err, DbError::ParallelArrays(..)));
    }

    #[test]
    fn partial_index_holds_only_matching_documents() {
        let mut state = collection(None);
        add(
            &mut state,
            IndexSpec::new(doc! { "a": 1 }).partial(doc! { "a": { "$gte": 10 } }),
        );
        state.insert(doc! { "a": 5 }).unwrap();
        state.insert(doc! { "a": 15 }).unwrap();
        assert_eq!(state.index_data("a_1").unwrap().entries.len(), 1);
    }

    #[test]
    fn replace_rekeys_and_remove_cleans_up() {
        let mut state = collection(None);
        add(&mut state, IndexSpec::new(doc! { "a": 1 }));
        let (rid, _) = state.insert(doc! { "_id": 1, "a": 1 }).unwrap();
        state.replace(rid, doc! { "_id": 1, "a": 2 }).unwrap();
        let data = state.index_data("a_1").unwrap();
        assert_eq!(data.entries.len(), 1);
        assert_eq!(data.entries.values().next().unwrap().as_slice(), &[Bson::Int32(2)]);

        state.remove(rid).unwrap();
        assert!(state.index_data("a_1").unwrap().entries.is_empty());
        assert!(state.index_data("_id_").unwrap().entries.is_empty());
    }

    #[test]
    fn rebuild_keeps_collations() {
        let mut state = collection(None);
        add(
            &mut state,
            IndexSpec::new(doc! { "s": 1 }).collation(doc! { "locale": "fr_CA" }),
        );
        state.insert(doc! { "s": "côte" }).unwrap();
        state.rebuild_indexes().unwrap();
        let idx = state.meta.index("s_1").unwrap();
        assert_eq!(idx.collation().unwrap().locale, "fr_CA");
        assert_eq!(state.index_data("s_1").unwrap().entries.len(), 1);
    }
}
