use std::sync::MutexGuard;

use bson::{Bson, Document};
use tessera_collation::Collator;
use tessera_query::value::{compare_values, values_equal};
use tessera_query::path::{self, PathValue};
use tessera_query::{
    AggregateQuery, CountQuery, DeleteStatement, DistinctQuery, Expression, FindAndModifyQuery,
    FindQuery, KeyPattern, Projection, QueryError, UpdateSpec, UpdateStatement, parse_filter, parse_sort,
    parse_update,
};
use tracing::info;

use crate::aggregate::{parse_pipeline, run_stages};
use crate::catalog::{CollectionMeta, ID_INDEX_NAME, IndexAdmission};
use crate::collection::{CollectionConfig, IndexSpec};
use crate::config::DatabaseConfig;
use crate::error::DbError;
use crate::executor::{Execution, Executor};
use crate::explain::{ExplainRequest, Verbosity, WouldWrite, explain_document};
use crate::planner::plan::{OpKind, QueryPlan, QueryShape};
use crate::planner::{self, PlanningContext, resolve_collation};
use crate::result::{
    BulkWriteResult, CreateIndexesResult, DeleteResult, FindAndModifyResult, InsertResult,
    UpdateResult, WriteError, WriteModel,
};
use crate::store::{CollectionState, DatabaseState, RecordId, Store};

/// An in-memory document database.
///
/// Readers work on their own snapshot; one writer at a time mutates a
/// private copy and publishes it on commit.
pub struct Database {
    store: Store,
    config: DatabaseConfig,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> Self {
        info!(name = %config.name, stage_naming = ?config.stage_naming, "database opened");
        Self {
            store: Store::new(),
            config,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn begin(&self, read_only: bool) -> Result<DatabaseTransaction<'_>, DbError> {
        let write_guard = if read_only {
            None
        } else {
            Some(self.store.lock()?)
        };
        Ok(DatabaseTransaction {
            db: self,
            state: self.store.snapshot(),
            read_only,
            _write_guard: write_guard,
        })
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::open(DatabaseConfig::default())
    }
}

/// The operation an explain describes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplainTarget {
    Find(FindQuery),
    Count(CountQuery),
    Distinct(DistinctQuery),
    Aggregate(AggregateQuery),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    FindAndModify(FindAndModifyQuery),
}

pub struct DatabaseTransaction<'db> {
    db: &'db Database,
    state: DatabaseState,
    read_only: bool,
    _write_guard: Option<MutexGuard<'db, ()>>,
}

impl<'db> DatabaseTransaction<'db> {
    // ── Collection operations ───────────────────────────────────

    pub fn create_collection(&mut self, config: &CollectionConfig) -> Result<(), DbError> {
        self.check_writable()?;
        if self.state.collections.contains_key(&config.name) {
            return Err(DbError::NamespaceExists(self.namespace(&config.name)));
        }
        let meta = CollectionMeta::new(config, &self.db.config.collator_version)?;
        let mut collection = CollectionState::new(meta);
        for spec in &config.indexes {
            build_index(&mut collection, spec, &self.db.config.collator_version)?;
        }
        self.state.collections.insert(config.name.clone(), collection);
        Ok(())
    }

    pub fn drop_collection(&mut self, name: &str) -> Result<(), DbError> {
        self.check_writable()?;
        if self.state.collections.remove(name).is_none() {
            return Err(DbError::NamespaceNotFound(self.namespace(name)));
        }
        info!(collection = %name, "collection dropped");
        Ok(())
    }

    /// `listCollections` entries in name order.
    pub fn list_collections(&self) -> Vec<Document> {
        self.state
            .collections
            .values()
            .map(|c| c.meta.to_info_document())
            .collect()
    }

    pub fn collection_info(&self, name: &str) -> Result<Document, DbError> {
        self.state
            .collections
            .get(name)
            .map(|c| c.meta.to_info_document())
            .ok_or_else(|| DbError::NamespaceNotFound(self.namespace(name)))
    }

    /// Copy `source` into a new collection. The copy keeps the source's
    /// default collation and only the `_id` index.
    pub fn clone_collection(&mut self, source: &str, target: &str) -> Result<(), DbError> {
        self.check_writable()?;
        let Some(from) = self.state.collections.get(source) else {
            return Err(DbError::NamespaceNotFound(self.namespace(source)));
        };
        if self.state.collections.contains_key(target) {
            return Err(DbError::NamespaceExists(self.namespace(target)));
        }
        let mut config = CollectionConfig::new(target);
        config.collation = from
            .meta
            .default_collation()
            .map(|spec| Bson::Document(spec.to_document()));
        let meta = CollectionMeta::new(&config, &self.db.config.collator_version)?;
        let mut copy = CollectionState::new(meta);
        for doc in from.records.values() {
            copy.insert(doc.as_ref().clone())?;
        }
        info!(source = %source, target = %target, documents = copy.records.len(), "collection cloned");
        self.state.collections.insert(target.to_string(), copy);
        Ok(())
    }

    // ── Index operations ────────────────────────────────────────

    /// Create one index, returning its name.
    pub fn create_index(&mut self, collection: &str, spec: &IndexSpec) -> Result<String, DbError> {
        self.check_writable()?;
        let installed = self.db.config.collator_version.clone();
        let coll = self.collection_mut_or_create(collection)?;
        let name = coll.meta.describe_index(spec, &installed)?.name;
        build_index(coll, spec, &installed)?;
        Ok(name)
    }

    /// Create several indexes. Either all are built or none are.
    pub fn create_indexes(
        &mut self,
        collection: &str,
        specs: &[IndexSpec],
    ) -> Result<CreateIndexesResult, DbError> {
        self.check_writable()?;
        if specs.is_empty() {
            return Err(DbError::BadValue("must specify at least one index".into()));
        }
        let installed = self.db.config.collator_version.clone();
        let created = !self.state.collections.contains_key(collection);
        let mut copy = match self.state.collections.get(collection) {
            Some(existing) => existing.clone(),
            None => {
                let meta = CollectionMeta::new(&CollectionConfig::new(collection), &installed)?;
                CollectionState::new(meta)
            }
        };
        let before = copy.meta.indexes.len();
        for spec in specs {
            build_index(&mut copy, spec, &installed)?;
        }
        let after = copy.meta.indexes.len();
        self.state.collections.insert(collection.to_string(), copy);
        Ok(CreateIndexesResult {
            created_collection_automatically: created,
            num_indexes_before: before,
            num_indexes_after: after,
        })
    }

    pub fn list_indexes(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        let coll = self.collection(collection)?;
        Ok(coll.meta.indexes.iter().map(|i| i.to_document()).collect())
    }

    /// Drop by name, by key pattern, or every non-`_id` index with `"*"`.
    pub fn drop_index(&mut self, collection: &str, target: &Bson) -> Result<(), DbError> {
        self.check_writable()?;
        let ns = self.namespace(collection);
        let coll = self
            .state
            .collections
            .get_mut(collection)
            .ok_or(DbError::NamespaceNotFound(ns))?;

        let names: Vec<String> = match target {
            Bson::String(name) if name == "*" => coll
                .meta
                .indexes
                .iter()
                .filter(|i| !i.is_id())
                .map(|i| i.name.clone())
                .collect(),
            Bson::String(name) => {
                if coll.meta.index(name).is_none() {
                    return Err(DbError::IndexNotFound(name.clone()));
                }
                vec![name.clone()]
            }
            Bson::Document(key) => {
                let pattern = KeyPattern::parse(key)?;
                let found = coll.meta.indexes_with_key(&pattern);
                match found.as_slice() {
                    [] => {
                        return Err(DbError::IndexNotFound(format!(
                            "can't find index with key: {key}"
                        )));
                    }
                    [one] => vec![one.name.clone()],
                    _ => {
                        return Err(DbError::BadValue(format!(
                            "{} indexes found for key: {key}, identify by name instead",
                            found.len()
                        )));
                    }
                }
            }
            other => {
                return Err(DbError::BadValue(format!(
                    "index to drop must be a name or key pattern, got {other}"
                )));
            }
        };

        for name in &names {
            if name == ID_INDEX_NAME {
                return Err(DbError::InvalidOptions("cannot drop _id index".into()));
            }
        }
        for name in &names {
            coll.drop_index(name);
            info!(collection = %collection, index = %name, "index dropped");
        }
        Ok(())
    }

    pub fn drop_indexes(&mut self, collection: &str) -> Result<(), DbError> {
        self.drop_index(collection, &Bson::String("*".into()))
    }

    /// Rebuild every index, keeping each one's bound collation.
    pub fn reindex(&mut self, collection: &str) -> Result<usize, DbError> {
        self.check_writable()?;
        let ns = self.namespace(collection);
        let coll = self
            .state
            .collections
            .get_mut(collection)
            .ok_or(DbError::NamespaceNotFound(ns))?;
        coll.rebuild_indexes()?;
        let count = coll.meta.indexes.len();
        info!(collection = %collection, indexes = count, "indexes rebuilt");
        Ok(count)
    }

    // ── Insert operations ───────────────────────────────────────

    pub fn insert_one(&mut self, collection: &str, doc: Document) -> Result<InsertResult, DbError> {
        self.check_writable()?;
        let coll = self.collection_mut_or_create(collection)?;
        let (_, id) = coll.insert(doc)?;
        Ok(InsertResult { id })
    }

    /// Insert in order, stopping at the first failure.
    pub fn insert_many(
        &mut self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<InsertResult>, DbError> {
        self.check_writable()?;
        let coll = self.collection_mut_or_create(collection)?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let (_, id) = coll.insert(doc)?;
            out.push(InsertResult { id });
        }
        Ok(out)
    }

    // ── Query operations ────────────────────────────────────────

    pub fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, DbError> {
        let shape = find_shape(query)?;
        let plan = self.plan(collection, &shape, query.collation.as_ref())?;
        Ok(self.execute(collection, &plan)?.documents())
    }

    pub fn count(&self, collection: &str, query: &CountQuery) -> Result<u64, DbError> {
        let shape = count_shape(query)?;
        let plan = self.plan(collection, &shape, query.collation.as_ref())?;
        Ok(self.execute(collection, &plan)?.counted())
    }

    /// Distinct values of `query.key`, array elements unwound, compared
    /// and ordered under the operation collation.
    pub fn distinct(&self, collection: &str, query: &DistinctQuery) -> Result<Vec<Bson>, DbError> {
        if query.key.is_empty() {
            return Err(DbError::BadValue("distinct key must not be empty".into()));
        }
        let shape = distinct_shape(query)?;
        let plan = self.plan(collection, &shape, query.collation.as_ref())?;
        let collator = plan.collator.as_ref();
        let mut values: Vec<Bson> = Vec::new();
        for doc in self.execute(collection, &plan)?.documents() {
            for found in path::lookup(&doc, &query.key) {
                let PathValue::Found(value) = found else {
                    continue;
                };
                let candidates = match value {
                    Bson::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for candidate in candidates {
                    if !values.iter().any(|v| values_equal(v, &candidate, collator)) {
                        values.push(candidate);
                    }
                }
            }
        }
        values.sort_by(|a, b| compare_values(a, b, collator));
        Ok(values)
    }

    pub fn aggregate(&self, collection: &str, query: &AggregateQuery) -> Result<Vec<Document>, DbError> {
        let pipeline = parse_pipeline(&query.pipeline)?;
        let shape = find_shape(&aggregate_prefix(query, &pipeline.filter, pipeline.sort.as_ref()))?;
        let plan = self.plan(collection, &shape, query.collation.as_ref())?;
        let docs = self.execute(collection, &plan)?.documents();
        run_stages(docs, &pipeline.stages, plan.collator.as_ref())
    }

    // ── Update ──────────────────────────────────────────────────

    pub fn update(&mut self, collection: &str, stmt: &UpdateStatement) -> Result<UpdateResult, DbError> {
        self.check_writable()?;
        let spec = parse_update(&stmt.update)?;
        if stmt.multi && matches!(spec, UpdateSpec::Replacement(_)) {
            return Err(DbError::Query(QueryError::FailedToParse(
                "multi update is not supported for replacement-style update".into(),
            )));
        }
        let shape = update_shape(stmt)?;
        let plan = self.plan(collection, &shape, stmt.collation.as_ref())?;
        let targets = record_ids(&self.execute(collection, &plan)?);

        if targets.is_empty() {
            if !stmt.upsert {
                return Ok(UpdateResult::default());
            }
            let doc = upsert_document(&shape.predicate, &spec)?;
            let coll = self.collection_mut_or_create(collection)?;
            let (_, id) = coll.insert(doc)?;
            return Ok(UpdateResult {
                upserted_id: Some(id),
                ..UpdateResult::default()
            });
        }

        let ns = self.namespace(collection);
        let coll = self
            .state
            .collections
            .get_mut(collection)
            .ok_or(DbError::NamespaceNotFound(ns))?;
        let mut result = UpdateResult::default();
        for rid in targets {
            result.matched += 1;
            if apply_update(coll, rid, &spec)?.is_some() {
                result.modified += 1;
            }
        }
        Ok(result)
    }

    // ── Delete ──────────────────────────────────────────────────

    pub fn delete(&mut self, collection: &str, stmt: &DeleteStatement) -> Result<DeleteResult, DbError> {
        self.check_writable()?;
        let shape = delete_shape(stmt)?;
        let plan = self.plan(collection, &shape, stmt.collation.as_ref())?;
        let targets = record_ids(&self.execute(collection, &plan)?);
        let Some(coll) = self.state.collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let mut deleted = 0;
        for rid in targets {
            if coll.remove(rid)?.is_some() {
                deleted += 1;
            }
        }
        Ok(DeleteResult { deleted })
    }

    // ── Find and modify ─────────────────────────────────────────

    pub fn find_and_modify(
        &mut self,
        collection: &str,
        query: &FindAndModifyQuery,
    ) -> Result<FindAndModifyResult, DbError> {
        self.check_writable()?;
        let spec = match (&query.update, query.remove) {
            (Some(_), true) => {
                return Err(DbError::BadValue("cannot specify both an update and remove=true".into()));
            }
            (None, false) => {
                return Err(DbError::Query(QueryError::FailedToParse(
                    "either an update or remove=true must be specified".into(),
                )));
            }
            (Some(update), false) => Some(parse_update(update)?),
            (None, true) => None,
        };
        if query.remove && query.upsert {
            return Err(DbError::BadValue("cannot specify both upsert=true and remove=true".into()));
        }
        let fields = query.fields.as_ref().map(Projection::parse).transpose()?;
        let project = |doc: Document| match &fields {
            Some(p) => p.apply(&doc),
            None => doc,
        };

        let shape = find_and_modify_shape(query)?;
        let plan = self.plan(collection, &shape, query.collation.as_ref())?;
        let target = record_ids(&self.execute(collection, &plan)?).into_iter().next();

        match (target, spec) {
            (Some(rid), None) => {
                let coll = self.collection_mut(collection)?;
                let old = coll.remove(rid)?;
                Ok(FindAndModifyResult {
                    value: old.map(|d| project(d.as_ref().clone())),
                    ..FindAndModifyResult::default()
                })
            }
            (Some(rid), Some(spec)) => {
                let coll = self.collection_mut(collection)?;
                let old = coll
                    .document(rid)
                    .map(|d| d.as_ref().clone())
                    .ok_or_else(|| DbError::Storage(format!("record {} vanished", rid.0)))?;
                let new = apply_update(coll, rid, &spec)?.unwrap_or_else(|| old.clone());
                Ok(FindAndModifyResult {
                    value: Some(project(if query.new { new } else { old })),
                    updated_existing: true,
                    upserted_id: None,
                })
            }
            (None, Some(spec)) if query.upsert => {
                let doc = upsert_document(&shape.predicate, &spec)?;
                let coll = self.collection_mut_or_create(collection)?;
                let (rid, id) = coll.insert(doc)?;
                let inserted = coll.document(rid).map(|d| d.as_ref().clone());
                Ok(FindAndModifyResult {
                    value: if query.new { inserted.map(project) } else { None },
                    updated_existing: false,
                    upserted_id: Some(id),
                })
            }
            _ => Ok(FindAndModifyResult::default()),
        }
    }

    // ── Bulk write ──────────────────────────────────────────────

    /// Run each statement under its own collation. Ordered writes stop at
    /// the first failure; unordered writes record it and go on.
    pub fn bulk_write(
        &mut self,
        collection: &str,
        models: &[WriteModel],
        ordered: bool,
    ) -> Result<BulkWriteResult, DbError> {
        self.check_writable()?;
        let mut result = BulkWriteResult::default();
        for (index, model) in models.iter().enumerate() {
            let outcome = match model {
                WriteModel::Insert(doc) => self
                    .insert_one(collection, doc.clone())
                    .map(|_| result.inserted += 1),
                WriteModel::Update(stmt) => self.update(collection, stmt).map(|r| {
                    result.matched += r.matched;
                    result.modified += r.modified;
                    if let Some(id) = r.upserted_id {
                        result.upserted.push((index, id));
                    }
                }),
                WriteModel::Delete(stmt) => self
                    .delete(collection, stmt)
                    .map(|r| result.deleted += r.deleted),
            };
            if let Err(e) = outcome {
                result.write_errors.push(WriteError {
                    index,
                    code: e.code().code(),
                    message: e.to_string(),
                });
                if ordered {
                    break;
                }
            }
        }
        Ok(result)
    }

    // ── Explain ─────────────────────────────────────────────────

    /// Describe how `target` would run. Writes are planned and executed
    /// without being applied.
    pub fn explain(
        &self,
        collection: &str,
        target: &ExplainTarget,
        verbosity: Verbosity,
    ) -> Result<Document, DbError> {
        let (shape, collation) = match target {
            ExplainTarget::Find(q) => (find_shape(q)?, q.collation.as_ref()),
            ExplainTarget::Count(q) => (count_shape(q)?, q.collation.as_ref()),
            ExplainTarget::Distinct(q) => (distinct_shape(q)?, q.collation.as_ref()),
            ExplainTarget::Aggregate(q) => {
                let pipeline = parse_pipeline(&q.pipeline)?;
                let prefix = aggregate_prefix(q, &pipeline.filter, pipeline.sort.as_ref());
                (find_shape(&prefix)?, q.collation.as_ref())
            }
            ExplainTarget::Update(s) => {
                parse_update(&s.update)?;
                (update_shape(s)?, s.collation.as_ref())
            }
            ExplainTarget::Delete(s) => (delete_shape(s)?, s.collation.as_ref()),
            ExplainTarget::FindAndModify(q) => (find_and_modify_shape(q)?, q.collation.as_ref()),
        };
        let plan = self.plan(collection, &shape, collation)?;

        let execution = if verbosity >= Verbosity::ExecutionStats {
            Some(self.execute(collection, &plan)?)
        } else {
            None
        };
        let would_write = match (&execution, target) {
            (Some(exec), ExplainTarget::Update(s)) => {
                Some(WouldWrite::Modify(self.would_modify(collection, exec, &s.update)?))
            }
            (Some(exec), ExplainTarget::FindAndModify(q)) => match &q.update {
                Some(update) if !q.remove => {
                    Some(WouldWrite::Modify(self.would_modify(collection, exec, update)?))
                }
                _ => Some(WouldWrite::Delete(record_ids(exec).len() as u64)),
            },
            (Some(exec), ExplainTarget::Delete(_)) => {
                Some(WouldWrite::Delete(record_ids(exec).len() as u64))
            }
            _ => None,
        };

        Ok(explain_document(&ExplainRequest {
            namespace: self.namespace(collection),
            shape: &shape,
            plan: &plan,
            execution: execution.as_ref(),
            would_write,
            naming: self.db.config.stage_naming,
        }))
    }

    /// Plan a find without running it.
    #[cfg(feature = "bench-internals")]
    pub fn plan_find(&self, collection: &str, query: &FindQuery) -> Result<QueryPlan, DbError> {
        let shape = find_shape(query)?;
        self.plan(collection, &shape, query.collation.as_ref())
    }

    // ── Lifecycle ───────────────────────────────────────────────

    pub fn commit(self) -> Result<(), DbError> {
        if self.read_only {
            return Err(DbError::ReadOnly);
        }
        self.db.store.publish(self.state);
        Ok(())
    }

    pub fn rollback(self) -> Result<(), DbError> {
        Ok(())
    }

    // ── Private helpers ─────────────────────────────────────────

    fn check_writable(&self) -> Result<(), DbError> {
        if self.read_only {
            return Err(DbError::ReadOnly);
        }
        Ok(())
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.db.config.name, collection)
    }

    fn collection(&self, name: &str) -> Result<&CollectionState, DbError> {
        self.state
            .collections
            .get(name)
            .ok_or_else(|| DbError::NamespaceNotFound(self.namespace(name)))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut CollectionState, DbError> {
        let ns = self.namespace(name);
        self.state
            .collections
            .get_mut(name)
            .ok_or(DbError::NamespaceNotFound(ns))
    }

    /// Writes create their collection on first use.
    fn collection_mut_or_create(&mut self, name: &str) -> Result<&mut CollectionState, DbError> {
        if !self.state.collections.contains_key(name) {
            self.create_collection(&CollectionConfig::new(name))?;
        }
        self.collection_mut(name)
    }

    fn collator_for(&self, collection: &str, requested: Option<&Bson>) -> Result<Option<Collator>, DbError> {
        let default = self
            .state
            .collections
            .get(collection)
            .and_then(|c| c.meta.default_collator.as_ref());
        resolve_collation(requested, default, &self.db.config.collator_version)
    }

    fn plan(
        &self,
        collection: &str,
        shape: &QueryShape,
        collation: Option<&Bson>,
    ) -> Result<QueryPlan, DbError> {
        let collator = self.collator_for(collection, collation)?;
        match self.state.collections.get(collection) {
            None => Ok(planner::eof_plan(collator)),
            Some(state) => planner::plan(
                &PlanningContext {
                    collection: state,
                    collator: collator.as_ref(),
                },
                shape,
            ),
        }
    }

    fn execute(&self, collection: &str, plan: &QueryPlan) -> Result<Execution, DbError> {
        Executor::new(
            self.state.collections.get(collection),
            plan.collator.as_ref(),
            self.db.config.max_sort_documents,
        )
        .execute(&plan.root)
    }

    fn would_modify(&self, collection: &str, exec: &Execution, update: &Document) -> Result<u64, DbError> {
        let spec = parse_update(update)?;
        let Some(coll) = self.state.collections.get(collection) else {
            return Ok(0);
        };
        let mut n = 0;
        for rid in record_ids(exec) {
            if let Some(doc) = coll.document(rid)
                && spec.apply(doc, false)? != **doc
            {
                n += 1;
            }
        }
        Ok(n)
    }
}

// ── Shapes ──────────────────────────────────────────────────────

fn find_shape(query: &FindQuery) -> Result<QueryShape, DbError> {
    let mut shape = QueryShape::new(OpKind::Find, parse_filter(&query.filter)?);
    if let Some(sort) = &query.sort {
        shape.sort = parse_sort(sort)?;
    }
    shape.projection = query.projection.as_ref().map(Projection::parse).transpose()?;
    shape.skip = query.skip.filter(|n| *n > 0);
    shape.limit = query.limit.filter(|n| *n > 0);
    shape.hint = query.hint.clone();
    shape.min = query.min.clone();
    shape.max = query.max.clone();
    shape.return_key = query.return_key;
    Ok(shape)
}

fn count_shape(query: &CountQuery) -> Result<QueryShape, DbError> {
    let mut shape = QueryShape::new(OpKind::Count, parse_filter(&query.filter)?);
    shape.skip = query.skip.filter(|n| *n > 0);
    shape.limit = query.limit.filter(|n| *n > 0);
    shape.hint = query.hint.clone();
    Ok(shape)
}

fn distinct_shape(query: &DistinctQuery) -> Result<QueryShape, DbError> {
    let op = OpKind::Distinct {
        key: query.key.clone(),
    };
    let mut shape = QueryShape::new(op, parse_filter(&query.filter)?);
    shape.hint = query.hint.clone();
    Ok(shape)
}

fn update_shape(stmt: &UpdateStatement) -> Result<QueryShape, DbError> {
    let op = OpKind::Update { multi: stmt.multi };
    let mut shape = QueryShape::new(op, parse_filter(&stmt.filter)?);
    shape.hint = stmt.hint.clone();
    Ok(shape)
}

fn delete_shape(stmt: &DeleteStatement) -> Result<QueryShape, DbError> {
    let op = OpKind::Delete { multi: stmt.multi };
    let mut shape = QueryShape::new(op, parse_filter(&stmt.filter)?);
    shape.hint = stmt.hint.clone();
    Ok(shape)
}

fn find_and_modify_shape(query: &FindAndModifyQuery) -> Result<QueryShape, DbError> {
    let op = if query.remove {
        OpKind::Delete { multi: false }
    } else {
        OpKind::Update { multi: false }
    };
    let mut shape = QueryShape::new(op, parse_filter(&query.filter)?);
    if let Some(sort) = &query.sort {
        shape.sort = parse_sort(sort)?;
    }
    shape.hint = query.hint.clone();
    Ok(shape)
}

/// The part of a pipeline the planner answers, as a find.
fn aggregate_prefix(query: &AggregateQuery, filter: &Document, sort: Option<&Document>) -> FindQuery {
    FindQuery {
        filter: filter.clone(),
        sort: sort.cloned(),
        hint: query.hint.clone(),
        collation: query.collation.clone(),
        ..FindQuery::default()
    }
}

// ── Write helpers ───────────────────────────────────────────────

fn build_index(collection: &mut CollectionState, spec: &IndexSpec, installed: &str) -> Result<bool, DbError> {
    let desc = collection.meta.describe_index(spec, installed)?;
    match collection.meta.admit_index(&desc)? {
        IndexAdmission::AlreadyExists => Ok(false),
        IndexAdmission::Create => {
            info!(
                collection = %collection.meta.name,
                index = %desc.name,
                collation = ?desc.collator.as_ref().map(|c| c.spec().locale.as_str()),
                "index created"
            );
            collection.add_index(desc)?;
            Ok(true)
        }
    }
}

fn record_ids(exec: &Execution) -> Vec<RecordId> {
    exec.rows.iter().filter_map(|r| r.rid).collect()
}

/// Apply `spec` to the record at `rid`; the new document when it changed.
fn apply_update(
    coll: &mut CollectionState,
    rid: RecordId,
    spec: &UpdateSpec,
) -> Result<Option<Document>, DbError> {
    let Some(old) = coll.document(rid).cloned() else {
        return Ok(None);
    };
    let new = spec.apply(&old, false)?;
    if new == *old {
        return Ok(None);
    }
    coll.replace(rid, new.clone())?;
    Ok(Some(new))
}

/// The document an upsert inserts: the predicate's equality fields, then
/// the update applied on top.
fn upsert_document(predicate: &Expression, spec: &UpdateSpec) -> Result<Document, DbError> {
    let mut seed = Document::new();
    for (field, value) in predicate.equality_seed() {
        path::set(&mut seed, field, value.clone())?;
    }
    match spec {
        UpdateSpec::Replacement(_) => {
            let mut base = Document::new();
            if let Some(id) = seed.get("_id") {
                base.insert("_id", id.clone());
            }
            Ok(spec.apply(&base, true)?)
        }
        UpdateSpec::Operators(_) => Ok(spec.apply(&seed, true)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn read_only_transaction_rejects_writes() {
        let db = Database::default();
        let mut txn = db.begin(true).unwrap();
        let err = txn.insert_one("c", doc! { "a": 1 }).unwrap_err();
        assert_eq!(err, DbError::ReadOnly);
        assert_eq!(txn.commit().unwrap_err(), DbError::ReadOnly);
    }

    #[test]
    fn rollback_discards_changes() {
        let db = Database::default();
        let mut txn = db.begin(false).unwrap();
        txn.insert_one("c", doc! { "_id": 1 }).unwrap();
        txn.rollback().unwrap();

        let txn = db.begin(true).unwrap();
        assert!(txn.list_collections().is_empty());
    }

    #[test]
    fn upsert_seeds_from_equalities() {
        let predicate = parse_filter(&doc! { "a": 1, "b": { "$gt": 2 } }).unwrap();
        let spec = parse_update(&doc! { "$set": { "c": 3 }, "$setOnInsert": { "d": 4 } }).unwrap();
        let doc = upsert_document(&predicate, &spec).unwrap();
        assert_eq!(doc, doc! { "a": 1, "c": 3, "d": 4 });
    }

    #[test]
    fn create_indexes_is_all_or_nothing() {
        let db = Database::default();
        let mut txn = db.begin(false).unwrap();
        txn.create_collection(&CollectionConfig::new("c")).unwrap();
        let err = txn
            .create_indexes(
                "c",
                &[
                    IndexSpec::new(doc! { "a": 1 }),
                    IndexSpec::new(doc! { "b": 1 }).version(3),
                ],
            )
            .unwrap_err();
        assert_eq!(err.code().code(), 67);
        assert_eq!(txn.list_indexes("c").unwrap().len(), 1);
    }
}
