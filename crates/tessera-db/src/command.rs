//! Document commands in the wire shape drivers send, answered through the
//! typed transaction API.

use bson::{Bson, Document, doc};
use tessera_query::value::as_f64;
use tessera_query::{
    AggregateQuery, CountQuery, DeleteStatement, DistinctQuery, FindAndModifyQuery, FindQuery,
    Hint, UpdateStatement,
};
use tracing::debug;

use crate::collection::{CollectionConfig, IndexSpec};
use crate::database::{Database, DatabaseTransaction, ExplainTarget};
use crate::error::DbError;
use crate::explain::Verbosity;
use crate::result::{BulkWriteResult, WriteModel};

impl Database {
    /// Run one command document. Failures come back as
    /// `{ok: 0, errmsg, code, codeName}`.
    pub fn run_command(&self, command: &Document) -> Document {
        match self.dispatch(command) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, code = e.code().code(), "command failed");
                e.to_response()
            }
        }
    }

    fn dispatch(&self, command: &Document) -> Result<Document, DbError> {
        let Some(name) = command.keys().next() else {
            return Err(DbError::BadValue("empty command".into()));
        };
        match name.as_str() {
            "create" => self.write(|txn| {
                let mut config = CollectionConfig::new(string_arg(command, "create")?);
                config.collation = command.get("collation").cloned();
                txn.create_collection(&config)?;
                Ok(ok())
            }),
            "drop" => self.write(|txn| {
                let name = string_arg(command, "drop")?;
                txn.drop_collection(&name)?;
                let mut reply = doc! { "ns": format!("{}.{}", self.config().name, name) };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "listCollections" => self.read(|txn| {
                let wanted = command
                    .get_document("filter")
                    .ok()
                    .and_then(|f| f.get_str("name").ok());
                let batch: Vec<Bson> = txn
                    .list_collections()
                    .into_iter()
                    .filter(|info| wanted.is_none_or(|w| info.get_str("name").ok() == Some(w)))
                    .map(Bson::Document)
                    .collect();
                Ok(cursor(&format!("{}.$cmd.listCollections", self.config().name), batch))
            }),
            "createIndexes" => self.write(|txn| {
                let collection = string_arg(command, "createIndexes")?;
                let specs = array_arg(command, "indexes")?
                    .iter()
                    .map(|entry| match entry {
                        Bson::Document(d) => IndexSpec::from_document(d),
                        other => Err(DbError::BadValue(format!(
                            "index specification must be an object, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let result = txn.create_indexes(&collection, &specs)?;
                let mut reply = doc! {
                    "createdCollectionAutomatically": result.created_collection_automatically,
                    "numIndexesBefore": int(result.num_indexes_before as u64),
                    "numIndexesAfter": int(result.num_indexes_after as u64),
                };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "listIndexes" => self.read(|txn| {
                let collection = string_arg(command, "listIndexes")?;
                let batch = txn
                    .list_indexes(&collection)?
                    .into_iter()
                    .map(Bson::Document)
                    .collect();
                Ok(cursor(&self.namespace(&collection), batch))
            }),
            "dropIndexes" => self.write(|txn| {
                let collection = string_arg(command, "dropIndexes")?;
                let target = command
                    .get("index")
                    .ok_or_else(|| DbError::BadValue("dropIndexes requires an 'index' field".into()))?;
                txn.drop_index(&collection, target)?;
                Ok(ok())
            }),
            "reIndex" => self.write(|txn| {
                let n = txn.reindex(&string_arg(command, "reIndex")?)?;
                let mut reply = doc! { "nIndexesWas": int(n as u64), "nIndexes": int(n as u64) };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "cloneCollectionAsCapped" => self.write(|txn| {
                let source = string_arg(command, "cloneCollectionAsCapped")?;
                let target = string_arg(command, "toCollection")?;
                txn.clone_collection(&source, &target)?;
                Ok(ok())
            }),
            "insert" => self.write(|txn| {
                let collection = string_arg(command, "insert")?;
                let models: Vec<WriteModel> = array_arg(command, "documents")?
                    .iter()
                    .map(|d| match d {
                        Bson::Document(d) => Ok(WriteModel::Insert(d.clone())),
                        other => Err(DbError::BadValue(format!("document to insert must be an object, got {other}"))),
                    })
                    .collect::<Result<_, _>>()?;
                let result = txn.bulk_write(&collection, &models, ordered(command))?;
                Ok(write_reply(doc! { "n": int(result.inserted) }, &result))
            }),
            "update" => self.write(|txn| {
                let collection = string_arg(command, "update")?;
                let models = array_arg(command, "updates")?
                    .iter()
                    .map(|s| parse_update_statement(as_document(s, "update statement")?).map(WriteModel::Update))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = txn.bulk_write(&collection, &models, ordered(command))?;
                let mut reply = doc! {
                    "n": int(result.matched + result.upserted.len() as u64),
                    "nModified": int(result.modified),
                };
                if !result.upserted.is_empty() {
                    let upserted: Vec<Bson> = result
                        .upserted
                        .iter()
                        .map(|(index, id)| Bson::Document(doc! { "index": int(*index as u64), "_id": id.clone() }))
                        .collect();
                    reply.insert("upserted", upserted);
                }
                Ok(write_reply(reply, &result))
            }),
            "delete" => self.write(|txn| {
                let collection = string_arg(command, "delete")?;
                let models = array_arg(command, "deletes")?
                    .iter()
                    .map(|s| parse_delete_statement(as_document(s, "delete statement")?).map(WriteModel::Delete))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = txn.bulk_write(&collection, &models, ordered(command))?;
                Ok(write_reply(doc! { "n": int(result.deleted) }, &result))
            }),
            "findAndModify" => self.write(|txn| {
                let collection = string_arg(command, "findAndModify")?;
                let result = txn.find_and_modify(&collection, &parse_find_and_modify(command)?)?;
                let n = u64::from(result.value.is_some() || result.upserted_id.is_some());
                let mut last = doc! { "n": int(n), "updatedExisting": result.updated_existing };
                if let Some(id) = &result.upserted_id {
                    last.insert("upserted", id.clone());
                }
                let mut reply = doc! {
                    "lastErrorObject": last,
                    "value": result.value.map(Bson::Document).unwrap_or(Bson::Null),
                };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "find" => self.read(|txn| {
                let collection = string_arg(command, "find")?;
                let docs = txn.find(&collection, &parse_find(command)?)?;
                Ok(cursor(&self.namespace(&collection), docs.into_iter().map(Bson::Document).collect()))
            }),
            "count" => self.read(|txn| {
                let collection = string_arg(command, "count")?;
                let n = txn.count(&collection, &parse_count(command)?)?;
                let mut reply = doc! { "n": int(n) };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "distinct" => self.read(|txn| {
                let collection = string_arg(command, "distinct")?;
                let values = txn.distinct(&collection, &parse_distinct(command)?)?;
                let mut reply = doc! { "values": values };
                reply.insert("ok", 1.0);
                Ok(reply)
            }),
            "aggregate" => self.read(|txn| {
                let collection = string_arg(command, "aggregate")?;
                let docs = txn.aggregate(&collection, &parse_aggregate(command)?)?;
                Ok(cursor(&self.namespace(&collection), docs.into_iter().map(Bson::Document).collect()))
            }),
            "explain" => self.read(|txn| {
                let inner = command
                    .get_document("explain")
                    .map_err(|_| DbError::BadValue("explain requires a command object".into()))?;
                let verbosity = match command.get_str("verbosity") {
                    Ok(v) => Verbosity::parse(v)?,
                    Err(_) => Verbosity::AllPlansExecution,
                };
                let (collection, target) = parse_explain_target(inner)?;
                txn.explain(&collection, &target, verbosity)
            }),
            other => Err(DbError::BadValue(format!("no such command: '{other}'"))),
        }
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.config().name, collection)
    }

    fn read<F>(&self, f: F) -> Result<Document, DbError>
    where
        F: FnOnce(&DatabaseTransaction<'_>) -> Result<Document, DbError>,
    {
        let txn = self.begin(true)?;
        let reply = f(&txn)?;
        txn.rollback()?;
        Ok(reply)
    }

    /// Run `f` in a write transaction, committing only on success.
    fn write<F>(&self, f: F) -> Result<Document, DbError>
    where
        F: FnOnce(&mut DatabaseTransaction<'_>) -> Result<Document, DbError>,
    {
        let mut txn = self.begin(false)?;
        let reply = f(&mut txn)?;
        txn.commit()?;
        Ok(reply)
    }
}

// ── Replies ─────────────────────────────────────────────────────

fn ok() -> Document {
    doc! { "ok": 1.0 }
}

fn int(n: u64) -> Bson {
    match i32::try_from(n) {
        Ok(n) => Bson::Int32(n),
        Err(_) => Bson::Int64(n as i64),
    }
}

fn cursor(ns: &str, batch: Vec<Bson>) -> Document {
    doc! {
        "cursor": { "firstBatch": batch, "id": 0_i64, "ns": ns },
        "ok": 1.0,
    }
}

fn write_reply(mut reply: Document, result: &BulkWriteResult) -> Document {
    if !result.write_errors.is_empty() {
        let errors: Vec<Bson> = result
            .write_errors
            .iter()
            .map(|e| {
                Bson::Document(doc! {
                    "index": int(e.index as u64),
                    "code": e.code,
                    "errmsg": e.message.as_str(),
                })
            })
            .collect();
        reply.insert("writeErrors", errors);
    }
    reply.insert("ok", 1.0);
    reply
}

// ── Argument parsing ────────────────────────────────────────────

fn string_arg(command: &Document, field: &str) -> Result<String, DbError> {
    match command.get(field) {
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(other) => Err(DbError::BadValue(format!(
            "'{field}' must be a string, got {other}"
        ))),
        None => Err(DbError::BadValue(format!("missing required field '{field}'"))),
    }
}

fn array_arg<'a>(command: &'a Document, field: &str) -> Result<&'a Vec<Bson>, DbError> {
    command
        .get_array(field)
        .map_err(|_| DbError::BadValue(format!("'{field}' must be an array")))
}

fn as_document<'a>(value: &'a Bson, what: &str) -> Result<&'a Document, DbError> {
    match value {
        Bson::Document(d) => Ok(d),
        other => Err(DbError::BadValue(format!("{what} must be an object, got {other}"))),
    }
}

fn doc_arg(command: &Document, field: &str) -> Result<Option<Document>, DbError> {
    match command.get(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Document(d)) => Ok(Some(d.clone())),
        Some(other) => Err(DbError::BadValue(format!(
            "'{field}' must be an object, got {other}"
        ))),
    }
}

fn count_arg(command: &Document, field: &str) -> Result<Option<u64>, DbError> {
    match command.get(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => {
            let n = as_f64(value)
                .ok_or_else(|| DbError::BadValue(format!("'{field}' must be a number, got {value}")))?;
            if n < 0.0 {
                // A negative limit means "at most this many".
                if field == "limit" {
                    return Ok(Some(n.abs() as u64));
                }
                return Err(DbError::BadValue(format!("'{field}' must be non-negative")));
            }
            Ok(Some(n as u64))
        }
    }
}

fn bool_arg(command: &Document, field: &str) -> bool {
    match command.get(field) {
        Some(Bson::Boolean(b)) => *b,
        Some(other) => as_f64(other).is_some_and(|n| n != 0.0),
        None => false,
    }
}

fn ordered(command: &Document) -> bool {
    command.get_bool("ordered").unwrap_or(true)
}

fn hint_arg(command: &Document) -> Result<Option<Hint>, DbError> {
    match command.get("hint") {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => Ok(Some(Hint::from_bson(value)?)),
    }
}

fn collation_arg(command: &Document) -> Option<Bson> {
    command.get("collation").cloned()
}

fn parse_find(command: &Document) -> Result<FindQuery, DbError> {
    Ok(FindQuery {
        filter: doc_arg(command, "filter")?.unwrap_or_default(),
        projection: doc_arg(command, "projection")?,
        sort: doc_arg(command, "sort")?,
        skip: count_arg(command, "skip")?,
        limit: count_arg(command, "limit")?,
        hint: hint_arg(command)?,
        min: doc_arg(command, "min")?,
        max: doc_arg(command, "max")?,
        return_key: bool_arg(command, "returnKey"),
        collation: collation_arg(command),
    })
}

fn parse_count(command: &Document) -> Result<CountQuery, DbError> {
    Ok(CountQuery {
        filter: doc_arg(command, "query")?.unwrap_or_default(),
        skip: count_arg(command, "skip")?,
        limit: count_arg(command, "limit")?,
        hint: hint_arg(command)?,
        collation: collation_arg(command),
    })
}

fn parse_distinct(command: &Document) -> Result<DistinctQuery, DbError> {
    Ok(DistinctQuery {
        key: string_arg(command, "key")?,
        filter: doc_arg(command, "query")?.unwrap_or_default(),
        hint: hint_arg(command)?,
        collation: collation_arg(command),
    })
}

fn parse_aggregate(command: &Document) -> Result<AggregateQuery, DbError> {
    let pipeline = array_arg(command, "pipeline")?
        .iter()
        .map(|stage| as_document(stage, "pipeline stage").cloned())
        .collect::<Result<_, _>>()?;
    Ok(AggregateQuery {
        pipeline,
        hint: hint_arg(command)?,
        collation: collation_arg(command),
    })
}

fn parse_update_statement(stmt: &Document) -> Result<UpdateStatement, DbError> {
    Ok(UpdateStatement {
        filter: doc_arg(stmt, "q")?.unwrap_or_default(),
        update: doc_arg(stmt, "u")?
            .ok_or_else(|| DbError::BadValue("update statement requires 'u'".into()))?,
        multi: bool_arg(stmt, "multi"),
        upsert: bool_arg(stmt, "upsert"),
        hint: hint_arg(stmt)?,
        collation: collation_arg(stmt),
    })
}

/// `limit: 0` deletes every match, `limit: 1` at most one.
fn parse_delete_statement(stmt: &Document) -> Result<DeleteStatement, DbError> {
    let limit = count_arg(stmt, "limit")?.unwrap_or(0);
    if limit > 1 {
        return Err(DbError::BadValue(format!(
            "the limit field in delete objects must be 0 or 1, got {limit}"
        )));
    }
    Ok(DeleteStatement {
        filter: doc_arg(stmt, "q")?.unwrap_or_default(),
        multi: limit == 0,
        hint: hint_arg(stmt)?,
        collation: collation_arg(stmt),
    })
}

fn parse_find_and_modify(command: &Document) -> Result<FindAndModifyQuery, DbError> {
    Ok(FindAndModifyQuery {
        filter: doc_arg(command, "query")?.unwrap_or_default(),
        sort: doc_arg(command, "sort")?,
        update: doc_arg(command, "update")?,
        remove: bool_arg(command, "remove"),
        new: bool_arg(command, "new"),
        fields: doc_arg(command, "fields")?,
        upsert: bool_arg(command, "upsert"),
        hint: hint_arg(command)?,
        collation: collation_arg(command),
    })
}

/// Write explains describe exactly one statement.
fn single_statement<'a>(command: &'a Document, field: &str) -> Result<&'a Document, DbError> {
    match array_arg(command, field)?.as_slice() {
        [only] => as_document(only, "statement"),
        _ => Err(DbError::InvalidOptions(format!(
            "explain of a write must contain exactly one entry in '{field}'"
        ))),
    }
}

fn parse_explain_target(inner: &Document) -> Result<(String, ExplainTarget), DbError> {
    let Some(name) = inner.keys().next() else {
        return Err(DbError::BadValue("explain requires a command object".into()));
    };
    let collection = string_arg(inner, name)?;
    let target = match name.as_str() {
        "find" => ExplainTarget::Find(parse_find(inner)?),
        "count" => ExplainTarget::Count(parse_count(inner)?),
        "distinct" => ExplainTarget::Distinct(parse_distinct(inner)?),
        "aggregate" => ExplainTarget::Aggregate(parse_aggregate(inner)?),
        "update" => ExplainTarget::Update(parse_update_statement(single_statement(inner, "updates")?)?),
        "delete" => ExplainTarget::Delete(parse_delete_statement(single_statement(inner, "deletes")?)?),
        "findAndModify" => ExplainTarget::FindAndModify(parse_find_and_modify(inner)?),
        other => return Err(DbError::BadValue(format!("explain is not supported for '{other}'"))),
    };
    Ok((collection, target))
}
