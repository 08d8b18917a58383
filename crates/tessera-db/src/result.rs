use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use tessera_query::{DeleteStatement, UpdateStatement};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResult {
    pub id: Bson,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindAndModifyResult {
    /// Pre- or post-image, per the request; `None` when nothing matched.
    pub value: Option<Document>,
    pub updated_existing: bool,
    pub upserted_id: Option<Bson>,
}

/// One entry of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    Insert(Document),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

/// A statement that failed; statements after it were not attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteError {
    pub index: usize,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    pub upserted: Vec<(usize, Bson)>,
    pub write_errors: Vec<WriteError>,
}

/// Outcome of a `createIndexes` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexesResult {
    pub created_collection_automatically: bool,
    pub num_indexes_before: usize,
    pub num_indexes_after: usize,
}
