mod aggregate;
mod catalog;
mod collection;
mod command;
mod config;
pub(crate) mod database;
mod error;
mod executor;
pub mod explain;
mod expression;
mod keys;
mod planner;
mod result;
mod store;

pub use bson::{Bson, Document};
pub use catalog::{CollectionMeta, ID_INDEX_NAME, IndexDescriptor, PartialFilter};
pub use collection::{CollectionConfig, IndexSpec};
pub use config::{DatabaseConfig, StageNaming};
pub use database::{Database, DatabaseTransaction, ExplainTarget};
pub use error::{DbError, ErrorCode};
pub use explain::Verbosity;
pub use result::{
    BulkWriteResult, CreateIndexesResult, DeleteResult, FindAndModifyResult, InsertResult,
    UpdateResult, WriteError, WriteModel,
};
pub use tessera_query::{
    AggregateQuery, CountQuery, DeleteStatement, DistinctQuery, FindAndModifyQuery, FindQuery,
    Hint, UpdateStatement,
};

#[cfg(feature = "bench-internals")]
pub mod bench {
    pub use crate::database::Database;
    pub use crate::planner::plan::{OpKind, PlanNode, QueryPlan, QueryShape, ScanDirection};
}
