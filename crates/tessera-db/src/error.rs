use tessera_collation::CollationError;
use tessera_query::QueryError;
use thiserror::Error;

/// Numeric error codes surfaced through the command interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    BadValue,
    FailedToParse,
    TypeMismatch,
    IllegalOperation,
    NamespaceNotFound,
    IndexNotFound,
    NamespaceExists,
    ImmutableField,
    CannotCreateIndex,
    InvalidOptions,
    IndexOptionsConflict,
    IndexKeySpecsConflict,
    IncompatibleCollationVersion,
    CannotIndexParallelArrays,
    InvalidIndexSpecificationOption,
    NoQueryExecutionPlans,
    QueryExceededMemoryLimitNoDiskUseAllowed,
    DuplicateKey,
    UnrecognizedPipelineStage,
    MinMaxIndexMismatch,
    MinMaxBoundsOrder,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::InternalError => 1,
            ErrorCode::BadValue => 2,
            ErrorCode::FailedToParse => 9,
            ErrorCode::TypeMismatch => 14,
            ErrorCode::IllegalOperation => 20,
            ErrorCode::NamespaceNotFound => 26,
            ErrorCode::IndexNotFound => 27,
            ErrorCode::NamespaceExists => 48,
            ErrorCode::ImmutableField => 66,
            ErrorCode::CannotCreateIndex => 67,
            ErrorCode::InvalidOptions => 72,
            ErrorCode::IndexOptionsConflict => 85,
            ErrorCode::IndexKeySpecsConflict => 86,
            ErrorCode::IncompatibleCollationVersion => 161,
            ErrorCode::CannotIndexParallelArrays => 171,
            ErrorCode::InvalidIndexSpecificationOption => 197,
            ErrorCode::NoQueryExecutionPlans => 291,
            ErrorCode::QueryExceededMemoryLimitNoDiskUseAllowed => 292,
            ErrorCode::DuplicateKey => 11000,
            ErrorCode::UnrecognizedPipelineStage => 40324,
            ErrorCode::MinMaxIndexMismatch => 51174,
            ErrorCode::MinMaxBoundsOrder => 51175,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InternalError => "InternalError",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::FailedToParse => "FailedToParse",
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::IllegalOperation => "IllegalOperation",
            ErrorCode::NamespaceNotFound => "NamespaceNotFound",
            ErrorCode::IndexNotFound => "IndexNotFound",
            ErrorCode::NamespaceExists => "NamespaceExists",
            ErrorCode::ImmutableField => "ImmutableField",
            ErrorCode::CannotCreateIndex => "CannotCreateIndex",
            ErrorCode::InvalidOptions => "InvalidOptions",
            ErrorCode::IndexOptionsConflict => "IndexOptionsConflict",
            ErrorCode::IndexKeySpecsConflict => "IndexKeySpecsConflict",
            ErrorCode::IncompatibleCollationVersion => "IncompatibleCollationVersion",
            ErrorCode::CannotIndexParallelArrays => "CannotIndexParallelArrays",
            ErrorCode::InvalidIndexSpecificationOption => "InvalidIndexSpecificationOption",
            ErrorCode::NoQueryExecutionPlans => "NoQueryExecutionPlans",
            ErrorCode::QueryExceededMemoryLimitNoDiskUseAllowed => {
                "QueryExceededMemoryLimitNoDiskUseAllowed"
            }
            ErrorCode::DuplicateKey => "DuplicateKey",
            ErrorCode::UnrecognizedPipelineStage => "Location40324",
            ErrorCode::MinMaxIndexMismatch => "Location51174",
            ErrorCode::MinMaxBoundsOrder => "Location51175",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    #[error(transparent)]
    Collation(#[from] CollationError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    BadValue(String),

    #[error("{0}")]
    InvalidOptions(String),

    #[error("ns does not exist: {0}")]
    NamespaceNotFound(String),

    #[error("collection already exists: {0}")]
    NamespaceExists(String),

    #[error("index not found with name [{0}]")]
    IndexNotFound(String),

    #[error("{0}")]
    CannotCreateIndex(String),

    #[error("{0}")]
    IndexOptionsConflict(String),

    #[error("{0}")]
    IndexKeySpecsConflict(String),

    #[error("{0}")]
    InvalidIndexOption(String),

    #[error("E11000 duplicate key error collection: {collection} index: {index} dup key: {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    #[error("cannot index parallel arrays [{0}] [{1}]")]
    ParallelArrays(String, String),

    #[error("no query solutions: {0}")]
    NoQueryExecutionPlans(String),

    #[error("{0}")]
    MinMaxIndexMismatch(String),

    #[error("{0}")]
    MinMaxBoundsOrder(String),

    #[error("sort exceeded the in-memory limit of {0} documents")]
    SortLimitExceeded(usize),

    #[error("unrecognized pipeline stage name: '{0}'")]
    UnrecognizedPipelineStage(String),

    #[error("cannot write in a read-only transaction")]
    ReadOnly,

    #[error("storage error: {0}")]
    Storage(String),
}

impl DbError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Collation(CollationError::Invalid(_)) => ErrorCode::BadValue,
            DbError::Collation(CollationError::IncompatibleVersion { .. }) => {
                ErrorCode::IncompatibleCollationVersion
            }
            DbError::Query(QueryError::BadValue(_)) => ErrorCode::BadValue,
            DbError::Query(QueryError::FailedToParse(_)) => ErrorCode::FailedToParse,
            DbError::Query(QueryError::TypeMismatch(_)) => ErrorCode::TypeMismatch,
            DbError::Query(QueryError::ImmutableField(_)) => ErrorCode::ImmutableField,
            DbError::BadValue(_) => ErrorCode::BadValue,
            DbError::InvalidOptions(_) => ErrorCode::InvalidOptions,
            DbError::NamespaceNotFound(_) => ErrorCode::NamespaceNotFound,
            DbError::NamespaceExists(_) => ErrorCode::NamespaceExists,
            DbError::IndexNotFound(_) => ErrorCode::IndexNotFound,
            DbError::CannotCreateIndex(_) => ErrorCode::CannotCreateIndex,
            DbError::IndexOptionsConflict(_) => ErrorCode::IndexOptionsConflict,
            DbError::IndexKeySpecsConflict(_) => ErrorCode::IndexKeySpecsConflict,
            DbError::InvalidIndexOption(_) => ErrorCode::InvalidIndexSpecificationOption,
            DbError::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            DbError::ParallelArrays(..) => ErrorCode::CannotIndexParallelArrays,
            DbError::NoQueryExecutionPlans(_) => ErrorCode::NoQueryExecutionPlans,
            DbError::MinMaxIndexMismatch(_) => ErrorCode::MinMaxIndexMismatch,
            DbError::MinMaxBoundsOrder(_) => ErrorCode::MinMaxBoundsOrder,
            DbError::SortLimitExceeded(_) => ErrorCode::QueryExceededMemoryLimitNoDiskUseAllowed,
            DbError::UnrecognizedPipelineStage(_) => ErrorCode::UnrecognizedPipelineStage,
            DbError::ReadOnly => ErrorCode::IllegalOperation,
            DbError::Storage(_) => ErrorCode::InternalError,
        }
    }

    /// The `{ok: 0, errmsg, code, codeName}` reply for this error.
    pub fn to_response(&self) -> bson::Document {
        let code = self.code();
        bson::doc! {
            "ok": 0.0,
            "errmsg": self.to_string(),
            "code": code.code(),
            "codeName": code.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collation_errors_map_to_codes() {
        let invalid: DbError = CollationError::Invalid("x".into()).into();
        assert_eq!(invalid.code().code(), 2);
        let version: DbError = CollationError::IncompatibleVersion {
            requested: "1".into(),
            installed: "57.1".into(),
        }
        .into();
        assert_eq!(version.code().code(), 161);
    }

    #[test]
    fn response_shape() {
        let resp = DbError::MinMaxBoundsOrder("min must be less than max".into()).to_response();
        assert_eq!(resp.get_f64("ok").unwrap(), 0.0);
        assert_eq!(resp.get_i32("code").unwrap(), 51175);
        assert_eq!(resp.get_str("codeName").unwrap(), "Location51175");
    }
}
