use thiserror::Error;

/// Errors raised while parsing or applying query-language documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{0}")]
    BadValue(String),

    #[error("{0}")]
    FailedToParse(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("performing an update on the path '{0}' would modify the immutable field '_id'")]
    ImmutableField(String),
}

impl QueryError {
    pub(crate) fn bad_value(msg: impl Into<String>) -> Self {
        QueryError::BadValue(msg.into())
    }
}
