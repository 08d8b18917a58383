use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollationError {
    /// The collation document is malformed or names an unsupported option.
    #[error("invalid collation: {0}")]
    Invalid(String),

    /// The requested comparison-table revision is not the one installed.
    #[error("collation version mismatch: requested {requested}, installed {installed}")]
    IncompatibleVersion { requested: String, installed: String },
}

impl CollationError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CollationError::Invalid(msg.into())
    }
}
