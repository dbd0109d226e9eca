use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("sqlkv: key not found: {0}")]
    NotFound(String),

    #[error("sqlkv: store is empty")]
    Empty,

    #[error("sqlkv: serialization error: {0}")]
    Serialization(String),

    #[error("sqlkv: store closed")]
    Closed,

    #[error("sqlkv: invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("sqlkv: storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("sqlkv: config error: {0}")]
    Config(String),
}

impl KVError {
    /// Returns true if the error reports a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KVError::NotFound(_))
    }
}

/// Result type for store operations.
pub type KVResult<T> = Result<T, KVError>;
