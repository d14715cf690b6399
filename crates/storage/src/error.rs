use models::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The snapshot write or the commit failed. Pending relational work was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("schema setup failed: {0}")]
    Schema(String),
    #[error("query failed: {0}")]
    Query(String),
    /// The JSON document exists but cannot be rehydrated.
    #[error("corrupt storage document: {0}")]
    Corrupt(String),
    #[error("no open storage session; call reload first")]
    SessionClosed,
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl StorageError {
    /// Stable numeric code, suitable for exit statuses and log fields.
    pub fn code(&self) -> u16 {
        match self {
            StorageError::Persistence(_) => 1001,
            StorageError::Connection(_) => 1002,
            StorageError::Schema(_) => 1003,
            StorageError::Query(_) => 1004,
            StorageError::Corrupt(_) => 1005,
            StorageError::SessionClosed => 1006,
            StorageError::Model(_) => 1007,
        }
    }

    pub(crate) fn query<E: std::fmt::Display>(e: E) -> Self {
        StorageError::Query(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
