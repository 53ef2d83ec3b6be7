use thiserror::Error;

#[derive(Error, Debug)]
pub enum PullError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// A collaborator broke its contract. Never converted into a job failure.
    #[error("Invariant violated: {message}")]
    Invariant { message: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PullError {
    pub fn missing_field(field: &str) -> Self {
        PullError::MalformedPayload(format!("missing required field '{}'", field))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        PullError::Invariant { message: message.into() }
    }
}

/// Failures raised by a [`crate::storage::Storage`] backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{entity} with external id {external_id} already exists")]
    UniqueViolation { entity: &'static str, external_id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage backend error: {message}")]
    Backend { message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }

    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, PullError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;
