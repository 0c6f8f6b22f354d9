//! Storage error types.

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("s3 error: {0}")]
    S3(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("storage configuration error: {0}")]
    Config(String),
}

/// Storage result type.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
