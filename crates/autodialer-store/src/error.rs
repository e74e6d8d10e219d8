use thiserror::Error;

/// Errors raised while writing or reading the mirror.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the directory that holds the mirror file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No row with the requested id.
    #[error("Record not found")]
    NotFound,

    #[error("Migration error: {0}")]
    Migration(String),

    /// A `numbers` / `original_numbers` column could not be encoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
