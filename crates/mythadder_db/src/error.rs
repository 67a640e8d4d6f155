//! Error types for the database layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted staging schema was written by a newer mythadder
    #[error("Staging schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    /// The schema marker in the settings store is not a number
    #[error("Invalid staging schema version marker: {0:?}")]
    InvalidSchemaVersion(String),

    /// URL scheme not recognised, or its driver was not compiled in
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True for errors that must abort the process before anything is mutated.
    pub fn is_schema_conflict(&self) -> bool {
        matches!(
            self,
            Self::SchemaTooNew { .. } | Self::InvalidSchemaVersion(_)
        )
    }
}
