//! Error types for mythadder

use std::io;
use thiserror::Error;

/// mythadder error type
#[derive(Error, Debug)]
pub enum MythAdderError {
    #[error("Database error: {0}")]
    Db(#[from] mythadder_db::DbError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for mythadder operations
pub type Result<T> = std::result::Result<T, MythAdderError>;
