//! Error taxonomy for the hash-database engine.
//!
//! Mirrors the API-level error codes in the spec: `NotFound`,
//! `NotInitialized`, `InvalidArgument`, `InvalidHash`, `UnknownType`,
//! `Corrupt`, `IoError`, `MissingFile`, `UnsupportedOperation`,
//! `CreateFailed`, `WriteFailed`. Every public operation returns
//! `HdbResult<T>` rather than raising across module boundaries.

use std::path::PathBuf;

pub type HdbResult<T> = Result<T, HdbError>;

#[derive(Debug, thiserror::Error)]
pub enum HdbError {
    #[error("hash not found")]
    NotFound,

    #[error("database not initialized: {0}")]
    NotInitialized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("unknown database type")]
    UnknownType,

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("missing file: {0}")]
    MissingFile(PathBuf),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("could not create database: {0}")]
    CreateFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl HdbError {
    /// Wrap a raw I/O error with the operation that triggered it, per the
    /// propagation policy in spec.md §7: lower-level failures are wrapped
    /// with a context string identifying the operation, never swallowed.
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        HdbError::Io { context, source }
    }
}
