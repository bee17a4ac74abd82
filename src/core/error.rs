/// liteorm Error Module
///
/// This module defines the error taxonomy shared by every layer of the mapper:
/// engine failures, mapping inconsistencies, untranslatable queries and
/// connection lifecycle violations. None of these are recovered locally.
use thiserror::Error;

/// Comprehensive error type for liteorm.
///
/// Every public operation either returns its declared result or fails with
/// one of these variants:
/// - Engine failures (rusqlite or any other provider)
/// - Mapping failures detected before or while translating
/// - Query shapes that have no translation rule
/// - Use of a closed or forgotten pooled connection
/// - Worker pool and configuration failures
#[derive(Error, Debug)]
pub enum OrmError {
    /// Engine errors from the bundled rusqlite provider
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Engine errors reported by a non-rusqlite provider, carrying the engine message
    #[error("Engine error: {0}")]
    Engine(String),

    /// Entity description inconsistencies (unknown column, null into non-nullable, ...)
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Query expression shapes that have no translation rule
    #[error("Unsupported query: {0}")]
    Unsupported(String),

    /// A keyed lookup or single-row operator found no row
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operations attempted on a closed or forgotten pooled connection
    #[error("Connection closed: {0}")]
    Closed(String),

    /// Background worker failures (pool shut down, body panicked)
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    /// Returns `true` for errors raised by the engine itself.
    pub fn is_engine(&self) -> bool {
        matches!(self, OrmError::Database(_) | OrmError::Engine(_))
    }
}

/// Type alias for Result to use OrmError as the error type.
pub type Result<T> = std::result::Result<T, OrmError>;
