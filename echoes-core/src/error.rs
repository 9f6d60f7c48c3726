//! Error types for the echoes core library.

use thiserror::Error;

/// Top-level error type for all relationship-memory operations.
#[derive(Error, Debug)]
pub enum EchoesError {
    /// A record with the given key was not found.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What kind of record was looked up (conversation, npc, ...).
        kind: &'static str,
        /// The key that was used.
        key: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding oracle failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A change notification could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EchoesError {
    /// Shorthand for a [`EchoesError::NotFound`] error.
    #[must_use]
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

impl From<bincode::Error> for EchoesError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, EchoesError>;
