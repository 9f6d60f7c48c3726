//! Error types for the Stardew integration layer.

use echoes_core::{ConversationId, EchoesError};
use echoes_llm::LlmError;
use thiserror::Error;

/// Errors surfaced by the service facade and the analysis pipeline.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The core engine (store, config, catalog) failed.
    #[error(transparent)]
    Core(#[from] EchoesError),

    /// The language-model oracle failed or returned unusable output.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The analysis reply parsed but carried values outside the vocabulary.
    #[error("Analysis rejected: {0}")]
    InvalidAnalysis(String),

    /// A conversation had no turns to analyse.
    #[error("Conversation {0} has no dialogue")]
    EmptyConversation(ConversationId),

    /// A player or NPC name could not be resolved.
    #[error("Could not resolve {kind} '{name}'")]
    UnknownEntity {
        /// "player" or "npc".
        kind: &'static str,
        /// The name that was looked up.
        name: String,
    },
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ServiceError>;
