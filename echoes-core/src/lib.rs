//! # Echoes Core Library
//!
//! Relationship memory for NPC dialogue. Every (player, NPC) pair carries its
//! own history and state:
//!
//! - **Conversations**: sessions of dialogue turns, each turn embedded for
//!   later recall ([`conversation`])
//! - **Mood**: a discrete mood plus slow-moving emotion accumulators
//!   ([`emotion`])
//! - **Perception**: an 11-trait personality profile the NPC holds about the
//!   player, seeded from a per-NPC archetype ([`personality`])
//! - **Recall**: ranked retrieval of past dialogue by similarity, recency,
//!   emotional weight and importance ([`retrieval`])
//! - **Consolidation**: episodic memories and learned preferences distilled
//!   from finished conversations ([`memory`])
//! - **Friendship**: deterministic gift and utterance scoring against the
//!   built-in NPC catalog ([`scoring`], [`catalog`])
//!
//! Everything persists through the [`store::RelationshipStore`] trait;
//! [`store::SqliteStore`] is the bundled backend. Nothing here talks to a
//! language model directly: embeddings come in through
//! [`embedding::EmbeddingProvider`] and analysis results arrive as typed
//! updates.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod emotion;
pub mod entity;
pub mod error;
pub mod events;
pub mod memory;
pub mod personality;
pub mod retrieval;
pub mod scoring;
pub mod store;
pub mod types;

pub use catalog::NpcCatalog;
pub use config::EchoesConfig;
pub use error::{EchoesError, Result};
pub use store::{RelationshipStore, SqliteStore};
pub use types::*;
