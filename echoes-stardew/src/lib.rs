//! # echoes-stardew: Stardew Valley integration for Echoes
//!
//! Glue between the game-agnostic `echoes-core` engine, the `echoes-llm`
//! oracles and a host mod that sends dialogue turns, gifts and
//! conversation-end signals.
//!
//! ```text
//!  host mod ──TurnRequest──▶ RelationshipService::handle_turn ──▶ TurnContext
//!     │                               │
//!     │                   ConversationManager / PersonalityStore /
//!     │                   EmotionalStateMachine / RelevanceEngine
//!     │
//!     └──end_conversation──▶ AnalysisQueue ──▶ AnalysisOrchestrator ──▶ TextCompletion
//!                              (bounded)        (one JSON reply, validated,
//!                                                then applied section by section)
//! ```
//!
//! ## Modules
//!
//! - `service`: the name-based facade and its builder
//! - `analysis`: the unified post-conversation analysis
//! - `background`: the bounded worker queue in front of the analysis
//! - `gifts`: gift tier resolution and scoring
//! - `mood`: optional per-turn mood updates
//! - `oracle`: LLM client construction and the embedding adapter
//! - `telemetry`: log subscriber setup

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod background;
pub mod error;
pub mod gifts;
pub mod mood;
pub mod oracle;
pub mod service;
pub mod telemetry;

pub use analysis::{AnalysisJob, AnalysisOrchestrator, AnalysisOutcome};
pub use background::AnalysisQueue;
pub use error::{Result, ServiceError};
pub use gifts::{GiftOutcome, GiftRequest, GiftResolver, TierSource};
pub use service::{RelationshipService, ServiceBuilder, TurnContext, TurnRequest};
