//! # echoes-llm: language-model oracles for Echoes
//!
//! Unified access to the two oracles the relationship engine consults:
//!   - **Text completion**: Ollama `/api/generate` or an OpenAI-compatible
//!     `/v1/chat/completions`, behind the [`TextCompletion`] trait
//!   - **Embeddings**: `/api/embeddings` or `/v1/embeddings`
//!
//! Every call is best-effort. Callers treat an error as "fall back to local
//! rules"; nothing in this crate panics on bad model output.
//!
//! ```text
//! prompt::PromptEngine ──render──▶ LlmRequest ──▶ TextCompletion::complete
//!                                                        │
//!                           parse::parse_structured ◀────┘ (JSON, fenced or not)
//!                           parse::extract_prefixed       (KEY: value lines)
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod scripted;
pub mod types;

pub use client::{LlmClient, LlmProvider, ModelSet, TextCompletion};
pub use error::LlmError;
pub use scripted::ScriptedCompletion;
pub use types::{LlmRequest, LlmResponse, ModelRole, UnifiedAnalysis};
