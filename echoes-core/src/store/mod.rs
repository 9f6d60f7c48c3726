//! Relational store interface.
//!
//! Every component talks to persistence through [`RelationshipStore`]. The
//! crate ships a SQLite implementation ([`SqliteStore`]); hosts may plug in
//! any other backend that honours the same contracts:
//!
//! - name lookups are exact and unique per entity kind;
//! - `nearest_dialogue` only returns entries that carry an embedding of the
//!   query's dimensionality, ordered by ascending L2 distance;
//! - writes to profile and mood are plain upserts (last write wins).

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{Conversation, ConversationFilter, DialogueEntry};
use crate::emotion::EmotionalState;
use crate::entity::{NpcRecord, PlayerRecord};
use crate::error::Result;
use crate::memory::{EpisodicMemory, LearnedPreference};
use crate::personality::PersonalityProfile;
use crate::types::{ConversationId, Embedding, NpcId, PlayerId, RelationshipKey};

/// Persistence operations needed by the relationship engine.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    // -- entities ---------------------------------------------------------

    /// Player by unique name.
    async fn find_player(&self, name: &str) -> Result<Option<PlayerRecord>>;
    /// Insert a new player.
    async fn insert_player(&self, player: &PlayerRecord) -> Result<()>;
    /// Player by id.
    async fn get_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>>;
    /// NPC by unique name.
    async fn find_npc(&self, name: &str) -> Result<Option<NpcRecord>>;
    /// Insert a new NPC.
    async fn insert_npc(&self, npc: &NpcRecord) -> Result<()>;
    /// Overwrite an NPC's location.
    async fn update_npc_location(&self, id: NpcId, location: &str) -> Result<()>;
    /// NPC by id.
    async fn get_npc(&self, id: NpcId) -> Result<Option<NpcRecord>>;

    // -- conversations ----------------------------------------------------

    /// Most recent open conversation for `key` that started at or after `started_after`.
    async fn latest_open_conversation(
        &self,
        key: RelationshipKey,
        started_after: DateTime<Utc>,
    ) -> Result<Option<Conversation>>;
    /// Insert a new conversation.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;
    /// Conversation by id.
    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>>;
    /// Stamp `end` on an open conversation. Returns `false` if it was not open.
    async fn close_conversation(&self, id: ConversationId, end: DateTime<Utc>) -> Result<bool>;
    /// Closed conversations for `key` matching `filter`, newest first.
    async fn completed_conversations(
        &self,
        key: RelationshipKey,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>>;

    // -- dialogue ---------------------------------------------------------

    /// Append a dialogue turn.
    async fn insert_dialogue(&self, entry: &DialogueEntry) -> Result<()>;
    /// Every turn of a conversation, oldest first.
    async fn dialogue_for_conversation(&self, id: ConversationId) -> Result<Vec<DialogueEntry>>;
    /// Up to `limit` embedded turns for `key` with their L2 distance to `query`, nearest first.
    async fn nearest_dialogue(
        &self,
        key: RelationshipKey,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(DialogueEntry, f32)>>;
    /// The `limit` most recent turns for `key`, newest first.
    async fn recent_dialogue(&self, key: RelationshipKey, limit: usize) -> Result<Vec<DialogueEntry>>;

    // -- per-relationship state -------------------------------------------

    /// Stored emotional state.
    async fn load_emotional_state(&self, key: RelationshipKey) -> Result<Option<EmotionalState>>;
    /// Upsert an emotional state.
    async fn save_emotional_state(&self, state: &EmotionalState) -> Result<()>;
    /// Delete an emotional state. Returns whether a row existed.
    async fn delete_emotional_state(&self, key: RelationshipKey) -> Result<bool>;
    /// Stored personality profile.
    async fn load_personality(&self, key: RelationshipKey) -> Result<Option<PersonalityProfile>>;
    /// Upsert a personality profile.
    async fn save_personality(&self, profile: &PersonalityProfile) -> Result<()>;
    /// Delete a personality profile. Returns whether a row existed.
    async fn delete_personality(&self, key: RelationshipKey) -> Result<bool>;

    // -- consolidated memory ----------------------------------------------

    /// Store an episodic memory.
    async fn insert_episodic_memory(&self, memory: &EpisodicMemory) -> Result<()>;
    /// Most recent episodic memories for `key`, newest first.
    async fn episodic_memories(&self, key: RelationshipKey, limit: usize) -> Result<Vec<EpisodicMemory>>;
    /// Insert or replace a preference, unique per (key, category, item).
    async fn upsert_preference(&self, preference: &LearnedPreference) -> Result<()>;
    /// Every preference for `key`, strongest absolute level first.
    async fn preferences(&self, key: RelationshipKey) -> Result<Vec<LearnedPreference>>;
}
