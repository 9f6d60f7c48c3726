//! Consolidated memories: what an NPC took away from finished conversations.
//!
//! Two kinds of records come out of the post-conversation analysis:
//! [`EpisodicMemory`] ("what happened") and [`LearnedPreference`] ("what I
//! learned they like"). Both are keyed per relationship.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::{EmbeddingProvider, embed_or_empty};
use crate::error::Result;
use crate::store::RelationshipStore;
use crate::types::{ConversationId, Embedding, MemoryId, RelationshipKey};

/// Range of `emotional_impact` on an episodic memory.
pub const IMPACT_RANGE: (f32, f32) = (-10.0, 10.0);
/// Range of `importance` on an episodic memory.
pub const IMPORTANCE_RANGE: (f32, f32) = (1.0, 10.0);
/// Range of `preference_level` on a learned preference.
pub const PREFERENCE_RANGE: (f32, f32) = (-10.0, 10.0);

fn clamp_to(v: f32, (lo, hi): (f32, f32)) -> f32 {
    if v.is_finite() { v.clamp(lo, hi) } else { (lo + hi) / 2.0 }
}

/// A single remembered moment from the NPC's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemory {
    /// Memory id.
    pub id: MemoryId,
    /// Relationship the memory belongs to.
    pub key: RelationshipKey,
    /// Conversation that produced it.
    pub conversation: ConversationId,
    /// Short title.
    pub title: String,
    /// What happened.
    pub description: String,
    /// How the moment felt, -10..10.
    pub emotional_impact: f32,
    /// How memorable it is, 1..10.
    pub importance: f32,
    /// Free-form category, e.g. `GIFT_RECEIVED`.
    pub memory_type: String,
    /// Vector of `title + description`; empty when embedding failed.
    pub embedding: Embedding,
    /// When the memory was recorded.
    pub created_at: DateTime<Utc>,
}

/// An episodic memory before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDraft {
    /// Short title.
    pub title: String,
    /// What happened.
    pub description: String,
    /// How the moment felt, -10..10 (clamped).
    pub emotional_impact: f32,
    /// How memorable it is, 1..10 (clamped).
    pub importance: f32,
    /// Free-form category.
    pub memory_type: String,
}

/// Something the NPC learned the player likes or dislikes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPreference {
    /// Relationship the preference belongs to.
    pub key: RelationshipKey,
    /// Category, e.g. `FOODS`.
    pub category: String,
    /// The specific thing.
    pub item: String,
    /// -10 (hates) .. 10 (loves).
    pub preference_level: f32,
    /// What revealed it.
    pub evidence: String,
    /// Last time the preference was written.
    pub updated_at: DateTime<Utc>,
}

/// A learned preference before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceDraft {
    /// Category.
    pub category: String,
    /// The specific thing.
    pub item: String,
    /// -10..10 (clamped).
    pub preference_level: f32,
    /// What revealed it.
    pub evidence: String,
}

/// Persists consolidated memories and preferences.
pub struct MemoryRecorder {
    store: Arc<dyn RelationshipStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryRecorder {
    /// Create a recorder.
    #[must_use]
    pub fn new(store: Arc<dyn RelationshipStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Embed and store each draft. Every draft fails independently.
    ///
    /// Returns the number of memories written.
    pub async fn record_episodes(
        &self,
        key: RelationshipKey,
        conversation: ConversationId,
        drafts: &[EpisodeDraft],
    ) -> usize {
        let mut written = 0;
        for draft in drafts {
            let text = format!("{}: {}", draft.title, draft.description);
            let memory = EpisodicMemory {
                id: MemoryId::new(),
                key,
                conversation,
                title: draft.title.clone(),
                description: draft.description.clone(),
                emotional_impact: clamp_to(draft.emotional_impact, IMPACT_RANGE),
                importance: clamp_to(draft.importance, IMPORTANCE_RANGE),
                memory_type: draft.memory_type.clone(),
                embedding: embed_or_empty(self.embedder.as_ref(), &text).await,
                created_at: Utc::now(),
            };
            match self.store.insert_episodic_memory(&memory).await {
                Ok(()) => {
                    debug!(%key, title = %memory.title, "Stored episodic memory");
                    written += 1;
                }
                Err(e) => warn!(%key, title = %memory.title, error = %e, "Failed to store episodic memory"),
            }
        }
        written
    }

    /// Upsert each preference. Every draft fails independently.
    ///
    /// Returns the number of preferences written.
    pub async fn record_preferences(&self, key: RelationshipKey, drafts: &[PreferenceDraft]) -> usize {
        let mut written = 0;
        for draft in drafts {
            let pref = LearnedPreference {
                key,
                category: draft.category.trim().to_uppercase(),
                item: draft.item.trim().to_string(),
                preference_level: clamp_to(draft.preference_level, PREFERENCE_RANGE),
                evidence: draft.evidence.clone(),
                updated_at: Utc::now(),
            };
            if pref.item.is_empty() {
                warn!(%key, "Skipping preference without an item");
                continue;
            }
            match self.store.upsert_preference(&pref).await {
                Ok(()) => written += 1,
                Err(e) => warn!(%key, item = %pref.item, error = %e, "Failed to store preference"),
            }
        }
        written
    }

    /// Most recent episodic memories for `key`, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn episodic_memories(&self, key: RelationshipKey, limit: usize) -> Result<Vec<EpisodicMemory>> {
        self.store.episodic_memories(key, limit).await
    }

    /// Every learned preference for `key`, strongest first.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn preferences(&self, key: RelationshipKey) -> Result<Vec<LearnedPreference>> {
        self.store.preferences(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashingEmbeddingProvider, ZeroEmbeddingProvider};
    use crate::store::SqliteStore;
    use crate::types::{NpcId, PlayerId};

    fn key() -> RelationshipKey {
        RelationshipKey::new(PlayerId::new(), NpcId::new())
    }

    fn draft(title: &str, importance: f32) -> EpisodeDraft {
        EpisodeDraft {
            title: title.into(),
            description: "We talked about amethysts by the river.".into(),
            emotional_impact: 25.0,
            importance,
            memory_type: "SHARED_ACTIVITY".into(),
        }
    }

    #[tokio::test]
    async fn episodes_are_clamped_embedded_and_listed() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let recorder = MemoryRecorder::new(store, Arc::new(HashingEmbeddingProvider::new(16)));
        let k = key();
        let n = recorder
            .record_episodes(k, ConversationId::new(), &[draft("Gems", 0.0), draft("River", 8.0)])
            .await;
        assert_eq!(n, 2);

        let memories = recorder.episodic_memories(k, 10).await.expect("list");
        assert_eq!(memories.len(), 2);
        for m in &memories {
            assert!((m.emotional_impact - 10.0).abs() < f32::EPSILON);
            assert!(m.importance >= 1.0);
            assert_eq!(m.embedding.dimensions(), 16);
        }
    }

    #[tokio::test]
    async fn preferences_upsert_on_category_and_item() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let recorder = MemoryRecorder::new(store, Arc::new(ZeroEmbeddingProvider::new(4)));
        let k = key();
        let pref = |level: f32, evidence: &str| PreferenceDraft {
            category: "gifts".into(),
            item: "Amethyst".into(),
            preference_level: level,
            evidence: evidence.into(),
        };
        assert_eq!(recorder.record_preferences(k, &[pref(5.0, "said so")]).await, 1);
        assert_eq!(recorder.record_preferences(k, &[pref(9.0, "said it twice")]).await, 1);

        let prefs = recorder.preferences(k).await.expect("list");
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].category, "GIFTS");
        assert!((prefs[0].preference_level - 9.0).abs() < f32::EPSILON);
        assert_eq!(prefs[0].evidence, "said it twice");
    }
}
