//! Memory Relevance Engine: surfaces past dialogue worth recalling.
//!
//! A search embeds the query text, pulls a candidate pool of stored turns
//! ordered by vector distance, scores each candidate on four components
//! (similarity, recency, emotional impact, importance) and returns the best
//! `max_results` by blended score.
//!
//! When the query cannot be embedded, or the vector search itself fails, the
//! engine falls back to the most recent turns for the relationship, each with
//! a fixed relevance. A search never returns an error; if the fallback fails
//! too the result is an empty list.

pub mod scoring;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{RelevanceWeights, RetrievalConfig};
use crate::conversation::DialogueEntry;
use crate::embedding::{EmbeddingProvider, embed_or_empty};
use crate::store::RelationshipStore;
use crate::types::{RelevanceScore, RelationshipKey};

pub use scoring::ScoreBreakdown;

/// A recalled dialogue turn with its relevance.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    /// The recalled turn.
    pub entry: DialogueEntry,
    /// Blended relevance, 0–10.
    pub relevance: f32,
    /// Per-component scores; `None` on the recency-only path.
    #[serde(skip)]
    pub breakdown: Option<ScoreBreakdown>,
}

/// Searches a relationship's dialogue history.
pub struct RelevanceEngine {
    store: Arc<dyn RelationshipStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RelevanceEngine {
    /// Create an engine over the store and embedding oracle.
    #[must_use]
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Search with the configured result count and weights.
    pub async fn search(&self, key: RelationshipKey, query: &str) -> Vec<ScoredMemory> {
        self.search_relevant_memories(key, query, self.config.max_results, self.config.weights)
            .await
    }

    /// Search with explicit result count and weights.
    pub async fn search_relevant_memories(
        &self,
        key: RelationshipKey,
        query: &str,
        max_results: usize,
        weights: RelevanceWeights,
    ) -> Vec<ScoredMemory> {
        self.search_at(key, query, max_results, weights, Utc::now())
            .await
    }

    /// [`Self::search_relevant_memories`] with an explicit clock.
    pub async fn search_at(
        &self,
        key: RelationshipKey,
        query: &str,
        max_results: usize,
        weights: RelevanceWeights,
        now: DateTime<Utc>,
    ) -> Vec<ScoredMemory> {
        if max_results == 0 {
            return Vec::new();
        }

        let query_embedding = embed_or_empty(self.embedder.as_ref(), query).await;
        if query_embedding.is_empty() {
            return self.recent_fallback(key, max_results).await;
        }

        let pool = self.config.candidate_pool(max_results);
        let candidates = match self.store.nearest_dialogue(key, &query_embedding, pool).await {
            Ok(c) => c,
            Err(e) => {
                warn!(%key, error = %e, "Vector search failed, falling back to recent dialogue");
                return self.recent_fallback(key, max_results).await;
            }
        };

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|(entry, distance)| {
                #[allow(clippy::cast_precision_loss)]
                let days_ago = (now - entry.timestamp).num_seconds() as f32 / 86_400.0;
                let breakdown = ScoreBreakdown {
                    similarity: Some(scoring::similarity_score(Some(distance))),
                    recency: scoring::recency_score(days_ago),
                    emotional: scoring::emotional_score(&entry.message),
                    importance: scoring::importance_score(&entry.message),
                };
                let relevance = breakdown.blend(&weights);
                debug!(
                    dialogue = %entry.id,
                    distance,
                    relevance,
                    "Scored memory candidate"
                );
                ScoredMemory {
                    entry,
                    relevance,
                    breakdown: Some(breakdown),
                }
            })
            .collect();

        scored.sort_by_key(|m| std::cmp::Reverse(RelevanceScore::new(m.relevance)));
        scored.truncate(max_results);
        scored
    }

    async fn recent_fallback(&self, key: RelationshipKey, max_results: usize) -> Vec<ScoredMemory> {
        debug!(%key, "Recency-only recall");
        match self.store.recent_dialogue(key, max_results).await {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| ScoredMemory {
                    entry,
                    relevance: self.config.fallback_relevance,
                    breakdown: None,
                })
                .collect(),
            Err(e) => {
                warn!(%key, error = %e, "Recent-dialogue fallback failed");
                Vec::new()
            }
        }
    }
}

/// Render recalled memories as prompt lines.
#[must_use]
pub fn format_memories(memories: &[ScoredMemory], npc_name: &str) -> String {
    memories
        .iter()
        .map(|m| {
            let who = if m.entry.speaker.is_player() { "Player" } else { npc_name };
            format!(
                "- [{}] {who}: {}",
                m.entry.timestamp.format("%Y-%m-%d"),
                m.entry.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, DialogueEntry};
    use crate::embedding::{HashingEmbeddingProvider, ZeroEmbeddingProvider};
    use crate::store::SqliteStore;
    use crate::types::{ContextSnapshot, DialogueId, NpcId, PlayerId, Speaker};
    use chrono::Duration;

    struct Fixture {
        store: Arc<SqliteStore>,
        embedder: Arc<HashingEmbeddingProvider>,
        key: RelationshipKey,
        conversation: Conversation,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let key = RelationshipKey::new(PlayerId::new(), NpcId::new());
        let conversation = Conversation::open(key, ContextSnapshot::default(), Utc::now());
        store.insert_conversation(&conversation).await.expect("insert");
        Fixture {
            store,
            embedder: Arc::new(HashingEmbeddingProvider::new(64)),
            key,
            conversation,
        }
    }

    impl Fixture {
        async fn say(&self, message: &str, age_days: i64, embed: bool) {
            let embedding = if embed {
                self.embedder.embed(message).await.expect("embed")
            } else {
                crate::types::Embedding::empty()
            };
            let entry = DialogueEntry {
                id: DialogueId::new(),
                conversation: self.conversation.id,
                speaker: Speaker::Player,
                message: message.to_string(),
                timestamp: Utc::now() - Duration::days(age_days),
                embedding,
            };
            self.store.insert_dialogue(&entry).await.expect("insert");
        }

        fn engine(&self, embedder: Arc<dyn EmbeddingProvider>) -> RelevanceEngine {
            RelevanceEngine::new(self.store.clone(), embedder, RetrievalConfig::default())
        }
    }

    #[tokio::test]
    async fn returns_at_most_n_in_descending_order() {
        let f = fixture().await;
        for (i, msg) in [
            "I love amethyst gems",
            "gems are great",
            "the weather is grey",
            "my birthday is soon?",
            "collecting gems is fun",
        ]
        .iter()
        .enumerate()
        {
            f.say(msg, i64::try_from(i).expect("small"), true).await;
        }
        let engine = f.engine(f.embedder.clone());
        let results = engine.search(f.key, "I love collecting gems").await;
        assert!(results.len() <= 3);
        assert!(!results.is_empty());
        assert!(results.windows(2).all(|w| w[0].relevance >= w[1].relevance));
    }

    #[tokio::test]
    async fn unembedded_turns_are_not_candidates() {
        let f = fixture().await;
        f.say("I love collecting gems", 0, false).await;
        let engine = f.engine(f.embedder.clone());
        assert!(engine.search(f.key, "gems").await.is_empty());
    }

    #[tokio::test]
    async fn empty_query_embedding_falls_back_to_recent() {
        let f = fixture().await;
        f.say("oldest", 3, false).await;
        f.say("middle", 2, false).await;
        f.say("newest", 1, true).await;
        f.say("ancient", 30, false).await;

        let engine = f.engine(f.embedder.clone());
        let results = engine.search_relevant_memories(f.key, "   ", 2, RelevanceWeights::default()).await;
        let messages: Vec<_> = results.iter().map(|m| m.entry.message.as_str()).collect();
        assert_eq!(messages, ["newest", "middle"]);
        assert!(results.iter().all(|m| (m.relevance - 5.0).abs() < f32::EPSILON));
    }

    #[tokio::test]
    async fn zero_results_and_empty_history() {
        let f = fixture().await;
        let engine = f.engine(Arc::new(ZeroEmbeddingProvider::new(64)));
        assert!(engine.search(f.key, "hello").await.is_empty());
        f.say("hello there", 0, true).await;
        assert!(engine
            .search_relevant_memories(f.key, "hello", 0, RelevanceWeights::default())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn failed_vector_search_falls_back_to_recent() {
        let f = fixture().await;
        f.say("unreadable old line", 10, true).await;
        f.say("middle", 1, true).await;
        f.say("newest", 0, true).await;
        f.store.corrupt_embedding_for_tests("unreadable old line");

        let engine = f.engine(f.embedder.clone());
        let results = engine.search_relevant_memories(f.key, "middle", 2, RelevanceWeights::default()).await;
        let messages: Vec<_> = results.iter().map(|m| m.entry.message.as_str()).collect();
        assert_eq!(messages, ["newest", "middle"]);
        assert!(results.iter().all(|m| m.breakdown.is_none()));
    }

    #[tokio::test]
    async fn store_failure_yields_empty_list() {
        let f = fixture().await;
        f.say("hello", 0, true).await;
        f.store.break_for_tests("dialogue_entries");
        let engine = f.engine(f.embedder.clone());
        // the vector search and the recency fallback both fail
        assert!(engine.search(f.key, "hello").await.is_empty());
        assert!(engine.search(f.key, "").await.is_empty());
    }
}
