//! Property-based tests for the relationship engine.
//!
//! Uses `proptest` to check the clamping and monotonicity guarantees that
//! must hold for any LLM output or host input.

use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use echoes_core::config::{RelevanceWeights, RetrievalConfig};
use echoes_core::conversation::{Conversation, DialogueEntry};
use echoes_core::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use echoes_core::emotion::{ACCUMULATOR_LIMIT, EmotionDelta, EmotionalState, EmotionalUpdate, MAX_INTENSITY, Mood};
use echoes_core::personality::{
    Archetype, MAX_TRAIT, PersonalityProfile, PersonalityUpdate, RelationshipLevel, SUMMARY_WORD_LIMIT,
    Trait, relationship_score,
};
use echoes_core::retrieval::scoring::{emotional_score, importance_score, recency_score, similarity_score};
use echoes_core::retrieval::{RelevanceEngine, ScoredMemory};
use echoes_core::scoring::{GiftQuality, GiftTier, conversation_points, gift_points, utterance_points};
use echoes_core::store::{RelationshipStore, SqliteStore};
use echoes_core::types::{ContextSnapshot, DialogueId, Embedding, NpcId, PlayerId, RelationshipKey, Speaker};

fn key() -> RelationshipKey {
    RelationshipKey::new(PlayerId::new(), NpcId::new())
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_delta() -> impl Strategy<Value = EmotionDelta> {
    (
        -50.0..50.0f32,
        -50.0..50.0f32,
        -50.0..50.0f32,
        -50.0..50.0f32,
        -50.0..50.0f32,
    )
        .prop_map(|(joy, sadness, anger, anxiety, excitement)| EmotionDelta {
            joy,
            sadness,
            anger,
            anxiety,
            excitement,
        })
}

fn arb_trait() -> impl Strategy<Value = Trait> {
    prop::sample::select(Trait::ALL.to_vec())
}

fn arb_tier() -> impl Strategy<Value = GiftTier> {
    prop::sample::select(GiftTier::ALL.to_vec())
}

// ---------------------------------------------------------------------------
// Property: accumulators and intensity stay in range
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn accumulators_stay_bounded(deltas in prop::collection::vec(arb_delta(), 1..30)) {
        let mut state = EmotionalState::neutral(key());
        for d in &deltas {
            state.accumulate(d);
        }
        for v in [
            state.recent_joy,
            state.recent_sadness,
            state.recent_anger,
            state.recent_anxiety,
            state.recent_excitement,
        ] {
            prop_assert!((-ACCUMULATOR_LIMIT..=ACCUMULATOR_LIMIT).contains(&v));
        }
    }

    #[test]
    fn intensity_is_clamped(intensity in -100.0..100.0f32) {
        let mut state = EmotionalState::neutral(key());
        state.apply(&EmotionalUpdate {
            mood: Mood::Excited,
            intensity,
            reason: None,
            interaction_summary: None,
            delta: EmotionDelta::default(),
        });
        prop_assert!((0.0..=MAX_INTENSITY).contains(&state.mood_intensity));
    }
}

// ---------------------------------------------------------------------------
// Property: personality traits stay in [0, 10]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn traits_are_clamped(t in arb_trait(), value in -1000.0..1000.0f32) {
        let mut profile = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        profile.apply(&PersonalityUpdate::default().with_trait(t, value));
        prop_assert!((0.0..=MAX_TRAIT).contains(&profile.get(t)));
    }

    #[test]
    fn summary_never_exceeds_word_limit(words in 0..200usize) {
        let summary = vec!["word"; words].join(" ");
        let mut profile = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        profile.apply(&PersonalityUpdate::default().with_summary(summary));
        prop_assert!(profile.summary.split_whitespace().count() <= SUMMARY_WORD_LIMIT);
    }

    #[test]
    fn relationship_score_is_in_range(values in prop::collection::vec(0.0..=10.0f32, 11)) {
        let mut profile = PersonalityProfile::from_archetype(key(), &Archetype::generic());
        for (t, v) in Trait::ALL.iter().zip(values) {
            profile.set(*t, v);
        }
        let score = relationship_score(&profile);
        prop_assert!((0.0..=10.0).contains(&score));
    }

    #[test]
    fn relationship_level_is_monotone(a in 0.0..10.0f32, b in 0.0..10.0f32) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(RelationshipLevel::from_score(lo) <= RelationshipLevel::from_score(hi));
    }
}

// ---------------------------------------------------------------------------
// Property: friendship scoring
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn better_quality_never_hurts_a_positive_gift(level in 0u8..4) {
        let worse = GiftQuality::from_level(level);
        let better = GiftQuality::from_level(level + 1);
        for tier in [GiftTier::Loved, GiftTier::Liked, GiftTier::Neutral] {
            prop_assert!(gift_points(tier, better, false, 1.0) >= gift_points(tier, worse, false, 1.0));
        }
    }

    #[test]
    fn birthday_amplifies_in_the_tier_direction(tier in arb_tier(), level in 0u8..4) {
        let quality = GiftQuality::from_level(level);
        let normal = gift_points(tier, quality, false, 1.0);
        let birthday = gift_points(tier, quality, true, 1.0);
        prop_assert!(birthday.abs() >= normal.abs());
        prop_assert_eq!(birthday.signum(), normal.signum());
    }

    #[test]
    fn utterance_points_stay_in_band(text in "[a-z !?']{0,80}") {
        let points = utterance_points(&text, None, 1.0);
        prop_assert!(points == 0 || (5..=40).contains(&points) || (-20..=-2).contains(&points));
    }

    #[test]
    fn conversation_points_are_bounded_by_the_score(score in -1.0..=1.0f32, scale in 0.0..50.0f32) {
        let points = conversation_points(score, scale);
        let bound = scale.round() as i32 + 1;
        prop_assert!(points.abs() <= bound);
    }

    #[test]
    fn conversation_points_round_the_scaled_score(score in -10.0..10.0f32) {
        let expected = (score * 20.0).round() as i32;
        prop_assert_eq!(conversation_points(score, 20.0), expected);
    }
}

// ---------------------------------------------------------------------------
// Property: relevance components stay in [0, 10]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn relevance_components_in_range(
        distance in 0.0..5.0f32,
        days in -10.0..1000.0f32,
        text in "\\PC{0,60}",
    ) {
        for v in [
            similarity_score(Some(distance)),
            recency_score(days),
            emotional_score(&text),
            importance_score(&text),
        ] {
            prop_assert!((0.0..=10.0).contains(&v));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: recall returns at most N, best first
// ---------------------------------------------------------------------------

/// (message, age in days, embedded)
fn arb_history() -> impl Strategy<Value = Vec<(String, i64, bool)>> {
    prop::collection::vec(("[a-z]{1,8}( [a-z]{1,8}){0,6}", 0..60i64, any::<bool>()), 0..25)
}

fn recall(history: &[(String, i64, bool)], query: &str, n: usize) -> Vec<ScoredMemory> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    rt.block_on(async {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let embedder = Arc::new(HashingEmbeddingProvider::new(32));
        let k = key();
        let conversation = Conversation::open(k, ContextSnapshot::default(), Utc::now());
        store.insert_conversation(&conversation).await.expect("conversation");

        for (message, age, embedded) in history {
            let embedding = if *embedded {
                embedder.embed(message).await.expect("embed")
            } else {
                Embedding::empty()
            };
            let entry = DialogueEntry {
                id: DialogueId::new(),
                conversation: conversation.id,
                speaker: Speaker::Player,
                message: message.clone(),
                timestamp: Utc::now() - Duration::days(*age),
                embedding,
            };
            store.insert_dialogue(&entry).await.expect("dialogue");
        }

        let engine = RelevanceEngine::new(store, embedder, RetrievalConfig::default());
        engine
            .search_relevant_memories(k, query, n, RelevanceWeights::default())
            .await
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn recall_returns_at_most_n_in_relevance_order(
        history in arb_history(),
        query in "[a-z]{0,8}( [a-z]{1,8}){0,3}",
        n in 0..10usize,
    ) {
        let results = recall(&history, &query, n);
        prop_assert!(results.len() <= n);
        prop_assert!(results.len() <= history.len());
        prop_assert!(results.windows(2).all(|w| w[0].relevance >= w[1].relevance));
        prop_assert!(results.iter().all(|m| m.relevance >= 0.0 && m.relevance <= 10.0 + 1e-4));
    }
}
