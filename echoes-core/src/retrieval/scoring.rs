//! Per-component scoring functions for memory relevance.
//!
//! Every component lands on a 0–10 scale; 5.0 is the neutral midpoint used
//! whenever an input is missing.
//!
//!   Similarity(m) = max(0, 10 · (1 − distance))
//!   Recency(m)    = max(0, 10 − days / 7)
//!   Emotional(m)  = 5 + 2.5·[positive word] + 2.5·[negative word], ≤ 10
//!   Importance(m) = 5 + 2·[topic] + 1·[question] + 1.5·[disclosure], ≤ 10

use crate::config::RelevanceWeights;

/// Neutral midpoint for any component without input.
pub const NEUTRAL_SCORE: f32 = 5.0;

const POSITIVE_KEYWORDS: &[&str] = &[
    "love", "amazing", "happy", "great", "thanks", "beautiful", "wonderful", "excited",
];
const NEGATIVE_KEYWORDS: &[&str] = &[
    "hate", "terrible", "sad", "angry", "awful", "cry", "pain", "disappointed",
];
const IMPORTANT_TOPICS: &[&str] = &["gift", "birthday", "festival", "secret", "help"];
const DISCLOSURE_PHRASES: &[&str] = &["i think", "i feel", "i love", "i hate"];

/// Per-component scores for one memory, each in \[0, 10\].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Semantic similarity to the query; `None` on the recency-only path.
    pub similarity: Option<f32>,
    /// Age-based score.
    pub recency: f32,
    /// Keyword-based emotional intensity.
    pub emotional: f32,
    /// Keyword-based importance.
    pub importance: f32,
}

impl ScoreBreakdown {
    /// Blend the components: `sim·(1−rW−eW−iW) + rec·rW + emo·eW + imp·iW`.
    ///
    /// Without a similarity component the residual weight is simply dropped.
    #[must_use]
    pub fn blend(&self, weights: &RelevanceWeights) -> f32 {
        let sim = self
            .similarity
            .map_or(0.0, |s| s * weights.similarity().max(0.0));
        sim + self.recency * weights.recency
            + self.emotional * weights.emotional
            + self.importance * weights.importance
    }
}

/// Similarity from an L2 distance. Missing distance scores neutral.
#[must_use]
pub fn similarity_score(distance: Option<f32>) -> f32 {
    match distance {
        Some(d) if d.is_finite() => (10.0 * (1.0 - d)).max(0.0),
        _ => NEUTRAL_SCORE,
    }
}

/// Recency from age in days. Future timestamps count as "now".
#[must_use]
pub fn recency_score(days_ago: f32) -> f32 {
    if !days_ago.is_finite() {
        return NEUTRAL_SCORE;
    }
    (10.0 - days_ago.max(0.0) / 7.0).max(0.0)
}

/// Emotional intensity of a message. Positive and negative words both add.
#[must_use]
pub fn emotional_score(message: &str) -> f32 {
    if message.trim().is_empty() {
        return NEUTRAL_SCORE;
    }
    let lower = message.to_lowercase();
    let mut score = NEUTRAL_SCORE;
    if POSITIVE_KEYWORDS.iter().any(|w| lower.contains(w)) {
        score += 2.5;
    }
    if NEGATIVE_KEYWORDS.iter().any(|w| lower.contains(w)) {
        score += 2.5;
    }
    score.min(10.0)
}

/// Importance of a message: notable topics, questions and personal disclosure.
#[must_use]
pub fn importance_score(message: &str) -> f32 {
    if message.trim().is_empty() {
        return NEUTRAL_SCORE;
    }
    let lower = message.to_lowercase();
    let mut score = NEUTRAL_SCORE;
    if IMPORTANT_TOPICS.iter().any(|w| lower.contains(w)) {
        score += 2.0;
    }
    if message.contains('?') {
        score += 1.0;
    }
    let says_my = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| t == "my");
    if says_my || DISCLOSURE_PHRASES.iter().any(|p| lower.contains(p)) {
        score += 1.5;
    }
    score.min(10.0)
}
