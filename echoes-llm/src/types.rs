//! Request/response types and the structured shapes the models are asked to emit.

use serde::{Deserialize, Deserializer, Serialize};

/// Which configured model serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Short per-turn calls: mood lines, gift classification.
    Fast,
    /// The post-conversation unified analysis.
    Analysis,
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt; may be empty.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Which model to route to.
    pub role: ModelRole,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend for JSON-only output when it supports it.
    pub json_mode: bool,
    /// Request timeout in milliseconds; `None` uses the client default.
    pub timeout_ms: Option<u64>,
}

impl LlmRequest {
    /// A short request for the fast model.
    #[must_use]
    pub fn fast(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Fast,
            max_tokens: 150,
            temperature: 0.3,
            json_mode: false,
            timeout_ms: None,
        }
    }

    /// A JSON request for the analysis model.
    #[must_use]
    pub fn analysis(user: impl Into<String>) -> Self {
        Self {
            system: String::new(),
            user: user.into(),
            role: ModelRole::Analysis,
            max_tokens: 1200,
            temperature: 0.4,
            json_mode: true,
            timeout_ms: None,
        }
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated, when reported.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

// ---------------------------------------------------------------------------
// Unified analysis output
// ---------------------------------------------------------------------------

/// The single JSON object returned by the post-conversation analysis.
///
/// Sections the model omits deserialize as `None` and are skipped; anything
/// present must have the right shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnalysis {
    /// Sentiment of the player's last message.
    #[serde(default)]
    pub final_player_sentiment: Option<FinalSentiment>,
    /// New memories and preferences.
    #[serde(default)]
    pub memory_consolidation: Option<MemoryConsolidation>,
    /// New mood.
    #[serde(default)]
    pub emotional_state_update: Option<EmotionalStateChange>,
    /// New perception of the player.
    #[serde(default)]
    pub personality_profile_update: Option<PersonalityChange>,
}

/// `final_player_sentiment` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalSentiment {
    /// -1.0 (very negative) to 1.0 (very positive).
    #[serde(default, deserialize_with = "lenient_f32")]
    pub score: f32,
}

/// `memory_consolidation` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryConsolidation {
    /// Moments worth remembering.
    #[serde(default)]
    pub episodic_memories: Vec<EpisodicMemoryOut>,
    /// Facts learned about the player.
    #[serde(default)]
    pub learned_preferences: Vec<LearnedPreferenceOut>,
}

/// One episodic memory as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemoryOut {
    /// Brief title.
    pub title: String,
    /// What happened.
    #[serde(default)]
    pub description: String,
    /// -10..10.
    #[serde(default, deserialize_with = "lenient_f32")]
    pub emotional_impact: f32,
    /// 1..10.
    #[serde(default = "default_importance", deserialize_with = "lenient_f32")]
    pub importance: f32,
    /// Free-form category.
    #[serde(default = "default_memory_type")]
    pub memory_type: String,
}

/// One learned preference as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPreferenceOut {
    /// Category such as `FOODS`.
    #[serde(default = "default_category")]
    pub category: String,
    /// The specific thing.
    pub item: String,
    /// -10..10.
    #[serde(deserialize_with = "lenient_f32")]
    pub preference_level: f32,
    /// What revealed it.
    #[serde(default)]
    pub evidence: String,
}

/// `emotional_state_update` section.
///
/// `new_mood` stays a raw label here; the caller validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalStateChange {
    /// Mood label, e.g. `HAPPY`.
    pub new_mood: String,
    /// 0..10.
    #[serde(default = "default_intensity", deserialize_with = "lenient_f32")]
    pub new_mood_intensity: f32,
    /// Why the mood changed.
    #[serde(default)]
    pub mood_reason: Option<String>,
    /// One-sentence effect of the interaction.
    #[serde(default)]
    pub interaction_summary: Option<String>,
    /// Accumulator deltas, each -3..3.
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub joy_delta: Option<f32>,
    /// See `joy_delta`.
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub sadness_delta: Option<f32>,
    /// See `joy_delta`.
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub anger_delta: Option<f32>,
    /// See `joy_delta`.
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub anxiety_delta: Option<f32>,
    /// See `joy_delta`.
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub excitement_delta: Option<f32>,
}

/// `personality_profile_update` section. Missing fields keep their old value.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityChange {
    #[serde(default)]
    pub new_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_friendliness: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_extroversion: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_sincerity: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_curiosity: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_trust: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_respect: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_affection: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_annoyance: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_admiration: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_romantic_interest: Option<f32>,
    #[serde(default, deserialize_with = "lenient_opt_f32")]
    pub new_humor_compatibility: Option<f32>,
}

impl PersonalityChange {
    /// `(snake_case trait name, value)` for every trait the model provided.
    #[must_use]
    pub fn trait_values(&self) -> Vec<(&'static str, f32)> {
        [
            ("friendliness", self.new_friendliness),
            ("extroversion", self.new_extroversion),
            ("sincerity", self.new_sincerity),
            ("curiosity", self.new_curiosity),
            ("trust", self.new_trust),
            ("respect", self.new_respect),
            ("affection", self.new_affection),
            ("annoyance", self.new_annoyance),
            ("admiration", self.new_admiration),
            ("romantic_interest", self.new_romantic_interest),
            ("humor_compatibility", self.new_humor_compatibility),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
        .collect()
    }
}

fn default_importance() -> f32 { 5.0 }
fn default_intensity() -> f32 { 5.0 }
fn default_memory_type() -> String { "GENERAL".to_string() }
fn default_category() -> String { "GENERAL".to_string() }

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

/// Models regularly quote numbers ("7.5"); accept both forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    #[allow(clippy::cast_possible_truncation)]
    fn into_f32<E: serde::de::Error>(self) -> Result<f32, E> {
        let v = match self {
            Self::Number(n) => n,
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("expected a number, got '{s}'")))?,
        };
        if v.is_finite() {
            Ok(v as f32)
        } else {
            Err(E::custom("number is not finite"))
        }
    }
}

fn lenient_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_f32()
}

fn lenient_opt_f32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) => v.into_f32().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_numbers_are_accepted() {
        let s: FinalSentiment = serde_json::from_str(r#"{"score": "0.75"}"#).expect("parse");
        assert!((s.score - 0.75).abs() < 1e-6);
        let s: FinalSentiment = serde_json::from_str(r#"{"score": -1}"#).expect("parse");
        assert!((s.score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn non_numeric_text_is_rejected() {
        assert!(serde_json::from_str::<FinalSentiment>(r#"{"score": "very positive"}"#).is_err());
    }

    #[test]
    fn missing_sections_are_none() {
        let a: UnifiedAnalysis = serde_json::from_str(
            r#"{"emotional_state_update": {"new_mood": "HAPPY", "new_mood_intensity": 7}}"#,
        )
        .expect("parse");
        assert!(a.final_player_sentiment.is_none());
        assert!(a.personality_profile_update.is_none());
        let e = a.emotional_state_update.expect("present");
        assert_eq!(e.new_mood, "HAPPY");
        assert!(e.joy_delta.is_none());
    }

    #[test]
    fn trait_values_skip_missing() {
        let p: PersonalityChange =
            serde_json::from_str(r#"{"new_trust": 7.5, "new_annoyance": null, "new_summary": "ok"}"#)
                .expect("parse");
        assert_eq!(p.trait_values(), vec![("trust", 7.5)]);
    }
}
