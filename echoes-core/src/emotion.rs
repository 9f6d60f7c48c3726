//! Emotional State Machine: how an NPC currently feels about one player.
//!
//! State is keyed per (NPC, player). It holds a named [`Mood`] with an
//! intensity in \[0, 10\] and five signed accumulators in \[-5, 5\]. Updates come
//! from the post-conversation analysis or from the per-turn mood call; when the
//! LLM is unavailable the [`Tone`] fallback table keeps the state moving.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{EventSink, RelationshipEvent, notify};
use crate::store::RelationshipStore;
use crate::types::RelationshipKey;

/// Bounds of every emotion accumulator.
pub const ACCUMULATOR_LIMIT: f32 = 5.0;
/// Bounds of a single accumulator delta.
pub const MAX_DELTA: f32 = 3.0;
/// Upper bound of the mood intensity scale.
pub const MAX_INTENSITY: f32 = 10.0;

// ---------------------------------------------------------------------------
// Mood
// ---------------------------------------------------------------------------

/// The eleven named moods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    /// Joyful and optimistic.
    VeryHappy,
    /// Pleasant, positive.
    Happy,
    /// Peaceful and satisfied.
    Content,
    /// Balanced.
    Neutral,
    /// Anxious or concerned.
    Worried,
    /// Down or melancholy.
    Sad,
    /// Irritated or frustrated.
    Angry,
    /// Energetic and enthusiastic.
    Excited,
    /// Affectionate.
    Romantic,
    /// Wistful, reflective.
    Nostalgic,
    /// Overwhelmed.
    Stressed,
}

impl Mood {
    /// Every mood, in declaration order.
    pub const ALL: [Mood; 11] = [
        Self::VeryHappy,
        Self::Happy,
        Self::Content,
        Self::Neutral,
        Self::Worried,
        Self::Sad,
        Self::Angry,
        Self::Excited,
        Self::Romantic,
        Self::Nostalgic,
        Self::Stressed,
    ];

    /// Canonical upper-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryHappy => "VERY_HAPPY",
            Self::Happy => "HAPPY",
            Self::Content => "CONTENT",
            Self::Neutral => "NEUTRAL",
            Self::Worried => "WORRIED",
            Self::Sad => "SAD",
            Self::Angry => "ANGRY",
            Self::Excited => "EXCITED",
            Self::Romantic => "ROMANTIC",
            Self::Nostalgic => "NOSTALGIC",
            Self::Stressed => "STRESSED",
        }
    }

    /// Comma-separated list of every label, for prompts.
    #[must_use]
    pub fn label_list() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn description(self, intensity: f32) -> String {
        match self {
            Self::VeryHappy => format!("You are in an excellent mood (intensity {intensity:.1}/10). You feel joyful, optimistic, and want to share your happiness."),
            Self::Happy => format!("You are feeling good (intensity {intensity:.1}/10). You're in a pleasant, positive mood."),
            Self::Content => format!("You are feeling peaceful and satisfied (intensity {intensity:.1}/10). Life feels stable and good."),
            Self::Neutral => format!("You are in a normal, balanced mood (intensity {intensity:.1}/10). Nothing particular is affecting your emotions."),
            Self::Worried => format!("You are feeling anxious or concerned about something (intensity {intensity:.1}/10). Your mind is preoccupied."),
            Self::Sad => format!("You are feeling down or melancholy (intensity {intensity:.1}/10). Things feel a bit heavy emotionally."),
            Self::Angry => format!("You are feeling irritated or frustrated (intensity {intensity:.1}/10). Your patience is shorter than usual."),
            Self::Excited => format!("You are feeling energetic and enthusiastic (intensity {intensity:.1}/10). You're eager and animated."),
            Self::Romantic => format!("You are feeling affectionate and romantic (intensity {intensity:.1}/10). Your heart feels warm."),
            Self::Nostalgic => format!("You are feeling wistful and reflective (intensity {intensity:.1}/10). Old memories are on your mind."),
            Self::Stressed => format!("You are feeling overwhelmed or under pressure (intensity {intensity:.1}/10). Everything feels like a lot right now."),
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    /// Case-insensitive; accepts spaces or dashes in place of underscores.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| format!("unknown mood: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// State & deltas
// ---------------------------------------------------------------------------

/// How an NPC currently feels about one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    /// The relationship this state belongs to.
    pub key: RelationshipKey,
    /// Current named mood.
    pub current_mood: Mood,
    /// Strength of the mood, 0–10.
    pub mood_intensity: f32,
    /// Rolling joy accumulator, -5–5.
    pub recent_joy: f32,
    /// Rolling sadness accumulator, -5–5.
    pub recent_sadness: f32,
    /// Rolling anger accumulator, -5–5.
    pub recent_anger: f32,
    /// Rolling anxiety accumulator, -5–5.
    pub recent_anxiety: f32,
    /// Rolling excitement accumulator, -5–5.
    pub recent_excitement: f32,
    /// One-line summary of the last interaction's effect.
    pub last_interaction_effect: String,
    /// Anything outside the relationship weighing on the NPC.
    pub external_factors: String,
    /// When this state was last written.
    pub last_updated: DateTime<Utc>,
}

impl EmotionalState {
    /// Neutral defaults for a relationship seen for the first time.
    #[must_use]
    pub fn neutral(key: RelationshipKey) -> Self {
        Self {
            key,
            current_mood: Mood::Neutral,
            mood_intensity: 5.0,
            recent_joy: 0.0,
            recent_sadness: 0.0,
            recent_anger: 0.0,
            recent_anxiety: 0.0,
            recent_excitement: 0.0,
            last_interaction_effect: String::new(),
            external_factors: String::new(),
            last_updated: Utc::now(),
        }
    }

    /// Add a delta to every accumulator and re-clamp.
    pub fn accumulate(&mut self, delta: &EmotionDelta) {
        let d = delta.bounded();
        self.recent_joy = clamp_accumulator(self.recent_joy + d.joy);
        self.recent_sadness = clamp_accumulator(self.recent_sadness + d.sadness);
        self.recent_anger = clamp_accumulator(self.recent_anger + d.anger);
        self.recent_anxiety = clamp_accumulator(self.recent_anxiety + d.anxiety);
        self.recent_excitement = clamp_accumulator(self.recent_excitement + d.excitement);
    }

    /// Apply a full update: mood, intensity, optional summary, accumulator deltas.
    pub fn apply(&mut self, update: &EmotionalUpdate) {
        self.current_mood = update.mood;
        self.mood_intensity = clamp_intensity(update.intensity);
        if let Some(summary) = &update.interaction_summary {
            self.last_interaction_effect.clone_from(summary);
        }
        self.accumulate(&update.delta);
        self.last_updated = Utc::now();
    }

    /// Natural-language description of the mood for dialogue prompts.
    #[must_use]
    pub fn mood_context(&self) -> String {
        let mut text = self.current_mood.description(self.mood_intensity);

        let mut modifiers = Vec::new();
        if self.recent_joy > 1.0 {
            modifiers.push("with recent moments of happiness");
        }
        if self.recent_sadness > 1.0 {
            modifiers.push("but also dealing with some sadness");
        }
        if self.recent_anger > 1.0 {
            modifiers.push("with some underlying frustration");
        }
        if self.recent_excitement > 1.0 {
            modifiers.push("with bursts of excitement");
        }
        if !modifiers.is_empty() {
            text.push(' ');
            text.push_str(&modifiers.join(", "));
            text.push('.');
        }

        if !self.last_interaction_effect.is_empty() {
            text.push_str(" Recent interaction: ");
            text.push_str(&self.last_interaction_effect);
        }
        text
    }
}

fn clamp_accumulator(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-ACCUMULATOR_LIMIT, ACCUMULATOR_LIMIT)
    } else {
        0.0
    }
}

fn clamp_intensity(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, MAX_INTENSITY)
    } else {
        5.0
    }
}

/// Signed change to the five emotion accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionDelta {
    /// Joy change.
    #[serde(default)]
    pub joy: f32,
    /// Sadness change.
    #[serde(default)]
    pub sadness: f32,
    /// Anger change.
    #[serde(default)]
    pub anger: f32,
    /// Anxiety change.
    #[serde(default)]
    pub anxiety: f32,
    /// Excitement change.
    #[serde(default)]
    pub excitement: f32,
}

impl EmotionDelta {
    /// Every component clamped to \[-3, 3\]; non-finite components become 0.
    #[must_use]
    pub fn bounded(&self) -> Self {
        let b = |v: f32| if v.is_finite() { v.clamp(-MAX_DELTA, MAX_DELTA) } else { 0.0 };
        Self {
            joy: b(self.joy),
            sadness: b(self.sadness),
            anger: b(self.anger),
            anxiety: b(self.anxiety),
            excitement: b(self.excitement),
        }
    }

    /// Whether every component is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        [self.joy, self.sadness, self.anger, self.anxiety, self.excitement]
            .iter()
            .all(|v| *v == 0.0)
    }
}

/// A proposed transition of the emotional state.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionalUpdate {
    /// New mood.
    pub mood: Mood,
    /// New intensity (clamped on apply).
    pub intensity: f32,
    /// Why the mood changed.
    pub reason: Option<String>,
    /// One-line summary stored as the last interaction effect.
    pub interaction_summary: Option<String>,
    /// Accumulator changes.
    pub delta: EmotionDelta,
}

// ---------------------------------------------------------------------------
// Tone fallback
// ---------------------------------------------------------------------------

/// Coarse tone of an interaction, used by the rule-based fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Kind, warm, complimentary.
    Friendly,
    /// Rude, teasing, hostile.
    Provocative,
    /// Anything else.
    Neutral,
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "friendly" => Ok(Self::Friendly),
            "provocative" => Ok(Self::Provocative),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown tone: '{other}'")),
        }
    }
}

impl Tone {
    /// Label used in prompts and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Provocative => "provocative",
            Self::Neutral => "neutral",
        }
    }

    /// Deterministic update used when the LLM call or its parse fails.
    #[must_use]
    pub fn fallback_update(self) -> EmotionalUpdate {
        match self {
            Self::Friendly => EmotionalUpdate {
                mood: Mood::Happy,
                intensity: 6.0,
                reason: Some("rule-based fallback".into()),
                interaction_summary: Some("The player was friendly and kind.".into()),
                delta: EmotionDelta {
                    joy: 1.5,
                    sadness: -0.5,
                    anger: -0.5,
                    anxiety: -0.5,
                    excitement: 1.0,
                },
            },
            Self::Provocative => EmotionalUpdate {
                mood: Mood::Angry,
                intensity: 6.5,
                reason: Some("rule-based fallback".into()),
                interaction_summary: Some("The player was provocative or rude.".into()),
                delta: EmotionDelta {
                    joy: -1.0,
                    sadness: 0.5,
                    anger: 2.0,
                    anxiety: 0.5,
                    excitement: -0.5,
                },
            },
            Self::Neutral => EmotionalUpdate {
                mood: Mood::Neutral,
                intensity: 5.0,
                reason: Some("rule-based fallback".into()),
                interaction_summary: Some("A normal, polite conversation.".into()),
                delta: EmotionDelta::default(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Loads, seeds, updates and resets emotional states.
pub struct EmotionalStateMachine {
    store: Arc<dyn RelationshipStore>,
    events: Arc<dyn EventSink>,
}

impl EmotionalStateMachine {
    /// Create the machine over a store and an event sink.
    #[must_use]
    pub fn new(store: Arc<dyn RelationshipStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Current state for `key`, creating neutral defaults on first access.
    ///
    /// A store failure degrades to an unsaved neutral state.
    pub async fn get_or_create(&self, key: RelationshipKey) -> EmotionalState {
        match self.store.load_emotional_state(key).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                let state = EmotionalState::neutral(key);
                if let Err(e) = self.store.save_emotional_state(&state).await {
                    warn!(%key, error = %e, "Could not persist default emotional state");
                }
                debug!(%key, "Seeded neutral emotional state");
                state
            }
            Err(e) => {
                warn!(%key, error = %e, "Emotional state unavailable, using neutral default");
                EmotionalState::neutral(key)
            }
        }
    }

    /// Apply `update` to the stored state and emit a change event when the mood moved.
    ///
    /// # Errors
    ///
    /// Returns the store error if the new state could not be written.
    pub async fn apply(&self, key: RelationshipKey, update: &EmotionalUpdate) -> Result<EmotionalState> {
        let old = self.get_or_create(key).await;
        let mut new = old.clone();
        new.apply(update);
        self.store.save_emotional_state(&new).await?;

        info!(
            %key,
            old_mood = %old.current_mood,
            new_mood = %new.current_mood,
            intensity = new.mood_intensity,
            "Emotional state updated"
        );

        if old.current_mood != new.current_mood
            || (old.mood_intensity - new.mood_intensity).abs() > f32::EPSILON
        {
            notify(
                self.events.as_ref(),
                &RelationshipEvent::MoodChanged {
                    key,
                    old_mood: old.current_mood,
                    new_mood: new.current_mood,
                    old_intensity: old.mood_intensity,
                    new_intensity: new.mood_intensity,
                    reason: update.reason.clone(),
                },
            );
        }
        Ok(new)
    }

    /// Administrative reset: forget the stored state entirely.
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete failed.
    pub async fn reset(&self, key: RelationshipKey) -> Result<bool> {
        self.store.delete_emotional_state(key).await
    }
}
