//! Relationship Insight Generator.
//!
//! Pure functions over a [`PersonalityProfile`]: a weighted relationship score,
//! its discrete [`RelationshipLevel`], and a prompt-ready narrative.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{PersonalityProfile, Trait};
use crate::emotion::Mood;

/// Weighted relationship score in \[0, 10\].
///
/// `(fr*1.2 + tr*1.3 + re*1.0 + af*1.5 + ad*0.8 + hu*0.7 - an*2.0) / 7.5`
#[must_use]
pub fn relationship_score(profile: &PersonalityProfile) -> f32 {
    let weighted = profile.friendliness * 1.2
        + profile.trust * 1.3
        + profile.respect * 1.0
        + profile.affection * 1.5
        + profile.admiration * 0.8
        + profile.humor_compatibility * 0.7
        - profile.annoyance * 2.0;
    let score = weighted / 7.5;
    if score.is_finite() { score.clamp(0.0, 10.0) } else { 0.0 }
}

/// Discrete relationship level, ordered from worst to best.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLevel {
    /// Below 1.5.
    Hatred,
    /// 1.5 and up.
    VeryBad,
    /// 2.5 and up.
    Bad,
    /// 3.5 and up.
    Tense,
    /// 4.5 and up.
    #[default]
    Neutral,
    /// 5.5 and up.
    Good,
    /// 6.5 and up.
    VeryGood,
    /// 7.5 and up.
    Excellent,
    /// 8.5 and up.
    Extraordinary,
}

impl RelationshipLevel {
    const THRESHOLDS: [(f32, RelationshipLevel); 8] = [
        (8.5, Self::Extraordinary),
        (7.5, Self::Excellent),
        (6.5, Self::VeryGood),
        (5.5, Self::Good),
        (4.5, Self::Neutral),
        (3.5, Self::Tense),
        (2.5, Self::Bad),
        (1.5, Self::VeryBad),
    ];

    /// Map a score to its level.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map_or(Self::Hatred, |(_, level)| *level)
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Hatred => "hatred",
            Self::VeryBad => "very bad",
            Self::Bad => "bad",
            Self::Tense => "tense",
            Self::Neutral => "neutral",
            Self::Good => "good",
            Self::VeryGood => "very good",
            Self::Excellent => "excellent",
            Self::Extraordinary => "extraordinary",
        }
    }
}

/// Score, level and narrative for one relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipInsight {
    /// Weighted score in \[0, 10\].
    pub score: f32,
    /// Discrete level derived from the score.
    pub level: RelationshipLevel,
    /// Prompt-ready description.
    pub narrative: String,
}

impl RelationshipInsight {
    /// Build the insight for `npc_name`'s view of `player_name`.
    ///
    /// `mood` is the NPC's current mood and intensity, when known.
    #[must_use]
    pub fn generate(
        profile: &PersonalityProfile,
        player_name: &str,
        npc_name: &str,
        mood: Option<(Mood, f32)>,
    ) -> Self {
        let score = relationship_score(profile);
        let level = RelationshipLevel::from_score(score);

        let mut narrative = String::new();
        if let Some((mood, intensity)) = mood {
            let _ = writeln!(narrative, "Current mood: {mood} (intensity {intensity:.1}/10)");
        }
        let _ = writeln!(
            narrative,
            "Relationship {npc_name} -> {player_name}: {} ({score:.1}/10)",
            level.label()
        );
        let _ = writeln!(narrative, "Perception: \"{}\"", profile.summary);
        let _ = write!(narrative, "Personality profile (from {npc_name}'s perspective):");
        for t in Trait::ALL {
            let _ = write!(narrative, "\n  - {}: {:.1}/10", t.label(), profile.get(t));
        }

        Self {
            score,
            level,
            narrative,
        }
    }

    /// Insight used when no profile could be loaded at all.
    #[must_use]
    pub fn unavailable(player_name: &str, npc_name: &str) -> Self {
        Self {
            score: 5.0,
            level: RelationshipLevel::default(),
            narrative: format!(
                "Relationship {npc_name} -> {player_name}: neutral (no history available)"
            ),
        }
    }
}
