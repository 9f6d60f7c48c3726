//! Core type definitions shared by every component.
//!
//! Identity newtypes, the relationship key, dialogue speakers, the context
//! snapshot attached to conversations, and embedding vectors.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a player.
    PlayerId
);
uuid_id!(
    /// Unique identifier for an NPC.
    NpcId
);
uuid_id!(
    /// Unique identifier for a conversation session.
    ConversationId
);
uuid_id!(
    /// Unique identifier for a single dialogue turn.
    DialogueId
);
uuid_id!(
    /// Unique identifier for an episodic memory.
    MemoryId
);

/// One (player, NPC) relationship. Every piece of mutable state is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    /// The player side of the relationship.
    pub player: PlayerId,
    /// The NPC side of the relationship.
    pub npc: NpcId,
}

impl RelationshipKey {
    /// Build a key from its two halves.
    #[must_use]
    pub fn new(player: PlayerId, npc: NpcId) -> Self {
        Self { player, npc }
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.player, self.npc)
    }
}

// ---------------------------------------------------------------------------
// Dialogue
// ---------------------------------------------------------------------------

/// Who said a dialogue line.
///
/// Stored as the literal `"player"` or as the NPC's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Speaker {
    /// The player character.
    Player,
    /// The NPC, identified by name.
    Npc(String),
}

impl Speaker {
    /// Storage token for the player speaker.
    pub const PLAYER_TOKEN: &'static str = "player";

    /// The stored representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Player => Self::PLAYER_TOKEN,
            Self::Npc(name) => name,
        }
    }

    /// Whether this line was spoken by the player.
    #[must_use]
    pub fn is_player(&self) -> bool {
        matches!(self, Self::Player)
    }
}

impl From<String> for Speaker {
    fn from(value: String) -> Self {
        if value == Self::PLAYER_TOKEN {
            Self::Player
        } else {
            Self::Npc(value)
        }
    }
}

impl From<Speaker> for String {
    fn from(value: Speaker) -> Self {
        match value {
            Speaker::Player => Speaker::PLAYER_TOKEN.to_string(),
            Speaker::Npc(name) => name,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Context snapshot
// ---------------------------------------------------------------------------

/// In-game context captured when a conversation opens.
///
/// Every field is optional; hosts send whatever they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Season name ("spring", "summer", ...).
    #[serde(default)]
    pub season: Option<String>,
    /// Day of the month (1–28).
    #[serde(default)]
    pub day_of_month: Option<u32>,
    /// Day of the week ("Mon", ...).
    #[serde(default)]
    pub day_of_week: Option<String>,
    /// Game clock, e.g. `1330` for 1:30 pm.
    #[serde(default)]
    pub time_of_day: Option<u32>,
    /// In-game year.
    #[serde(default)]
    pub year: Option<u32>,
    /// Weather label.
    #[serde(default)]
    pub weather: Option<String>,
    /// Map the player was on.
    #[serde(default)]
    pub player_location: Option<String>,
    /// Friendship hearts at the time of the conversation.
    #[serde(default)]
    pub friendship_hearts: Option<u32>,
}

/// Friendship points per heart in the host game.
pub const POINTS_PER_HEART: i32 = 250;

/// Convert the host's friendship points to whole hearts.
#[must_use]
pub fn friendship_hearts(points: i32) -> u32 {
    u32::try_from(points.max(0) / POINTS_PER_HEART).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
///
/// An empty vector is the "no embedding" sentinel produced by a failed or
/// skipped embedding call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// The empty sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether this is the empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Euclidean distance to `other`.
    ///
    /// Returns `None` when either vector is empty or the dimensions differ.
    #[must_use]
    pub fn l2_distance(&self, other: &Self) -> Option<f32> {
        if self.is_empty() || self.0.len() != other.0.len() {
            return None;
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        Some(sum.sqrt())
    }
}

// ---------------------------------------------------------------------------
// Relevance Score
// ---------------------------------------------------------------------------

/// Totally ordered relevance score used to rank memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelevanceScore(pub OrderedFloat<f32>);

impl RelevanceScore {
    /// Create a relevance score from a raw f32.
    #[must_use]
    pub fn new(score: f32) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f32 {
        self.0.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_round_trips_through_string() {
        assert_eq!(Speaker::from("player".to_string()), Speaker::Player);
        assert_eq!(
            Speaker::from("Abigail".to_string()),
            Speaker::Npc("Abigail".into())
        );
        assert_eq!(String::from(Speaker::Player), "player");
    }

    #[test]
    fn l2_distance_requires_matching_dimensions() {
        let a = Embedding(vec![0.0, 0.0]);
        let b = Embedding(vec![3.0, 4.0]);
        assert_eq!(a.l2_distance(&b), Some(5.0));
        assert_eq!(a.l2_distance(&Embedding(vec![1.0])), None);
        assert_eq!(Embedding::empty().l2_distance(&Embedding::empty()), None);
    }

    #[test]
    fn hearts_floor_points() {
        assert_eq!(friendship_hearts(0), 0);
        assert_eq!(friendship_hearts(249), 0);
        assert_eq!(friendship_hearts(750), 3);
        assert_eq!(friendship_hearts(-100), 0);
    }
}
