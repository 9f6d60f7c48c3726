//! Gift → friendship points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Multiplier applied to the base points on the NPC's birthday.
pub const BIRTHDAY_MULTIPLIER: f32 = 8.0;

/// How much an NPC likes a gift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftTier {
    /// Favourite gifts.
    Loved,
    /// Appreciated gifts.
    Liked,
    /// Neither here nor there.
    Neutral,
    /// Mildly unwelcome.
    Disliked,
    /// Insulting.
    Hated,
}

impl GiftTier {
    /// Every tier, best first.
    pub const ALL: [GiftTier; 5] = [
        Self::Loved,
        Self::Liked,
        Self::Neutral,
        Self::Disliked,
        Self::Hated,
    ];

    /// Points before birthday, quality and NPC multipliers.
    #[must_use]
    pub fn base_points(self) -> f32 {
        match self {
            Self::Loved => 80.0,
            Self::Liked => 45.0,
            Self::Neutral => 20.0,
            Self::Disliked => -20.0,
            Self::Hated => -40.0,
        }
    }

    /// Lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loved => "loved",
            Self::Liked => "liked",
            Self::Neutral => "neutral",
            Self::Disliked => "disliked",
            Self::Hated => "hated",
        }
    }
}

impl fmt::Display for GiftTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GiftTier {
    type Err = String;

    /// Accepts the five labels plus the verb forms ("love", "hate", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loved" | "love" => Ok(Self::Loved),
            "liked" | "like" => Ok(Self::Liked),
            "neutral" => Ok(Self::Neutral),
            "disliked" | "dislike" => Ok(Self::Disliked),
            "hated" | "hate" => Ok(Self::Hated),
            other => Err(format!("unknown gift tier: '{other}'")),
        }
    }
}

/// Item quality star level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftQuality {
    /// No star.
    #[default]
    Normal,
    /// Silver star.
    Silver,
    /// Gold star.
    Gold,
    /// Iridium star.
    Iridium,
}

impl GiftQuality {
    /// Map the host's numeric quality (0 normal, 1 silver, 2 gold, 3+ iridium).
    ///
    /// The game itself skips 3 and uses 4 for iridium; both map to iridium.
    #[must_use]
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Normal,
            1 => Self::Silver,
            2 => Self::Gold,
            _ => Self::Iridium,
        }
    }

    /// Multiplier applied to the (birthday-adjusted) base.
    #[must_use]
    pub fn multiplier(self) -> f32 {
        match self {
            Self::Normal => 1.0,
            Self::Silver => 1.25,
            Self::Gold => 1.5,
            Self::Iridium => 2.0,
        }
    }
}

/// Friendship points for a gift.
///
/// Positive bases scale up with quality, negative bases are divided by it so a
/// better version of a disliked item always hurts less.
#[must_use]
pub fn gift_points(tier: GiftTier, quality: GiftQuality, birthday: bool, npc_multiplier: f32) -> i32 {
    let mut points = tier.base_points();
    if birthday {
        points *= BIRTHDAY_MULTIPLIER;
    }
    if points >= 0.0 {
        points *= quality.multiplier();
    } else {
        points /= quality.multiplier();
    }
    points *= npc_multiplier;
    #[allow(clippy::cast_possible_truncation)]
    let rounded = points.round() as i32;
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn birthday_multiplies_base_by_eight() {
        assert_eq!(gift_points(GiftTier::Liked, GiftQuality::Normal, true, 1.0), 360);
        assert_eq!(gift_points(GiftTier::Liked, GiftQuality::Normal, false, 1.0), 45);
    }

    #[test]
    fn loved_gold_is_one_twenty() {
        assert_eq!(gift_points(GiftTier::Loved, GiftQuality::Gold, false, 1.0), 120);
    }

    #[test]
    fn quality_is_monotonic_for_every_tier() {
        let qualities = [
            GiftQuality::Normal,
            GiftQuality::Silver,
            GiftQuality::Gold,
            GiftQuality::Iridium,
        ];
        for tier in GiftTier::ALL {
            for birthday in [false, true] {
                let points: Vec<i32> = qualities
                    .iter()
                    .map(|q| gift_points(tier, *q, birthday, 1.0))
                    .collect();
                assert!(
                    points.windows(2).all(|w| w[0] <= w[1]),
                    "{tier} birthday={birthday}: {points:?}"
                );
            }
        }
    }

    #[test]
    fn npc_multiplier_applies_last() {
        assert_eq!(gift_points(GiftTier::Hated, GiftQuality::Normal, false, 0.75), -30);
        assert_eq!(gift_points(GiftTier::Loved, GiftQuality::Normal, false, 1.2), 96);
    }

    #[test]
    fn quality_levels_map_from_host() {
        assert_eq!(GiftQuality::from_level(0), GiftQuality::Normal);
        assert_eq!(GiftQuality::from_level(2), GiftQuality::Gold);
        assert_eq!(GiftQuality::from_level(4), GiftQuality::Iridium);
    }

    #[test]
    fn tier_parses_verb_forms() {
        assert_eq!("LOVE".parse::<GiftTier>(), Ok(GiftTier::Loved));
        assert_eq!(" disliked ".parse::<GiftTier>(), Ok(GiftTier::Disliked));
        assert!("meh".parse::<GiftTier>().is_err());
    }
}
