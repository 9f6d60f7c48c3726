//! Utterance → friendship points.
//!
//! A lexicon scorer: tokens are matched against small positive, negative and
//! profanity word lists, and the resulting base sentiment is bent by how the
//! NPC currently perceives the player.

use serde::Serialize;

use crate::personality::PersonalityProfile;

const POSITIVE_WORDS: &[&str] = &[
    "love", "loved", "lovely", "like", "great", "amazing", "awesome", "beautiful", "wonderful",
    "thanks", "thank", "happy", "glad", "nice", "good", "excellent", "fantastic", "cool", "fun",
    "kind", "sweet", "best", "enjoy", "adore", "appreciate", "cute", "brilliant", "friend",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "hated", "bad", "terrible", "awful", "ugly", "boring", "stupid", "annoying",
    "horrible", "worst", "sad", "angry", "disgusting", "dumb", "lame", "gross", "weird",
    "useless", "pathetic", "shut",
];

const PROFANITY: &[&str] = &[
    "damn", "hell", "crap", "shit", "fuck", "fucking", "bastard", "bitch", "ass", "asshole",
    "idiot", "moron",
];

/// Word counts and the resulting base sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentBreakdown {
    /// Positive words found.
    pub positive: u32,
    /// Negative words found.
    pub negative: u32,
    /// Profane words found.
    pub profanity: u32,
    /// `clamp(0.2 + 0.3*pos - 0.35*neg - 0.6*prof, -1, 1)`.
    pub base: f32,
}

/// Count lexicon hits in `text`.
#[must_use]
pub fn analyze(text: &str) -> SentimentBreakdown {
    let (mut positive, mut negative, mut profanity) = (0_u32, 0_u32, 0_u32);
    for token in tokens(text) {
        let token = token.as_str();
        if POSITIVE_WORDS.contains(&token) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&token) {
            negative += 1;
        } else if PROFANITY.contains(&token) {
            profanity += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let base = (0.2 + 0.3 * positive as f32 - 0.35 * negative as f32 - 0.6 * profanity as f32)
        .clamp(-1.0, 1.0);
    SentimentBreakdown {
        positive,
        negative,
        profanity,
        base,
    }
}

/// How strongly the NPC reacts, in \[0.5, 1.5\].
///
/// Friendly, trusting NPCs amplify praise; annoyed ones amplify insults.
#[must_use]
pub fn personality_multiplier(base: f32, profile: &PersonalityProfile) -> f32 {
    let fr = profile.friendliness - 5.0;
    let an = profile.annoyance - 5.0;
    let tr = profile.trust - 5.0;
    let m = if base > 0.0 {
        1.0 + 0.06 * fr - 0.04 * an + 0.02 * tr
    } else {
        1.0 - 0.04 * fr + 0.06 * an - 0.02 * tr
    };
    m.clamp(0.5, 1.5)
}

/// Friendship points for one utterance.
///
/// Blank text scores exactly 0. Positive sentiment lands in \[5, 40\],
/// anything else in \[-20, -2\].
#[must_use]
pub fn utterance_points(text: &str, profile: Option<&PersonalityProfile>, npc_multiplier: f32) -> i32 {
    if text.trim().is_empty() {
        return 0;
    }
    let base = analyze(text).base;
    let personality = profile.map_or(1.0, |p| personality_multiplier(base, p));
    let x = base * personality * npc_multiplier;

    if x > 0.0 {
        round_to_i32(x * 30.0).clamp(5, 40)
    } else {
        round_to_i32(x * 20.0).clamp(-20, -2)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_to_i32(v: f32) -> i32 {
    v.round() as i32
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::{Archetype, Trait};
    use crate::types::{NpcId, PlayerId, RelationshipKey};

    fn profile(archetype: &Archetype) -> PersonalityProfile {
        PersonalityProfile::from_archetype(
            RelationshipKey::new(PlayerId::new(), NpcId::new()),
            archetype,
        )
    }

    #[test]
    fn blank_is_zero() {
        assert_eq!(utterance_points("", None, 1.0), 0);
        assert_eq!(utterance_points("   \n", None, 1.0), 0);
    }

    #[test]
    fn words_are_matched_as_tokens() {
        let b = analyze("I LOVE it, thanks! Glove shopping is boring.");
        assert_eq!(b.positive, 2);
        assert_eq!(b.negative, 1);
        assert_eq!(b.profanity, 0);
    }

    #[test]
    fn positive_utterance_lands_in_positive_band() {
        let p = profile(&Archetype::generic());
        let pts = utterance_points("I love collecting gems!", Some(&p), 1.0);
        assert!((5..=40).contains(&pts), "points were {pts}");
    }

    #[test]
    fn neutral_text_still_gets_the_small_positive_bias() {
        assert_eq!(utterance_points("The bus leaves at noon.", None, 1.0), 6);
    }

    #[test]
    fn insults_land_in_negative_band() {
        let pts = utterance_points("You are stupid and boring, damn it", None, 1.0);
        assert_eq!(pts, -20);
        let mild = utterance_points("That was bad", None, 1.0);
        assert!((-20..=-2).contains(&mild), "points were {mild}");
    }

    #[test]
    fn multiplier_is_clamped() {
        let mut p = profile(&Archetype::generic());
        p.set(Trait::Friendliness, 10.0);
        p.set(Trait::Annoyance, 0.0);
        p.set(Trait::Trust, 10.0);
        assert!((personality_multiplier(0.5, &p) - 1.5).abs() < 1e-6);
        assert!((personality_multiplier(-0.5, &p) - 0.5).abs() < 1e-6);
    }
}
