//! Gift/Sentiment adjunct scoring.
//!
//! Deterministic, synchronous point calculations reported to the host game,
//! which owns the actual friendship counter.

pub mod gift;
pub mod sentiment;

pub use gift::{GiftQuality, GiftTier, gift_points};
pub use sentiment::{SentimentBreakdown, utterance_points};

/// Friendship delta for a whole conversation: `round(score * scale)`.
///
/// `score` is the analysed sentiment of the player's final message, nominally
/// in \[-1, 1\]. It is not clamped here, so the delta is bounded only by the
/// score itself. A non-finite score yields 0.
#[must_use]
pub fn conversation_points(score: f32, scale: f32) -> i32 {
    if !score.is_finite() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let points = (score * scale).round() as i32;
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_points_scale_without_clamping() {
        assert_eq!(conversation_points(0.8, 20.0), 16);
        assert_eq!(conversation_points(-0.33, 20.0), -7);
        // an out-of-range score from the model passes straight through
        assert_eq!(conversation_points(3.0, 20.0), 60);
        assert_eq!(conversation_points(-1.5, 20.0), -30);
        assert_eq!(conversation_points(f32::NAN, 20.0), 0);
        assert_eq!(conversation_points(f32::INFINITY, 20.0), 0);
    }
}
