//! Per-turn mood updates for hosts that want feedback before the
//! conversation ends.
//!
//! The fast model answers in `KEY: value` lines. Each line is read on its own;
//! whatever is missing or unreadable is taken from the tone fallback table, so
//! a completely failed call degrades to the pure rule-based update.

use std::sync::Arc;

use echoes_core::RelationshipKey;
use echoes_core::emotion::{EmotionDelta, EmotionalState, EmotionalStateMachine, EmotionalUpdate, Mood, Tone};
use echoes_llm::TextCompletion;
use echoes_llm::parse::{extract_prefixed, extract_prefixed_f32};
use echoes_llm::prompt::{PromptEngine, PromptId};
use tracing::{debug, warn};

use crate::error::Result;

/// Asks the fast model how one exchange changed the NPC's mood.
pub struct MoodUpdater {
    emotions: Arc<EmotionalStateMachine>,
    completion: Arc<dyn TextCompletion>,
    prompts: Arc<PromptEngine>,
}

impl MoodUpdater {
    /// Create the updater.
    #[must_use]
    pub fn new(
        emotions: Arc<EmotionalStateMachine>,
        completion: Arc<dyn TextCompletion>,
        prompts: Arc<PromptEngine>,
    ) -> Self {
        Self {
            emotions,
            completion,
            prompts,
        }
    }

    /// Update the mood `npc_name` holds toward `player_name` after `transcript`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the new state could not be written. Model
    /// failures never surface; they fall back to `tone`.
    pub async fn update_from_interaction(
        &self,
        key: RelationshipKey,
        npc_name: &str,
        player_name: &str,
        transcript: &str,
        tone: Tone,
    ) -> Result<EmotionalState> {
        let state = self.emotions.get_or_create(key).await;
        let intensity = format!("{:.1}", state.mood_intensity);
        let valid_moods = Mood::label_list();

        let reply = match self.prompts.request(
            PromptId::EmotionalUpdate,
            &[
                ("npc_name", npc_name),
                ("player_name", player_name),
                ("current_mood", state.current_mood.as_str()),
                ("mood_intensity", intensity.as_str()),
                ("tone", tone.as_str()),
                ("transcript", transcript),
                ("valid_moods", valid_moods.as_str()),
            ],
        ) {
            Ok(request) => match self.completion.complete(&request).await {
                Ok(reply) => Some(reply),
                Err(e) => {
                    warn!(%key, npc = npc_name, error = %e, "Mood model call failed, using tone fallback");
                    None
                }
            },
            Err(e) => {
                warn!(%key, error = %e, "Mood prompt unavailable, using tone fallback");
                None
            }
        };

        let update = reply.as_deref().map_or_else(|| tone.fallback_update(), |r| parse_mood_reply(r, tone));
        debug!(%key, mood = %update.mood, intensity = update.intensity, "Applying per-turn mood update");
        Ok(self.emotions.apply(key, &update).await?)
    }
}

/// Read a `MOOD:` / `INTENSITY:` / `<EMOTION>:` / `SUMMARY:` reply, filling
/// every missing or invalid field from `tone`'s fallback.
#[must_use]
pub fn parse_mood_reply(reply: &str, tone: Tone) -> EmotionalUpdate {
    let fallback = tone.fallback_update();

    let mood = extract_prefixed(reply, "MOOD:")
        .and_then(|m| m.parse::<Mood>().ok())
        .unwrap_or(fallback.mood);
    let intensity = extract_prefixed_f32(reply, "INTENSITY:").unwrap_or(fallback.intensity);
    let d = fallback.delta;
    let delta = EmotionDelta {
        joy: extract_prefixed_f32(reply, "JOY:").unwrap_or(d.joy),
        sadness: extract_prefixed_f32(reply, "SADNESS:").unwrap_or(d.sadness),
        anger: extract_prefixed_f32(reply, "ANGER:").unwrap_or(d.anger),
        anxiety: extract_prefixed_f32(reply, "ANXIETY:").unwrap_or(d.anxiety),
        excitement: extract_prefixed_f32(reply, "EXCITEMENT:").unwrap_or(d.excitement),
    }
    .bounded();
    let summary = extract_prefixed(reply, "SUMMARY:").or(fallback.interaction_summary);

    EmotionalUpdate {
        mood,
        intensity,
        reason: Some(format!("{} interaction", tone.as_str())),
        interaction_summary: summary,
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoes_core::events::NullSink;
    use echoes_core::{NpcId, PlayerId, SqliteStore};
    use echoes_llm::ScriptedCompletion;

    fn updater(completion: Arc<dyn TextCompletion>) -> MoodUpdater {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let emotions = Arc::new(EmotionalStateMachine::new(store, Arc::new(NullSink)));
        MoodUpdater::new(emotions, completion, Arc::new(PromptEngine::builtin()))
    }

    #[test]
    fn complete_reply_is_used_as_is() {
        let u = parse_mood_reply(
            "MOOD: WORRIED\nINTENSITY: 6.5\nJOY: -1\nSADNESS: 0.5\nANGER: 0\nANXIETY: 2\nEXCITEMENT: -0.5\nSUMMARY: Uneasy.",
            Tone::Friendly,
        );
        assert_eq!(u.mood, Mood::Worried);
        assert!((u.intensity - 6.5).abs() < 1e-6);
        assert!((u.delta.anxiety - 2.0).abs() < 1e-6);
        assert_eq!(u.interaction_summary.as_deref(), Some("Uneasy."));
    }

    #[test]
    fn gaps_are_filled_from_the_tone_table() {
        let fallback = Tone::Provocative.fallback_update();
        let u = parse_mood_reply("MOOD: grumpy\nJOY: 9\nSUMMARY: Rude.", Tone::Provocative);
        assert_eq!(u.mood, fallback.mood);
        assert!((u.intensity - fallback.intensity).abs() < 1e-6);
        assert!((u.delta.joy - 3.0).abs() < 1e-6, "deltas are clamped to 3");
        assert!((u.delta.anger - fallback.delta.anger).abs() < 1e-6);
        assert_eq!(u.interaction_summary.as_deref(), Some("Rude."));
    }

    #[tokio::test]
    async fn model_reply_moves_the_state() {
        let script = Arc::new(ScriptedCompletion::new([
            "MOOD: EXCITED\nINTENSITY: 8\nJOY: 2\nEXCITEMENT: 2\nSUMMARY: We talked about gems.",
        ]));
        let mood = updater(script.clone());
        let key = RelationshipKey::new(PlayerId::new(), NpcId::new());

        let state = mood
            .update_from_interaction(key, "Abigail", "Ash", "Player: I love gems!", Tone::Friendly)
            .await
            .expect("update");
        assert_eq!(state.current_mood, Mood::Excited);
        assert!((state.recent_joy - 2.0).abs() < 1e-6);
        assert_eq!(state.last_interaction_effect, "We talked about gems.");

        let prompt = &script.prompts()[0];
        assert!(prompt.user.contains("I love gems!"));
        assert!(prompt.system.contains("Abigail"));
    }

    #[tokio::test]
    async fn failed_call_uses_the_fallback() {
        let mood = updater(Arc::new(ScriptedCompletion::new(Vec::<String>::new())));
        let key = RelationshipKey::new(PlayerId::new(), NpcId::new());
        let state = mood
            .update_from_interaction(key, "Shane", "Ash", "Player: Go away.", Tone::Provocative)
            .await
            .expect("update");
        assert_eq!(state.current_mood, Mood::Angry);
        assert!(state.recent_anger > 0.0);
    }
}
