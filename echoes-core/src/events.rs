//! Change notifications pushed to real-time observers.
//!
//! The engine never delivers events itself. It hands them to an
//! [`EventSink`]; the transport layer decides what to do with them. A failed
//! emission is logged and never rolls back the state change that caused it.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::emotion::Mood;
use crate::error::Result;
use crate::personality::TraitChange;
use crate::types::{ContextSnapshot, ConversationId, RelationshipKey, Speaker};

/// A structured change event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationshipEvent {
    /// A new conversation was opened.
    #[serde(rename = "new_conversation")]
    ConversationStarted {
        /// The new conversation.
        conversation: ConversationId,
        /// Who is talking.
        key: RelationshipKey,
        /// Snapshot stamped on the conversation.
        context: ContextSnapshot,
    },
    /// A conversation was explicitly closed.
    ConversationEnded {
        /// The closed conversation.
        conversation: ConversationId,
        /// Who was talking.
        key: RelationshipKey,
    },
    /// A dialogue turn was appended.
    #[serde(rename = "new_dialogue")]
    DialogueAdded {
        /// Conversation the turn belongs to.
        conversation: ConversationId,
        /// Who spoke.
        speaker: Speaker,
        /// What was said.
        message: String,
        /// Whether an embedding was stored with the turn.
        embedded: bool,
    },
    /// The NPC's mood toward a player changed.
    #[serde(rename = "emotional_state_change")]
    MoodChanged {
        /// Relationship whose mood changed.
        key: RelationshipKey,
        /// Mood before the update.
        old_mood: Mood,
        /// Mood after the update.
        new_mood: Mood,
        /// Intensity before the update.
        old_intensity: f32,
        /// Intensity after the update.
        new_intensity: f32,
        /// Why the mood changed, when known.
        reason: Option<String>,
    },
    /// Personality traits or the summary changed.
    #[serde(rename = "personality_update")]
    PersonalityChanged {
        /// Relationship whose profile changed.
        key: RelationshipKey,
        /// Per-trait differences.
        changes: Vec<TraitChange>,
        /// Whether the free-text summary was replaced with different text.
        summary_changed: bool,
    },
    /// A post-conversation analysis finished applying its updates.
    AnalysisComplete {
        /// The analysed conversation.
        conversation: ConversationId,
        /// Relationship that was updated.
        key: RelationshipKey,
        /// Episodic memories recorded.
        memories: usize,
        /// Preferences recorded.
        preferences: usize,
        /// Friendship-point delta reported to the host.
        friendship_delta: i32,
    },
}

impl RelationshipEvent {
    /// Wire name of this event, as used in the serialized `type` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationStarted { .. } => "new_conversation",
            Self::ConversationEnded { .. } => "conversation_ended",
            Self::DialogueAdded { .. } => "new_dialogue",
            Self::MoodChanged { .. } => "emotional_state_change",
            Self::PersonalityChanged { .. } => "personality_update",
            Self::AnalysisComplete { .. } => "analysis_complete",
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of change events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EchoesError::Notification`] when delivery fails.
    fn emit(&self, event: &RelationshipEvent) -> Result<()>;
}

/// Emit `event`, logging instead of propagating a delivery failure.
pub fn notify(sink: &dyn EventSink, event: &RelationshipEvent) {
    if let Err(e) = sink.emit(event) {
        warn!(event = event.name(), error = %e, "Failed to emit change event");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RelationshipEvent) -> Result<()> {
        Ok(())
    }
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RelationshipEvent>,
}

impl BroadcastSink {
    /// Create a sink whose channel buffers `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelationshipEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &RelationshipEvent) -> Result<()> {
        if self.tx.send(event.clone()).is_err() {
            trace!(event = event.name(), "No observers subscribed");
        }
        Ok(())
    }
}

/// Keeps every event in memory. Handy for hosts that poll and for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RelationshipEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<RelationshipEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<RelationshipEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &RelationshipEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EchoesError;
    use crate::types::{NpcId, PlayerId};

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn emit(&self, _event: &RelationshipEvent) -> Result<()> {
            Err(EchoesError::Notification("socket closed".into()))
        }
    }

    fn ended() -> RelationshipEvent {
        RelationshipEvent::ConversationEnded {
            conversation: ConversationId::new(),
            key: RelationshipKey::new(PlayerId::new(), NpcId::new()),
        }
    }

    #[test]
    fn serialized_tag_matches_name() {
        let event = ended();
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], event.name());
    }

    #[test]
    fn broken_sink_does_not_panic() {
        notify(&BrokenSink, &ended());
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let event = ended();
        sink.emit(&event).expect("emit");
        assert_eq!(rx.recv().await.expect("recv"), event);
    }

    #[test]
    fn broadcast_without_subscribers_is_ok() {
        assert!(BroadcastSink::new(4).emit(&ended()).is_ok());
    }
}
