//! Conversation Lifecycle Manager.
//!
//! A conversation moves NONE → OPEN → CLOSED. It opens on the first turn that
//! finds no open session for the pair inside the inactivity window, collects
//! append-only dialogue turns, and closes on an explicit end call. There is no
//! background closer: an open conversation older than the window is simply
//! ignored by the next lookup.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::{EmbeddingProvider, embed_or_empty};
use crate::error::{EchoesError, Result};
use crate::events::{EventSink, RelationshipEvent, notify};
use crate::store::RelationshipStore;
use crate::types::{ContextSnapshot, ConversationId, DialogueId, Embedding, RelationshipKey, Speaker};

/// One conversation session between a player and an NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Who is talking.
    pub key: RelationshipKey,
    /// When the session opened.
    pub start_time: DateTime<Utc>,
    /// When the session was explicitly closed.
    pub end_time: Option<DateTime<Utc>>,
    /// Game context stamped at creation.
    pub context: ContextSnapshot,
}

impl Conversation {
    /// A fresh open conversation.
    #[must_use]
    pub fn open(key: RelationshipKey, context: ContextSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: ConversationId::new(),
            key,
            start_time: now,
            end_time: None,
            context,
        }
    }

    /// Whether no end time has been stamped yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Whether an open conversation fell out of the inactivity window.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_open() && self.start_time < now - window
    }
}

/// One append-only dialogue turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueEntry {
    /// Turn id.
    pub id: DialogueId,
    /// Conversation the turn belongs to.
    pub conversation: ConversationId,
    /// Who spoke.
    pub speaker: Speaker,
    /// What was said.
    pub message: String,
    /// When it was said.
    pub timestamp: DateTime<Utc>,
    /// Best-effort vector for similarity search; empty when unavailable.
    pub embedding: Embedding,
}

/// Filter for completed-conversation queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationFilter {
    /// Only conversations held at this location.
    #[serde(default)]
    pub location: Option<String>,
    /// Only conversations held in this season.
    #[serde(default)]
    pub season: Option<String>,
    /// Maximum number of conversations, newest first.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for ConversationFilter {
    fn default() -> Self {
        Self {
            location: None,
            season: None,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    10
}

/// Render turns as `Player: ...` / `{npc_name}: ...` lines.
#[must_use]
pub fn render_transcript(entries: &[DialogueEntry], npc_name: &str) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let who = if entry.speaker.is_player() { "Player" } else { npc_name };
        let _ = write!(out, "{who}: {}", entry.message);
    }
    out
}

/// Opens, appends to and closes conversations.
pub struct ConversationManager {
    store: Arc<dyn RelationshipStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    events: Arc<dyn EventSink>,
    window: Duration,
}

impl ConversationManager {
    /// Create a manager with the given inactivity window in minutes.
    #[must_use]
    pub fn new(
        store: Arc<dyn RelationshipStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        events: Arc<dyn EventSink>,
        timeout_minutes: i64,
    ) -> Self {
        Self {
            store,
            embedder,
            events,
            window: Duration::minutes(timeout_minutes.max(0)),
        }
    }

    /// The inactivity window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reuse the open conversation for `key` or open a new one.
    ///
    /// # Errors
    ///
    /// Returns the store error if the lookup or insert failed.
    pub async fn get_or_create_active(
        &self,
        key: RelationshipKey,
        context: ContextSnapshot,
    ) -> Result<Conversation> {
        self.get_or_create_active_at(key, context, Utc::now()).await
    }

    /// [`Self::get_or_create_active`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns the store error if the lookup or insert failed.
    pub async fn get_or_create_active_at(
        &self,
        key: RelationshipKey,
        context: ContextSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let cutoff = now - self.window;
        if let Some(existing) = self.store.latest_open_conversation(key, cutoff).await? {
            debug!(%key, conversation = %existing.id, "Reusing active conversation");
            return Ok(existing);
        }

        let conversation = Conversation::open(key, context, now);
        self.store.insert_conversation(&conversation).await?;
        info!(%key, conversation = %conversation.id, "Opened new conversation");

        notify(
            self.events.as_ref(),
            &RelationshipEvent::ConversationStarted {
                conversation: conversation.id,
                key,
                context: conversation.context.clone(),
            },
        );
        Ok(conversation)
    }

    /// Append a turn, embedding it first when `embed` is set.
    ///
    /// An embedding failure stores the turn without a vector.
    ///
    /// # Errors
    ///
    /// Returns the store error if the turn could not be written.
    pub async fn append_turn(
        &self,
        conversation: ConversationId,
        speaker: Speaker,
        message: &str,
        embed: bool,
    ) -> Result<DialogueEntry> {
        let embedding = if embed {
            embed_or_empty(self.embedder.as_ref(), message).await
        } else {
            Embedding::empty()
        };

        let entry = DialogueEntry {
            id: DialogueId::new(),
            conversation,
            speaker,
            message: message.to_string(),
            timestamp: Utc::now(),
            embedding,
        };
        self.store.insert_dialogue(&entry).await?;
        debug!(
            %conversation,
            speaker = %entry.speaker,
            embedded = !entry.embedding.is_empty(),
            "Appended dialogue turn"
        );

        notify(
            self.events.as_ref(),
            &RelationshipEvent::DialogueAdded {
                conversation,
                speaker: entry.speaker.clone(),
                message: entry.message.clone(),
                embedded: !entry.embedding.is_empty(),
            },
        );
        Ok(entry)
    }

    /// Stamp the end time of an open conversation.
    ///
    /// Returns the closed conversation, or `None` if it was already closed.
    ///
    /// # Errors
    ///
    /// Returns [`EchoesError::NotFound`] for an unknown id, or a store error.
    pub async fn close(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let mut conversation = self
            .store
            .get_conversation(id)
            .await?
            .ok_or_else(|| EchoesError::not_found("conversation", id))?;

        let now = Utc::now();
        if !self.store.close_conversation(id, now).await? {
            debug!(conversation = %id, "Conversation already closed");
            return Ok(None);
        }
        conversation.end_time = Some(now);
        info!(conversation = %id, key = %conversation.key, "Closed conversation");

        notify(
            self.events.as_ref(),
            &RelationshipEvent::ConversationEnded {
                conversation: id,
                key: conversation.key,
            },
        );
        Ok(Some(conversation))
    }

    /// Look up a conversation, open or closed.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        self.store.get_conversation(id).await
    }

    /// Every turn of a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn dialogue(&self, id: ConversationId) -> Result<Vec<DialogueEntry>> {
        self.store.dialogue_for_conversation(id).await
    }

    /// The conversation rendered as `Player:` / `{npc_name}:` lines.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn transcript(&self, id: ConversationId, npc_name: &str) -> Result<String> {
        let entries = self.dialogue(id).await?;
        Ok(render_transcript(&entries, npc_name))
    }

    /// Closed conversations for `key`, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn completed_conversations(
        &self,
        key: RelationshipKey,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>> {
        self.store.completed_conversations(key, filter).await
    }
}
