//! Relationship service: the one object a transport layer talks to.
//!
//! Wraps every core component behind name-based calls. Dialogue turns never
//! fail: when entity resolution or persistence is unavailable the turn comes
//! back flagged `degraded` with context-free defaults.

use std::sync::Arc;

use echoes_core::conversation::{ConversationFilter, ConversationManager, DialogueEntry};
use echoes_core::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use echoes_core::emotion::{EmotionalState, EmotionalStateMachine, Tone};
use echoes_core::entity::EntityRegistry;
use echoes_core::events::{EventSink, NullSink};
use echoes_core::memory::{EpisodicMemory, LearnedPreference, MemoryRecorder};
use echoes_core::personality::{PersonalityProfile, PersonalityStore, RelationshipInsight};
use echoes_core::retrieval::{RelevanceEngine, ScoredMemory, format_memories};
use echoes_core::scoring::utterance_points;
use echoes_core::{
    ContextSnapshot, ConversationId, EchoesConfig, EchoesError, NpcCatalog, RelationshipKey, RelationshipStore, Speaker,
    SqliteStore,
};
use echoes_llm::TextCompletion;
use echoes_llm::prompt::PromptEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisJob, AnalysisOrchestrator, AnalysisOutcome, OrchestratorParts};
use crate::background::AnalysisQueue;
use crate::error::{Result, ServiceError};
use crate::gifts::{GiftOutcome, GiftRequest, GiftResolver};
use crate::mood::MoodUpdater;
use crate::oracle::{LlmEmbeddingProvider, client_from_config};

const DEGRADED_MOOD: &str = "You are in a normal, balanced mood. Nothing particular is affecting your emotions.";

/// One player utterance as sent by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Player display name.
    pub player_name: String,
    /// NPC being addressed.
    pub npc_name: String,
    /// Where the NPC is standing.
    #[serde(default)]
    pub npc_location: Option<String>,
    /// What the player said.
    pub message: String,
    /// In-game context, stamped on a newly opened conversation.
    #[serde(default)]
    pub context: ContextSnapshot,
}

/// Everything the dialogue prompt needs for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    /// The conversation the turn was appended to.
    pub conversation: Option<ConversationId>,
    /// The resolved relationship.
    pub key: Option<RelationshipKey>,
    /// The NPC's perception of the player.
    pub profile: Option<PersonalityProfile>,
    /// Score, level and narrative.
    pub insight: RelationshipInsight,
    /// Mood description for the prompt.
    pub mood_context: String,
    /// Recalled past dialogue.
    pub memories: Vec<ScoredMemory>,
    /// `memories` rendered as prompt lines.
    pub memory_context: String,
    /// Friendship points for this utterance.
    pub friendship_delta: i32,
    /// Set when any part of the context fell back to defaults.
    pub degraded: bool,
}

impl TurnContext {
    fn degraded(turn: &TurnRequest, friendship_delta: i32) -> Self {
        Self {
            conversation: None,
            key: None,
            profile: None,
            insight: RelationshipInsight::unavailable(&turn.player_name, &turn.npc_name),
            mood_context: DEGRADED_MOOD.to_string(),
            memories: Vec::new(),
            memory_context: String::new(),
            friendship_delta,
            degraded: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`RelationshipService`], defaulting every unset dependency
/// from the configuration.
pub struct ServiceBuilder {
    config: EchoesConfig,
    store: Option<Arc<dyn RelationshipStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    completion: Option<Arc<dyn TextCompletion>>,
    events: Option<Arc<dyn EventSink>>,
    catalog: Option<Arc<NpcCatalog>>,
    prompts: Option<PromptEngine>,
}

impl ServiceBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: EchoesConfig) -> Self {
        Self {
            config,
            store: None,
            embedder: None,
            completion: None,
            events: None,
            catalog: None,
            prompts: None,
        }
    }

    /// Use this store instead of opening `persistence.path`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RelationshipStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this embedding oracle.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use this completion oracle.
    #[must_use]
    pub fn completion(mut self, completion: Arc<dyn TextCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Deliver change events here.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Use this NPC catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: Arc<NpcCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use these prompt templates.
    #[must_use]
    pub fn prompts(mut self, prompts: PromptEngine) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Build the service and start the analysis workers.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog, the database or the LLM client cannot
    /// be set up from the configuration.
    pub fn build(self) -> Result<RelationshipService> {
        let config = self.config;
        config.retrieval.weights.validate()?;

        let catalog = match self.catalog {
            Some(c) => c,
            None => Arc::new(NpcCatalog::load(config.general.npc_catalog_path.as_deref())?),
        };
        let store: Arc<dyn RelationshipStore> = match self.store {
            Some(s) => s,
            None => {
                let sqlite = SqliteStore::from_config(&config.persistence)?;
                if let Err(e) = sqlite.create_rotating_backup() {
                    warn!(error = %e, "Startup backup failed, continuing");
                }
                Arc::new(sqlite)
            }
        };

        let client = if self.completion.is_none() || self.embedder.is_none() {
            Some(Arc::new(client_from_config(&config.llm)?))
        } else {
            None
        };
        let embedder: Arc<dyn EmbeddingProvider> = match (self.embedder, &client) {
            (Some(e), _) => e,
            (None, Some(client)) if client.is_available() => Arc::new(LlmEmbeddingProvider::new(
                Arc::clone(client),
                config.llm.embedding_model.clone(),
                config.retrieval.embedding_dimensions,
            )),
            (None, _) => Arc::new(HashingEmbeddingProvider::new(config.retrieval.embedding_dimensions)),
        };
        let completion: Arc<dyn TextCompletion> = match (self.completion, client) {
            (Some(c), _) => c,
            (None, Some(client)) => client,
            (None, None) => Arc::new(echoes_llm::LlmClient::none()),
        };
        let events = self.events.unwrap_or_else(|| Arc::new(NullSink));
        let prompts = Arc::new(self.prompts.unwrap_or_default());

        let conversations = Arc::new(ConversationManager::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&events),
            config.conversation.timeout_minutes,
        ));
        let emotions = Arc::new(EmotionalStateMachine::new(Arc::clone(&store), Arc::clone(&events)));
        let personalities = Arc::new(PersonalityStore::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&events),
        ));
        let memories = Arc::new(MemoryRecorder::new(Arc::clone(&store), Arc::clone(&embedder)));
        let relevance = Arc::new(RelevanceEngine::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.retrieval.clone(),
        ));

        let analysis = Arc::new(AnalysisOrchestrator::new(
            OrchestratorParts {
                conversations: Arc::clone(&conversations),
                emotions: Arc::clone(&emotions),
                personalities: Arc::clone(&personalities),
                memories: Arc::clone(&memories),
                relevance: Arc::clone(&relevance),
                completion: Arc::clone(&completion),
                prompts: Arc::clone(&prompts),
                events,
            },
            config.analysis.clone(),
        ));
        let queue = AnalysisQueue::start(Arc::clone(&analysis), &config.analysis);

        info!(
            enabled = config.general.enabled,
            npcs = catalog.len(),
            embedder = embedder.model_name(),
            "Relationship service ready"
        );
        Ok(RelationshipService {
            enabled: config.general.enabled,
            registry: EntityRegistry::new(Arc::clone(&store), config.registry.cache_size),
            gifts: GiftResolver::new(Arc::clone(&catalog), Arc::clone(&completion), Arc::clone(&prompts)),
            mood: MoodUpdater::new(Arc::clone(&emotions), completion, prompts),
            catalog,
            conversations,
            emotions,
            personalities,
            memories,
            relevance,
            analysis,
            queue,
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Name-based facade over the relationship engine.
pub struct RelationshipService {
    enabled: bool,
    catalog: Arc<NpcCatalog>,
    registry: EntityRegistry,
    conversations: Arc<ConversationManager>,
    emotions: Arc<EmotionalStateMachine>,
    personalities: Arc<PersonalityStore>,
    memories: Arc<MemoryRecorder>,
    relevance: Arc<RelevanceEngine>,
    gifts: GiftResolver,
    mood: MoodUpdater,
    analysis: Arc<AnalysisOrchestrator>,
    queue: AnalysisQueue,
}

impl RelationshipService {
    /// Start building a service from `config`.
    #[must_use]
    pub fn builder(config: EchoesConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    /// The NPC catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &NpcCatalog {
        &self.catalog
    }

    async fn resolve(&self, player_name: &str, npc_name: &str, location: Option<&str>) -> Result<RelationshipKey> {
        let player = self
            .registry
            .get_or_create_player(player_name)
            .await
            .ok_or_else(|| ServiceError::UnknownEntity {
                kind: "player",
                name: player_name.to_string(),
            })?;
        let npc = self
            .registry
            .get_or_create_npc(npc_name, location)
            .await
            .ok_or_else(|| ServiceError::UnknownEntity {
                kind: "npc",
                name: npc_name.to_string(),
            })?;
        Ok(RelationshipKey::new(player, npc))
    }

    // ------------------------------------------------------------------
    // Dialogue
    // ------------------------------------------------------------------

    /// Record a player utterance and assemble the context for the NPC's reply.
    pub async fn handle_turn(&self, turn: &TurnRequest) -> TurnContext {
        let multiplier = self.catalog.npc_multiplier(&turn.npc_name);
        if !self.enabled {
            return TurnContext::degraded(turn, utterance_points(&turn.message, None, multiplier));
        }

        let key = match self
            .resolve(&turn.player_name, &turn.npc_name, turn.npc_location.as_deref())
            .await
        {
            Ok(key) => key,
            Err(e) => {
                warn!(player = %turn.player_name, npc = %turn.npc_name, error = %e, "Entity resolution failed, degrading turn");
                return TurnContext::degraded(turn, utterance_points(&turn.message, None, multiplier));
            }
        };

        let conversation = match self
            .conversations
            .get_or_create_active(key, turn.context.clone())
            .await
        {
            Ok(c) => Some(c.id),
            Err(e) => {
                warn!(%key, error = %e, "No conversation available for this turn");
                None
            }
        };

        let profile = self.personalities.get_or_create(key, &turn.npc_name).await;
        let state = self.emotions.get_or_create(key).await;
        let friendship_delta = utterance_points(&turn.message, Some(&profile), multiplier);

        // recall before appending so the utterance does not find itself
        let memories = if turn.message.trim().is_empty() {
            Vec::new()
        } else {
            self.relevance.search(key, &turn.message).await
        };

        let mut degraded = conversation.is_none();
        if let Some(id) = conversation.filter(|_| !turn.message.trim().is_empty()) {
            if let Err(e) = self
                .conversations
                .append_turn(id, Speaker::Player, &turn.message, true)
                .await
            {
                warn!(%key, conversation = %id, error = %e, "Player turn not recorded");
                degraded = true;
            }
        }

        let insight = RelationshipInsight::generate(
            &profile,
            &turn.player_name,
            &turn.npc_name,
            Some((state.current_mood, state.mood_intensity)),
        );
        debug!(
            %key,
            friendship_delta,
            recalled = memories.len(),
            level = insight.level.label(),
            "Turn context assembled"
        );

        TurnContext {
            conversation,
            key: Some(key),
            profile: Some(profile),
            insight,
            mood_context: state.mood_context(),
            memory_context: format_memories(&memories, &turn.npc_name),
            memories,
            friendship_delta,
            degraded,
        }
    }

    /// Append the NPC's reply to the conversation.
    ///
    /// # Errors
    ///
    /// Returns the store error if the turn could not be written.
    pub async fn record_npc_reply(
        &self,
        conversation: ConversationId,
        npc_name: &str,
        message: &str,
    ) -> Result<DialogueEntry> {
        Ok(self
            .conversations
            .append_turn(conversation, Speaker::Npc(npc_name.to_string()), message, true)
            .await?)
    }

    /// Close the conversation and queue its analysis.
    ///
    /// Returns `true` when a job was queued; `false` when the conversation was
    /// already closed or the queue was full.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown conversation or when its participants
    /// cannot be looked up.
    pub async fn end_conversation(&self, conversation: ConversationId) -> Result<bool> {
        let Some(closed) = self.conversations.close(conversation).await? else {
            return Ok(false);
        };
        let job = self.job_for(conversation, closed.key).await?;
        Ok(self.queue.enqueue(job))
    }

    /// Run the analysis for a conversation inline and wait for the result.
    ///
    /// # Errors
    ///
    /// Returns whatever aborted the run; nothing is written in that case.
    pub async fn analyze_conversation(&self, conversation: ConversationId) -> Result<AnalysisOutcome> {
        let record = self
            .conversations
            .get(conversation)
            .await?
            .ok_or_else(|| EchoesError::not_found("conversation", conversation))?;
        let job = self.job_for(conversation, record.key).await?;
        self.analysis.run(&job).await
    }

    async fn job_for(&self, conversation: ConversationId, key: RelationshipKey) -> Result<AnalysisJob> {
        let player = self
            .registry
            .player(key.player)
            .await?
            .ok_or_else(|| ServiceError::UnknownEntity {
                kind: "player",
                name: key.player.to_string(),
            })?;
        let npc = self
            .registry
            .npc(key.npc)
            .await?
            .ok_or_else(|| ServiceError::UnknownEntity {
                kind: "npc",
                name: key.npc.to_string(),
            })?;
        Ok(AnalysisJob {
            conversation,
            key,
            player_name: player.name,
            npc_name: npc.name,
        })
    }

    /// Per-turn mood update, for hosts that want it before the conversation ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the entities cannot be resolved or the new state
    /// cannot be written.
    pub async fn update_mood(
        &self,
        player_name: &str,
        npc_name: &str,
        transcript: &str,
        tone: Tone,
    ) -> Result<EmotionalState> {
        let key = self.resolve(player_name, npc_name, None).await?;
        self.mood
            .update_from_interaction(key, npc_name, player_name, transcript, tone)
            .await
    }

    // ------------------------------------------------------------------
    // Gifts & insight
    // ------------------------------------------------------------------

    /// Score a gift. Never fails; unknown items resolve to `neutral`.
    pub async fn give_gift(&self, gift: &GiftRequest) -> GiftOutcome {
        self.gifts.score(gift).await
    }

    /// Current relationship insight, or the neutral default when unavailable.
    pub async fn relationship_insight(&self, player_name: &str, npc_name: &str) -> RelationshipInsight {
        let key = match self.resolve(player_name, npc_name, None).await {
            Ok(key) => key,
            Err(e) => {
                warn!(player = player_name, npc = npc_name, error = %e, "Insight unavailable");
                return RelationshipInsight::unavailable(player_name, npc_name);
            }
        };
        let profile = self.personalities.get_or_create(key, npc_name).await;
        let state = self.emotions.get_or_create(key).await;
        RelationshipInsight::generate(
            &profile,
            player_name,
            npc_name,
            Some((state.current_mood, state.mood_intensity)),
        )
    }

    // ------------------------------------------------------------------
    // History & administration
    // ------------------------------------------------------------------

    /// Closed conversations between the pair, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the entities cannot be resolved or the store fails.
    pub async fn completed_conversations(
        &self,
        player_name: &str,
        npc_name: &str,
        filter: &ConversationFilter,
    ) -> Result<Vec<echoes_core::conversation::Conversation>> {
        let key = self.resolve(player_name, npc_name, None).await?;
        Ok(self.conversations.completed_conversations(key, filter).await?)
    }

    /// A conversation rendered as `Player:` / `{npc_name}:` lines.
    ///
    /// # Errors
    ///
    /// Returns the store error on failure.
    pub async fn transcript(&self, conversation: ConversationId, npc_name: &str) -> Result<String> {
        Ok(self.conversations.transcript(conversation, npc_name).await?)
    }

    /// Episodic memories the NPC holds about the player, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the entities cannot be resolved or the store fails.
    pub async fn episodic_memories(
        &self,
        player_name: &str,
        npc_name: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>> {
        let key = self.resolve(player_name, npc_name, None).await?;
        Ok(self.memories.episodic_memories(key, limit).await?)
    }

    /// What the NPC has learned the player likes and dislikes.
    ///
    /// # Errors
    ///
    /// Returns an error if the entities cannot be resolved or the store fails.
    pub async fn preferences(&self, player_name: &str, npc_name: &str) -> Result<Vec<LearnedPreference>> {
        let key = self.resolve(player_name, npc_name, None).await?;
        Ok(self.memories.preferences(key).await?)
    }

    /// Forget the pair's mood and perception. Both re-seed on next access.
    ///
    /// Returns `true` when anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the entities cannot be resolved or a delete fails.
    pub async fn reset_relationship(&self, player_name: &str, npc_name: &str) -> Result<bool> {
        let key = self.resolve(player_name, npc_name, None).await?;
        let mood = self.emotions.reset(key).await?;
        let profile = self.personalities.reset(key).await?;
        info!(%key, mood, profile, "Relationship reset");
        Ok(mood || profile)
    }

    /// Stop the analysis workers after they drain the queue.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}
