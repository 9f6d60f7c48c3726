//! Unified post-conversation analysis.
//!
//! One analysis-model call per closed conversation. The reply is a single JSON
//! object covering sentiment, new memories, learned preferences, the new mood
//! and the revised perception of the player. It is parsed and validated in
//! full before anything is written: a reply that fails to parse, or that names
//! an unknown mood or trait, aborts the run with no writes. Once validated,
//! each section is applied on its own and a failed write only skips that
//! section.

use std::fmt::Write as _;
use std::sync::Arc;

use echoes_core::config::AnalysisConfig;
use echoes_core::conversation::ConversationManager;
use echoes_core::emotion::{EmotionDelta, EmotionalStateMachine, EmotionalUpdate, Mood};
use echoes_core::events::{EventSink, RelationshipEvent, notify};
use echoes_core::memory::{EpisodeDraft, MemoryRecorder, PreferenceDraft};
use echoes_core::personality::{PersonalityStore, PersonalityUpdate, Trait};
use echoes_core::retrieval::{RelevanceEngine, format_memories};
use echoes_core::scoring::conversation_points;
use echoes_core::{ConversationId, RelationshipKey};
use echoes_llm::parse::parse_structured;
use echoes_llm::prompt::{PromptEngine, PromptId};
use echoes_llm::types::{EmotionalStateChange, MemoryConsolidation, PersonalityChange};
use echoes_llm::{TextCompletion, UnifiedAnalysis};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};

const NO_MEMORIES: &str = "No specific long-term memories stand out right now.";

/// One queued analysis: which conversation, and who was in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisJob {
    /// The closed conversation.
    pub conversation: ConversationId,
    /// The relationship it belongs to.
    pub key: RelationshipKey,
    /// Player display name, for the prompt.
    pub player_name: String,
    /// NPC name, for the prompt and archetype lookups.
    pub npc_name: String,
}

/// What a finished run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    /// Episodic memories stored.
    pub memories: usize,
    /// Preferences upserted.
    pub preferences: usize,
    /// Whether the emotional state was replaced.
    pub mood_updated: bool,
    /// Whether the personality profile was replaced.
    pub personality_updated: bool,
    /// Friendship points for the conversation as a whole.
    pub friendship_delta: i32,
}

// ---------------------------------------------------------------------------
// Validated plan
// ---------------------------------------------------------------------------

/// A reply converted into core types. Building it is the validation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisPlan {
    /// Sentiment of the player's final message, -1..1.
    pub sentiment: Option<f32>,
    /// Memories to record.
    pub episodes: Vec<EpisodeDraft>,
    /// Preferences to upsert.
    pub preferences: Vec<PreferenceDraft>,
    /// Mood transition.
    pub emotion: Option<EmotionalUpdate>,
    /// Perception changes.
    pub personality: Option<PersonalityUpdate>,
}

impl AnalysisPlan {
    /// Validate a parsed reply.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidAnalysis`] for an unknown mood label or
    /// trait name.
    pub fn from_analysis(analysis: UnifiedAnalysis) -> Result<Self> {
        let (episodes, preferences) = analysis
            .memory_consolidation
            .map(consolidation_drafts)
            .unwrap_or_default();
        Ok(Self {
            sentiment: analysis.final_player_sentiment.map(|s| s.score),
            episodes,
            preferences,
            emotion: analysis.emotional_state_update.map(emotional_update).transpose()?,
            personality: analysis
                .personality_profile_update
                .map(personality_update)
                .transpose()?,
        })
    }
}

fn consolidation_drafts(c: MemoryConsolidation) -> (Vec<EpisodeDraft>, Vec<PreferenceDraft>) {
    let episodes = c
        .episodic_memories
        .into_iter()
        .filter(|m| !m.title.trim().is_empty())
        .map(|m| EpisodeDraft {
            title: m.title,
            description: m.description,
            emotional_impact: m.emotional_impact,
            importance: m.importance,
            memory_type: m.memory_type,
        })
        .collect();
    let preferences = c
        .learned_preferences
        .into_iter()
        .filter(|p| !p.item.trim().is_empty())
        .map(|p| PreferenceDraft {
            category: p.category,
            item: p.item,
            preference_level: p.preference_level,
            evidence: p.evidence,
        })
        .collect();
    (episodes, preferences)
}

fn emotional_update(change: EmotionalStateChange) -> Result<EmotionalUpdate> {
    let mood: Mood = change.new_mood.parse().map_err(ServiceError::InvalidAnalysis)?;
    Ok(EmotionalUpdate {
        mood,
        intensity: change.new_mood_intensity,
        reason: change.mood_reason,
        interaction_summary: change.interaction_summary,
        delta: EmotionDelta {
            joy: change.joy_delta.unwrap_or(0.0),
            sadness: change.sadness_delta.unwrap_or(0.0),
            anger: change.anger_delta.unwrap_or(0.0),
            anxiety: change.anxiety_delta.unwrap_or(0.0),
            excitement: change.excitement_delta.unwrap_or(0.0),
        },
    })
}

fn personality_update(change: PersonalityChange) -> Result<PersonalityUpdate> {
    let mut update = PersonalityUpdate::default();
    if let Some(summary) = change.new_summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        update = update.with_summary(summary);
    }
    for (name, value) in change.trait_values() {
        let t: Trait = name.parse().map_err(ServiceError::InvalidAnalysis)?;
        update = update.with_trait(t, value);
    }
    Ok(update)
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the unified analysis for closed conversations.
pub struct AnalysisOrchestrator {
    conversations: Arc<ConversationManager>,
    emotions: Arc<EmotionalStateMachine>,
    personalities: Arc<PersonalityStore>,
    memories: Arc<MemoryRecorder>,
    relevance: Arc<RelevanceEngine>,
    completion: Arc<dyn TextCompletion>,
    prompts: Arc<PromptEngine>,
    events: Arc<dyn EventSink>,
    config: AnalysisConfig,
}

/// Shared handles the orchestrator works through.
pub struct OrchestratorParts {
    /// Transcript source.
    pub conversations: Arc<ConversationManager>,
    /// Mood writes.
    pub emotions: Arc<EmotionalStateMachine>,
    /// Perception writes.
    pub personalities: Arc<PersonalityStore>,
    /// Memory and preference writes.
    pub memories: Arc<MemoryRecorder>,
    /// Long-term memory probe.
    pub relevance: Arc<RelevanceEngine>,
    /// The analysis model.
    pub completion: Arc<dyn TextCompletion>,
    /// Prompt templates.
    pub prompts: Arc<PromptEngine>,
    /// Where `AnalysisComplete` goes.
    pub events: Arc<dyn EventSink>,
}

impl AnalysisOrchestrator {
    /// Assemble the orchestrator.
    #[must_use]
    pub fn new(parts: OrchestratorParts, config: AnalysisConfig) -> Self {
        Self {
            conversations: parts.conversations,
            emotions: parts.emotions,
            personalities: parts.personalities,
            memories: parts.memories,
            relevance: parts.relevance,
            completion: parts.completion,
            prompts: parts.prompts,
            events: parts.events,
            config,
        }
    }

    /// Analyse one conversation and apply the result.
    ///
    /// # Errors
    ///
    /// Fails without writing anything when the transcript is empty or cannot
    /// be read, the model call fails, or the reply does not validate.
    pub async fn run(&self, job: &AnalysisJob) -> Result<AnalysisOutcome> {
        let key = job.key;
        let request = self.build_request(job).await?;

        let reply = self.completion.complete(&request).await.map_err(|e| {
            warn!(conversation = %job.conversation, error = %e, "Analysis model call failed");
            e
        })?;

        let plan = match parse_structured::<UnifiedAnalysis>(&reply)
            .map_err(ServiceError::from)
            .and_then(AnalysisPlan::from_analysis)
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(conversation = %job.conversation, error = %e, "Discarding unusable analysis reply");
                return Err(e);
            }
        };

        let outcome = self.apply(job, plan).await;
        info!(
            conversation = %job.conversation,
            %key,
            memories = outcome.memories,
            preferences = outcome.preferences,
            mood_updated = outcome.mood_updated,
            personality_updated = outcome.personality_updated,
            friendship_delta = outcome.friendship_delta,
            "Conversation analysis applied"
        );
        notify(
            self.events.as_ref(),
            &RelationshipEvent::AnalysisComplete {
                conversation: job.conversation,
                key,
                memories: outcome.memories,
                preferences: outcome.preferences,
                friendship_delta: outcome.friendship_delta,
            },
        );
        Ok(outcome)
    }

    async fn build_request(&self, job: &AnalysisJob) -> Result<echoes_llm::LlmRequest> {
        let transcript = self.conversations.transcript(job.conversation, &job.npc_name).await?;
        if transcript.trim().is_empty() {
            return Err(ServiceError::EmptyConversation(job.conversation));
        }

        let profile = self.personalities.get_or_create(job.key, &job.npc_name).await;
        let state = self.emotions.get_or_create(job.key).await;

        let recalled = self
            .relevance
            .search_relevant_memories(
                job.key,
                &self.relevance.config().analysis_probe,
                self.config.memories_for_analysis,
                self.relevance.config().weights,
            )
            .await;
        let memories = if recalled.is_empty() {
            NO_MEMORIES.to_string()
        } else {
            format_memories(&recalled, &job.npc_name)
        };

        let mut traits = String::new();
        for t in Trait::ALL {
            let _ = writeln!(traits, "- {}: {:.1}/10", t.label(), profile.get(t));
        }
        let intensity = format!("{:.1}", state.mood_intensity);
        let valid_moods = Mood::label_list();
        debug!(
            conversation = %job.conversation,
            recalled = recalled.len(),
            transcript_chars = transcript.len(),
            "Building analysis prompt"
        );

        Ok(self.prompts.request(
            PromptId::UnifiedAnalysis,
            &[
                ("npc_name", job.npc_name.as_str()),
                ("player_name", job.player_name.as_str()),
                ("current_mood", state.current_mood.as_str()),
                ("mood_intensity", intensity.as_str()),
                ("summary", profile.summary.as_str()),
                ("traits", traits.trim_end()),
                ("memories", memories.as_str()),
                ("transcript", transcript.as_str()),
                ("valid_moods", valid_moods.as_str()),
            ],
        )?
        .with_timeout(self.config.timeout_ms))
    }

    async fn apply(&self, job: &AnalysisJob, plan: AnalysisPlan) -> AnalysisOutcome {
        let key = job.key;
        let mut outcome = AnalysisOutcome {
            memories: self
                .memories
                .record_episodes(key, job.conversation, &plan.episodes)
                .await,
            preferences: self.memories.record_preferences(key, &plan.preferences).await,
            ..AnalysisOutcome::default()
        };

        if let Some(update) = &plan.emotion {
            match self.emotions.apply(key, update).await {
                Ok(_) => outcome.mood_updated = true,
                Err(e) => warn!(%key, error = %e, "Skipping emotional state update"),
            }
        }

        if let Some(update) = &plan.personality {
            match self.personalities.apply_update(key, &job.npc_name, update).await {
                Ok(_) => outcome.personality_updated = !update.is_empty(),
                Err(e) => warn!(%key, error = %e, "Skipping personality update"),
            }
        }

        outcome.friendship_delta = plan
            .sentiment
            .map_or(0, |score| conversation_points(score, self.config.sentiment_point_scale));
        outcome
    }
}
