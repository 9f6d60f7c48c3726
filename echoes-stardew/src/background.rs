//! Bounded in-process queue feeding the analysis orchestrator.
//!
//! Delivery is at-most-once: a full queue drops the new job, and anything
//! still queued when the process exits is lost.

use std::sync::Arc;

use echoes_core::config::AnalysisConfig;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisJob, AnalysisOrchestrator};

/// Handle for submitting analysis jobs to the worker pool.
pub struct AnalysisQueue {
    sender: mpsc::Sender<AnalysisJob>,
    capacity: usize,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for AnalysisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisQueue")
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl AnalysisQueue {
    /// Start `config.workers` workers (at least one) behind a queue of
    /// `config.queue_capacity` jobs.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(orchestrator: Arc<AnalysisOrchestrator>, config: &AnalysisConfig) -> Self {
        Self::spawn(orchestrator, config.queue_capacity.max(1), config.workers.max(1))
    }

    fn spawn(orchestrator: Arc<AnalysisOrchestrator>, capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<AnalysisJob>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(job) = next else { break };
                        debug!(worker, conversation = %job.conversation, "Analysis job picked up");
                        if let Err(e) = orchestrator.run(&job).await {
                            error!(worker, conversation = %job.conversation, error = %e, "Analysis job failed");
                        }
                    }
                    debug!(worker, "Analysis worker stopped");
                })
            })
            .collect::<Vec<_>>();
        info!(capacity, workers = workers.len(), "Analysis queue started");
        Self {
            sender,
            capacity,
            workers,
        }
    }

    /// Submit a job without waiting. Returns `false` when it was dropped.
    pub fn enqueue(&self, job: AnalysisJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    conversation = %job.conversation,
                    capacity = self.capacity,
                    "Analysis queue full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!(conversation = %job.conversation, "Analysis queue closed, dropping job");
                false
            }
        }
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// Stop accepting jobs and wait until the workers have drained the queue.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Analysis worker panicked");
            }
        }
        info!("Analysis queue drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::OrchestratorParts;
    use echoes_core::config::RetrievalConfig;
    use echoes_core::conversation::ConversationManager;
    use echoes_core::embedding::HashingEmbeddingProvider;
    use echoes_core::emotion::EmotionalStateMachine;
    use echoes_core::events::RecordingSink;
    use echoes_core::memory::MemoryRecorder;
    use echoes_core::personality::PersonalityStore;
    use echoes_core::retrieval::RelevanceEngine;
    use echoes_core::{ConversationId, NpcCatalog, NpcId, PlayerId, RelationshipKey, SqliteStore};
    use echoes_llm::ScriptedCompletion;
    use echoes_llm::prompt::PromptEngine;

    fn orchestrator(events: Arc<RecordingSink>) -> Arc<AnalysisOrchestrator> {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let embedder = Arc::new(HashingEmbeddingProvider::new(32));
        let catalog = Arc::new(NpcCatalog::builtin().expect("catalog"));
        Arc::new(AnalysisOrchestrator::new(
            OrchestratorParts {
                conversations: Arc::new(ConversationManager::new(
                    store.clone(),
                    embedder.clone(),
                    events.clone(),
                    5,
                )),
                emotions: Arc::new(EmotionalStateMachine::new(store.clone(), events.clone())),
                personalities: Arc::new(PersonalityStore::new(store.clone(), catalog, events.clone())),
                memories: Arc::new(MemoryRecorder::new(store.clone(), embedder.clone())),
                relevance: Arc::new(RelevanceEngine::new(store, embedder, RetrievalConfig::default())),
                completion: Arc::new(ScriptedCompletion::always("{}")),
                prompts: Arc::new(PromptEngine::builtin()),
                events,
            },
            AnalysisConfig::default(),
        ))
    }

    fn job() -> AnalysisJob {
        AnalysisJob {
            conversation: ConversationId::new(),
            key: RelationshipKey::new(PlayerId::new(), NpcId::new()),
            player_name: "Ash".into(),
            npc_name: "Abigail".into(),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_new_jobs() {
        let queue = AnalysisQueue::spawn(orchestrator(Arc::new(RecordingSink::new())), 1, 0);
        assert!(queue.enqueue(job()));
        assert_eq!(queue.pending(), 1);
        assert!(!queue.enqueue(job()));
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn failed_jobs_do_not_stop_the_workers() {
        let events = Arc::new(RecordingSink::new());
        let queue = AnalysisQueue::start(orchestrator(events.clone()), &AnalysisConfig::default());
        // neither conversation exists, so each run fails before writing
        assert!(queue.enqueue(job()));
        assert!(queue.enqueue(job()));
        queue.shutdown().await;
        assert!(events.events().is_empty());
    }
}
