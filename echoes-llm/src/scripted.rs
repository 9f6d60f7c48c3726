//! Scripted completion oracle for tests, benches and offline hosts.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::TextCompletion;
use crate::error::LlmError;
use crate::types::LlmRequest;

/// Replays canned replies in order and records every prompt it was given.
///
/// Once the script runs out every call fails with [`LlmError::Unavailable`],
/// unless a repeating reply was set with [`ScriptedCompletion::always`].
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<LlmRequest>>,
}

impl ScriptedCompletion {
    /// A script that answers with `replies` in order.
    #[must_use]
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// A script that answers every call with `reply`.
    #[must_use]
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Queue a failing call.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Err(message.into()));
    }

    /// Queue a reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Ok(reply.into()));
    }

    /// Every request received so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<LlmRequest> {
        self.prompts.lock().clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.prompts.lock().push(request.clone());
        let next = self.replies.lock().pop_front();
        match (next, &self.fallback) {
            (Some(Ok(reply)), _) => Ok(reply),
            (Some(Err(message)), _) => Err(LlmError::RequestFailed(message)),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(LlmError::Unavailable("script exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_runs_dry() {
        let script = ScriptedCompletion::new(["one", "two"]);
        script.push_failure("boom");
        let req = LlmRequest::fast("", "q");
        assert_eq!(script.complete(&req).await.expect("one"), "one");
        assert_eq!(script.complete(&req).await.expect("two"), "two");
        assert!(matches!(script.complete(&req).await, Err(LlmError::RequestFailed(_))));
        assert!(matches!(script.complete(&req).await, Err(LlmError::Unavailable(_))));
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test]
    async fn always_repeats() {
        let script = ScriptedCompletion::always("{}");
        let req = LlmRequest::analysis("q");
        for _ in 0..3 {
            assert_eq!(script.complete(&req).await.expect("reply"), "{}");
        }
        assert_eq!(script.prompts()[0].user, "q");
    }
}
