//! In-process transports for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::{Notify, Semaphore};

use super::{AiError, GenerateRequest, Transport};

/// Always fails, as if the service were unreachable
#[derive(Default)]
pub(crate) struct FailingTransport {
    calls: AtomicUsize,
}

impl FailingTransport {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for FailingTransport {
    async fn generate(&self, _request: GenerateRequest) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AiError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

/// Replays canned replies in order and records every request.
/// Once the script runs out each call fails with `EmptyResponse`.
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One reply per entry, each holding a single plan with the given thought
    pub(crate) fn single_plans<I, S>(thoughts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            thoughts
                .into_iter()
                .map(|thought| Ok(plan_json(thought.as_ref())))
                .collect(),
        )
    }

    pub(crate) fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse))
    }
}

/// Holds every call until the test releases it
pub(crate) struct GatedTransport {
    calls: AtomicUsize,
    entered: Notify,
    release: Semaphore,
    reply: String,
}

impl GatedTransport {
    pub(crate) fn new(reply: impl Into<String>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Semaphore::new(0),
            reply: reply.into(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once a call has reached the transport
    pub(crate) async fn entered(&self) {
        self.entered.notified().await
    }

    pub(crate) fn release_one(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait::async_trait]
impl Transport for GatedTransport {
    async fn generate(&self, _request: GenerateRequest) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        Ok(self.reply.clone())
    }
}

pub(crate) fn plan_json(thought: &str) -> String {
    serde_json::json!({
        "plans": [{"thought": thought, "action": "act", "timestamp": "12:00:00"}]
    })
    .to_string()
}
