use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::interfaces::LlmClient;
use crate::domain::DomainError;

/// Scripted model for tests and offline demos. Replies are served in
/// order and the last one repeats; every call is counted.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn single(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, DomainError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        responses
            .get(call)
            .or_else(|| responses.last())
            .cloned()
            .ok_or_else(|| DomainError::provider("mock has no scripted responses"))
    }

    fn model_id(&self) -> &str {
        "mock-llm"
    }
}
