use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Incremental text produced by a streaming completion.
pub type TextStream = BoxStream<'static, Result<String, AgentError>>;

/// One single-turn completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 1024,
            temperature: 1.0,
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Abstraction over LLM vendors: prompt in, text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError>;

    /// Streams the reply as text deltas. Providers without native streaming
    /// yield the whole completion as a single chunk.
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream, AgentError> {
        let text = self.complete(request).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Deterministic provider used for tests and offline development.
///
/// Replies are served in the order they were queued; every request is kept
/// for inspection. Clones share the queue.
#[derive(Clone, Default)]
pub struct MockLlmProvider {
    replies: Arc<Mutex<VecDeque<Result<String, AgentError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, err: AgentError) {
        lock(&self.replies).push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    fn next_reply(&self, request: &CompletionRequest) -> Result<String, AgentError> {
        lock(&self.requests).push(request.clone());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::provider("mock provider has no scripted reply")))
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError> {
        self.next_reply(request)
    }

    /// Splits the scripted reply into whitespace-delimited chunks.
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream, AgentError> {
        let text = self.next_reply(request)?;
        let chunks: Vec<Result<String, AgentError>> = text
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
