//! Anthropic Messages API client.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::errors::AgentError;
use crate::llm_provider::{CompletionRequest, LlmProvider, TextStream};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl From<&LlmConfig> for ClaudeConfig {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            api_key: cfg.api_key.clone(),
            api_base: cfg.api_base.clone(),
            timeout: cfg.timeout(),
        }
    }
}

pub struct ClaudeLlmProvider {
    client: Client,
    config: ClaudeConfig,
}

impl ClaudeLlmProvider {
    pub fn new(config: ClaudeConfig) -> Result<Self, AgentError> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::invalid_request("anthropic api key is not configured"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                AgentError::invalid_request(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, config })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, AgentError> {
        let body = ClaudeRequest {
            model: &request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            stream,
            messages: vec![ClaudeMessage {
                role: "user",
                content: vec![ClaudeContent {
                    _type: "text",
                    text: &request.prompt,
                }],
            }],
        };

        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));
        debug!(target: "agent-core", model = %request.model, stream, "claude request");

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::provider(format!("claude request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::provider(format!(
                "claude returned {status}: {text}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for ClaudeLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError> {
        let response: ClaudeResponse = self
            .send(request, false)
            .await?
            .json()
            .await
            .map_err(|err| AgentError::decode(format!("claude response invalid: {err}")))?;

        let content = response
            .content
            .iter()
            .filter_map(|part| part.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(AgentError::decode("claude response missing content"));
        }
        Ok(content)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream, AgentError> {
        let response = self.send(request, true).await?;
        Ok(sse_text_stream(Box::pin(response.bytes_stream())).boxed())
    }
}

/// Turns a server-sent-events byte stream into text deltas.
pub fn sse_text_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String, AgentError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for data in state.decoder.push(chunk.as_ref()) {
                        state.accept(&data);
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(AgentError::provider(format!("claude stream broke: {err}"))));
                }
                None => {
                    state.finished = true;
                    if let Some(data) = state.decoder.finish() {
                        state.accept(&data);
                    }
                }
            }
        }
    })
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, AgentError>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn accept(&mut self, data: &str) {
        match parse_stream_event(data) {
            StreamEvent::Delta(text) => self.pending.push_back(Ok(text)),
            StreamEvent::Stop => self.finished = true,
            StreamEvent::Failed(message) => {
                self.finished = true;
                self.pending.push_back(Err(AgentError::provider(message)));
            }
            StreamEvent::Ignored => {}
        }
    }
}

/// Splits an SSE byte stream into `data:` payloads.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_line(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_line(&rest)
    }
}

fn data_line(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(&['\r', '\n'][..]);
    text.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
        .filter(|data| !data.is_empty())
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Delta(String),
    Stop,
    Failed(String),
    Ignored,
}

fn parse_stream_event(data: &str) -> StreamEvent {
    let Ok(event) = serde_json::from_str::<Value>(data) else {
        warn!(target: "agent-core", %data, "unparseable stream event");
        return StreamEvent::Ignored;
    };
    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => event
            .get("delta")
            .and_then(|delta| delta.get("text"))
            .and_then(Value::as_str)
            .map(|text| StreamEvent::Delta(text.to_string()))
            .unwrap_or(StreamEvent::Ignored),
        Some("message_stop") => StreamEvent::Stop,
        Some("error") => StreamEvent::Failed(
            event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("claude stream reported an error")
                .to_string(),
        ),
        _ => StreamEvent::Ignored,
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: Vec<ClaudeContent<'a>>,
}

#[derive(Debug, Serialize)]
struct ClaudeContent<'a> {
    #[serde(rename = "type")]
    _type: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(default)]
    text: Option<String>,
}
