//! Writing assistant, auto-complete and control-to-citation mapping.

use std::sync::Arc;

use grc_core_types::{Citation, Control};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::errors::AgentError;
use crate::llm_provider::{CompletionRequest, LlmProvider, TextStream};
use crate::prompt::PromptBuilder;
use crate::utils::{extract_json_object, parse_folded};

#[derive(Debug, Default, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    completion: String,
}

#[derive(Debug, Default, Deserialize)]
struct MappingReply {
    #[serde(default)]
    mappings: Option<Vec<i64>>,
}

pub struct WritingAssistant {
    provider: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    config: LlmConfig,
}

impl WritingAssistant {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            provider,
            prompt: PromptBuilder::new(),
            config,
        }
    }

    /// Streams an HTML draft for `prompt`, building on `existing_content`.
    pub async fn write(
        &self,
        prompt: &str,
        existing_content: &str,
    ) -> Result<TextStream, AgentError> {
        if prompt.trim().is_empty() {
            return Err(AgentError::invalid_request("writing prompt cannot be empty"));
        }
        let request = CompletionRequest::new(
            &self.config.write_model,
            self.prompt.writing_assistant(prompt, existing_content),
        )
        .with_temperature(1.0)
        .with_max_tokens(self.config.max_tokens);
        self.provider.stream(&request).await
    }

    /// Continuation of `input`; an undecodable reply yields an empty string.
    pub async fn complete(&self, input: &str) -> Result<String, AgentError> {
        let request = CompletionRequest::new(
            &self.config.complete_model,
            self.prompt.auto_complete(input),
        )
        .with_temperature(1.0)
        .with_max_tokens(self.config.max_tokens);
        let reply = self.provider.complete(&request).await?;
        let parsed: CompletionReply = decode_or_default(&reply, "completion");
        Ok(parsed.completion)
    }

    /// Ids of the citations the model maps to `control`.
    pub async fn map_control(
        &self,
        control: &Control,
        citations: &[Citation],
    ) -> Result<Vec<i64>, AgentError> {
        let request = CompletionRequest::new(
            &self.config.mapping_model,
            self.prompt.control_mapping(&control.name, citations),
        )
        .with_temperature(0.0)
        .with_max_tokens(self.config.max_tokens);
        let reply = self.provider.complete(&request).await?;
        let parsed: MappingReply = decode_or_default(&reply, "mapping");
        let mappings = parsed.mappings.unwrap_or_default();
        debug!(target: "agent-core", control = %control.name, mapped = mappings.len(), "control mapped");
        Ok(mappings)
    }
}

fn decode_or_default<T>(reply: &str, what: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(json) = extract_json_object(reply) else {
        warn!(target: "agent-core", what, "reply holds no JSON object");
        return T::default();
    };
    parse_folded(&json).unwrap_or_else(|err| {
        warn!(target: "agent-core", what, %err, "reply did not decode");
        T::default()
    })
}
