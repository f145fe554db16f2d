use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SONNET: &str = "claude-3-sonnet-20240229";
pub const HAIKU: &str = "claude-3-haiku-20240307";

/// Model endpoint and per-feature model choices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub write_model: String,
    pub complete_model: String,
    pub mapping_model: String,
    pub analysis_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.anthropic.com/v1".to_string(),
            timeout_secs: 120,
            max_tokens: 1024,
            write_model: SONNET.to_string(),
            complete_model: HAIKU.to_string(),
            mapping_model: HAIKU.to_string(),
            analysis_model: HAIKU.to_string(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
