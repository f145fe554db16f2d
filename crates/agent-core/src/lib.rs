//! Model-backed features of the GRC copilot.
//!
//! Everything talks to a model through [`LlmProvider`]: schema inference over
//! sample CSV rows, the streaming writing assistant, auto-complete and
//! control-to-citation mapping. [`ClaudeLlmProvider`] is the production
//! implementation and [`MockLlmProvider`] the scripted one used in tests.

pub mod anthropic;
pub mod assistant;
pub mod config;
pub mod errors;
pub mod inference;
pub mod llm_provider;
pub mod prompt;
pub mod utils;

pub use anthropic::{ClaudeConfig, ClaudeLlmProvider};
pub use assistant::WritingAssistant;
pub use config::LlmConfig;
pub use errors::AgentError;
pub use inference::{sample_rows, SchemaInferencer, DEFAULT_SAMPLE_ROWS};
pub use llm_provider::{CompletionRequest, LlmProvider, MockLlmProvider, TextStream};
pub use prompt::PromptBuilder;
