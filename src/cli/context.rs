use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use action_primitives::CdpPageFactory;
use agent_core::{ClaudeConfig, ClaudeLlmProvider, LlmProvider, SchemaInferencer, WritingAssistant};
use anyhow::Result;
use platform_api::{HttpRecordApi, ReferenceService};
use provisioning::ProvisioningPipeline;
use tokio_util::sync::CancellationToken;

use super::output::OutputFormat;
use crate::config::AppConfig;
use crate::errors::CopilotError;

/// Loaded configuration plus the per-invocation handles commands share.
pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: PathBuf,
    output: OutputFormat,
    cancel: CancellationToken,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Cancelled on Ctrl-C; running browser workflows stop at their next wait.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn llm_provider(&self) -> Result<Arc<dyn LlmProvider>, CopilotError> {
        let provider = ClaudeLlmProvider::new(ClaudeConfig::from(&self.config.llm))
            .map_err(|err| CopilotError::Config(err.to_string()))?;
        Ok(Arc::new(provider))
    }

    pub fn inferencer(&self) -> Result<SchemaInferencer, CopilotError> {
        Ok(SchemaInferencer::new(
            self.llm_provider()?,
            self.config.llm.analysis_model.clone(),
        ))
    }

    pub fn assistant(&self) -> Result<WritingAssistant, CopilotError> {
        Ok(WritingAssistant::new(
            self.llm_provider()?,
            self.config.llm.clone(),
        ))
    }

    pub fn reference_service(&self) -> Result<ReferenceService, CopilotError> {
        let api = HttpRecordApi::new(&self.config.platform)?;
        Ok(ReferenceService::new(
            Arc::new(api),
            self.config.reference.clone(),
        ))
    }

    /// Browser-backed pipeline; `timeout` replaces the configured operation
    /// deadline.
    pub fn pipeline(&self, timeout: Option<Duration>) -> Result<ProvisioningPipeline, CopilotError> {
        let mut cfg = self.config.provisioning.clone();
        if let Some(timeout) = timeout {
            cfg.operation_timeout_secs = Some(timeout.as_secs().max(1));
        }
        let factory = CdpPageFactory::new(self.config.browser.clone());
        let pipeline = ProvisioningPipeline::new(Arc::new(factory), cfg)?;
        Ok(pipeline.with_cancel_token(self.cancel.child_token()))
    }
}
