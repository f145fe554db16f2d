//! Top-level provisioning operations.
//!
//! Each operation opens its own page, logs in, runs its workflows in order
//! and closes the page on every exit path. A failing operation leaves what it
//! already created on the platform in place.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{ExecCtx, FilePayload, PageDriver, PageFactory};
use grc_core_types::ImportAnalysisResult;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::ApplicationProvisioner;
use crate::config::ProvisioningConfig;
use crate::errors::{ProvisionError, Result};
use crate::import::{system_clock, Clock, ImportState, ImportWorkflow};
use crate::report::ReportProvisioner;
use crate::routes;
use crate::session::Session;

/// Deadline used when no operation timeout is configured.
const UNBOUNDED_OPERATION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    pub application_url: String,
    pub import_name: String,
    pub import_id: u64,
    pub report_url: String,
}

pub struct ProvisioningPipeline {
    factory: Arc<dyn PageFactory>,
    cfg: ProvisioningConfig,
    cancel: CancellationToken,
    clock: Clock,
}

impl ProvisioningPipeline {
    pub fn new(factory: Arc<dyn PageFactory>, cfg: ProvisioningConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            factory,
            cfg,
            cancel: CancellationToken::new(),
            clock: system_clock(),
        })
    }

    /// Cancelling `token` aborts any running operation at its next wait.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.cfg
    }

    fn exec_ctx(&self) -> ExecCtx {
        let timeout = self.cfg.operation_timeout().unwrap_or(UNBOUNDED_OPERATION);
        ExecCtx::new(timeout, self.cancel.child_token())
    }

    /// Creates the application and its fields; returns the application URL.
    pub async fn create_application(&self, analysis: &ImportAnalysisResult) -> Result<String> {
        analysis.ensure_columns()?;
        let ctx = self.exec_ctx();
        let page = self.open(&ctx).await?;
        let result: Result<String> = async {
            let session = Session::new(page.as_ref(), &ctx, &self.cfg);
            session.login().await?;
            let app = ApplicationProvisioner::new()
                .create_application(&session, analysis)
                .await?;
            Ok(app.url)
        }
        .await;
        self.finish("create-application", page.as_ref(), &ctx, result)
            .await
    }

    /// Imports `file` into an existing application, waits for the import to
    /// complete, then builds the report. Returns the report URL.
    pub async fn create_import(
        &self,
        analysis: &ImportAnalysisResult,
        application_url: &str,
        file: FilePayload,
    ) -> Result<String> {
        analysis.ensure_columns()?;
        if !routes::APPLICATION.is_match(application_url) {
            return Err(ProvisionError::InvalidInput(format!(
                "'{application_url}' is not an application URL"
            )));
        }
        let ctx = self.exec_ctx();
        let page = self.open(&ctx).await?;
        let result: Result<String> = async {
            let session = Session::new(page.as_ref(), &ctx, &self.cfg);
            session.login().await?;
            self.import(&session, analysis, file).await?;
            ReportProvisioner::new()
                .create_report(&session, analysis, application_url)
                .await
        }
        .await;
        self.finish("create-import", page.as_ref(), &ctx, result)
            .await
    }

    /// Builds the report for an application that already holds imported
    /// records.
    pub async fn create_report(
        &self,
        analysis: &ImportAnalysisResult,
        application_url: &str,
    ) -> Result<String> {
        analysis.ensure_columns()?;
        if !routes::APPLICATION.is_match(application_url) {
            return Err(ProvisionError::InvalidInput(format!(
                "'{application_url}' is not an application URL"
            )));
        }
        let ctx = self.exec_ctx();
        let page = self.open(&ctx).await?;
        let result: Result<String> = async {
            let session = Session::new(page.as_ref(), &ctx, &self.cfg);
            session.login().await?;
            ReportProvisioner::new()
                .create_report(&session, analysis, application_url)
                .await
        }
        .await;
        self.finish("create-report", page.as_ref(), &ctx, result)
            .await
    }

    /// Application, import and report in one session.
    pub async fn provision(
        &self,
        analysis: &ImportAnalysisResult,
        file: FilePayload,
    ) -> Result<ProvisionOutcome> {
        analysis.ensure_columns()?;
        let ctx = self.exec_ctx();
        let page = self.open(&ctx).await?;
        let result: Result<ProvisionOutcome> = async {
            let session = Session::new(page.as_ref(), &ctx, &self.cfg);
            session.login().await?;
            let app = ApplicationProvisioner::new()
                .create_application(&session, analysis)
                .await?;
            let (import_name, state) = self.import(&session, analysis, file).await?;
            let report_url = ReportProvisioner::new()
                .create_report(&session, analysis, &app.url)
                .await?;
            Ok(ProvisionOutcome {
                application_url: app.url,
                import_name,
                import_id: state.import_id(),
                report_url,
            })
        }
        .await;
        self.finish("provision", page.as_ref(), &ctx, result).await
    }

    async fn import(
        &self,
        session: &Session<'_>,
        analysis: &ImportAnalysisResult,
        file: FilePayload,
    ) -> Result<(String, ImportState)> {
        let workflow =
            ImportWorkflow::with_clock(&analysis.application_name, file, Arc::clone(&self.clock));
        let state = workflow.run(session).await?;
        Ok((workflow.job_name().to_string(), state))
    }

    async fn open(&self, ctx: &ExecCtx) -> Result<Box<dyn PageDriver>> {
        let page = self
            .factory
            .open()
            .await
            .map_err(ProvisionError::action("open browser"))?;
        info!(target: "provisioning", action_id = %ctx.action_id, "browser session opened");
        Ok(page)
    }

    /// Screenshot on failure, then close regardless of outcome.
    async fn finish<T>(
        &self,
        operation: &str,
        page: &dyn PageDriver,
        ctx: &ExecCtx,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(err) = &result {
            error!(target: "provisioning", action_id = %ctx.action_id, operation, error = %err, "operation failed");
            if let Some(dir) = &self.cfg.screenshot_dir {
                let name = format!("{operation}-{}.png", ctx.action_id);
                if let Err(shot_err) = save_screenshot(page, dir, &name).await {
                    warn!(target: "provisioning", error = %shot_err, "failure screenshot not saved");
                }
            }
        }
        if let Err(err) = page.close().await {
            warn!(target: "provisioning", action_id = %ctx.action_id, error = %err, "closing browser session failed");
        }
        result
    }
}

async fn save_screenshot(page: &dyn PageDriver, dir: &Path, name: &str) -> Result<()> {
    let bytes = page
        .screenshot()
        .await
        .map_err(ProvisionError::action("screenshot"))?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    info!(target: "provisioning", path = %path.display(), "failure screenshot saved");
    Ok(())
}
