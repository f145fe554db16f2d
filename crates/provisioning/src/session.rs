//! One logged-in browser page and the step helpers the workflows share.

use std::time::Duration;

use action_primitives::{
    ElementState, ExecCtx, FilePayload, Locator, PageDriver, ResponseMatcher, UrlPattern,
};
use tracing::{debug, info};

use crate::config::ProvisioningConfig;
use crate::errors::{ProvisionError, Result};
use crate::routes;
use crate::selectors;

/// A page plus the operation context. Every helper narrows the context to the
/// step timeout and tags failures with the step name.
pub struct Session<'a> {
    pub page: &'a dyn PageDriver,
    pub ctx: &'a ExecCtx,
    pub cfg: &'a ProvisioningConfig,
}

impl<'a> Session<'a> {
    pub fn new(page: &'a dyn PageDriver, ctx: &'a ExecCtx, cfg: &'a ProvisioningConfig) -> Self {
        Self { page, ctx, cfg }
    }

    fn step_ctx(&self) -> ExecCtx {
        self.ctx.step(self.cfg.step_timeout())
    }

    /// Fills the login form and waits for the dashboard.
    pub async fn login(&self) -> Result<()> {
        info!(target: "provisioning", action_id = %self.ctx.action_id, "logging in");
        self.goto("login", routes::LOGIN).await?;
        self.fill("login", &selectors::username(), &self.cfg.username).await?;
        self.fill("login", &selectors::password(), &self.cfg.password).await?;
        self.click("login", &selectors::login_button()).await?;
        self.wait_for_url("login", &routes::DASHBOARD).await?;
        Ok(())
    }

    pub async fn goto(&self, step: &'static str, path: &str) -> Result<()> {
        let url = self.cfg.url(path);
        debug!(target: "provisioning", step, %url, "navigate");
        self.page
            .goto(&self.step_ctx(), &url)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn click(&self, step: &'static str, locator: &Locator) -> Result<()> {
        self.page
            .click(&self.step_ctx(), locator)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn fill(&self, step: &'static str, locator: &Locator, text: &str) -> Result<()> {
        self.page
            .fill(&self.step_ctx(), locator, text)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn select(&self, step: &'static str, locator: &Locator, label: &str) -> Result<()> {
        self.page
            .select_option(&self.step_ctx(), locator, label)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn drag(&self, step: &'static str, source: &Locator, target: &Locator) -> Result<()> {
        self.page
            .drag_to(&self.step_ctx(), source, target)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn wait_visible(&self, step: &'static str, locator: &Locator) -> Result<()> {
        self.page
            .wait_for(&self.step_ctx(), locator, ElementState::Visible)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn wait_hidden(&self, step: &'static str, locator: &Locator) -> Result<()> {
        self.page
            .wait_for(&self.step_ctx(), locator, ElementState::Hidden)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn wait_for_url(&self, step: &'static str, pattern: &UrlPattern) -> Result<String> {
        self.page
            .wait_for_url(&self.step_ctx(), pattern)
            .await
            .map_err(ProvisionError::action(step))
    }

    /// Waits for `pattern` and returns the URL with the numeric id it captures.
    pub async fn wait_for_id(&self, step: &'static str, pattern: &UrlPattern) -> Result<(String, u64)> {
        let url = self.wait_for_url(step, pattern).await?;
        let id = routes::capture_id(pattern, &url)
            .ok_or_else(|| ProvisionError::Route { step, url: url.clone() })?;
        Ok((url, id))
    }

    /// Uploads `file` through `input` and waits for the platform to
    /// acknowledge it with a response matching `ack`.
    pub async fn upload(
        &self,
        step: &'static str,
        input: &Locator,
        file: &FilePayload,
        ack: &ResponseMatcher,
    ) -> Result<()> {
        let mark = self.page.response_mark();
        self.page
            .set_input_files(&self.step_ctx(), input, file)
            .await
            .map_err(ProvisionError::action(step))?;
        let response = self
            .page
            .wait_for_response(&self.step_ctx(), mark, ack)
            .await
            .map_err(ProvisionError::action(step))?;
        debug!(target: "provisioning", step, url = %response.url, status = response.status, "upload acknowledged");
        Ok(())
    }

    pub async fn network_idle(&self, step: &'static str) -> Result<()> {
        self.page
            .wait_for_network_idle(&self.step_ctx())
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn count(&self, step: &'static str, locator: &Locator) -> Result<usize> {
        self.page
            .count(locator)
            .await
            .map_err(ProvisionError::action(step))
    }

    pub async fn texts(&self, step: &'static str, locator: &Locator) -> Result<Vec<String>> {
        self.page
            .texts(locator)
            .await
            .map_err(ProvisionError::action(step))
    }

    /// Cancellable pause between polls. Never sleeps past the operation
    /// deadline; the caller's next liveness check reports the timeout.
    pub async fn pause(&self, step: &'static str, duration: Duration) -> Result<()> {
        let duration = duration.min(self.ctx.remaining_time());
        tokio::select! {
            _ = self.ctx.cancel_token.cancelled() => Err(ProvisionError::Action {
                step,
                source: action_primitives::ActionError::Interrupted(format!(
                    "action {} cancelled",
                    self.ctx.action_id
                )),
            }),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
