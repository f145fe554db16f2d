use async_trait::async_trait;
use cdp_adapter::ResponseRecord;

use crate::errors::ActionError;
use crate::locator::Locator;
use crate::types::{ElementState, ExecCtx, FilePayload, ResponseMark, ResponseMatcher, UrlPattern};

/// The locator capability consumed by the provisioning workflows.
///
/// Every method taking an [`ExecCtx`] may wait; element lookups poll until the
/// element is visible or the context deadline passes.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, ctx: &ExecCtx, url: &str) -> Result<(), ActionError>;

    async fn current_url(&self) -> Result<String, ActionError>;

    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<(), ActionError>;

    /// Focuses, clears and types `text`.
    async fn fill(&self, ctx: &ExecCtx, locator: &Locator, text: &str) -> Result<(), ActionError>;

    /// Picks an option of a native `<select>` by visible label (or value).
    async fn select_option(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        label: &str,
    ) -> Result<(), ActionError>;

    async fn set_input_files(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        file: &FilePayload,
    ) -> Result<(), ActionError>;

    async fn drag_to(
        &self,
        ctx: &ExecCtx,
        source: &Locator,
        target: &Locator,
    ) -> Result<(), ActionError>;

    async fn wait_for(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        state: ElementState,
    ) -> Result<(), ActionError>;

    /// Visible matches right now; does not wait.
    async fn count(&self, locator: &Locator) -> Result<usize, ActionError>;

    /// Normalised text of every match right now; does not wait.
    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, ActionError>;

    /// Resolves with the first URL matching `pattern`.
    async fn wait_for_url(&self, ctx: &ExecCtx, pattern: &UrlPattern)
        -> Result<String, ActionError>;

    /// Take before the action expected to trigger a response.
    fn response_mark(&self) -> ResponseMark;

    async fn wait_for_response(
        &self,
        ctx: &ExecCtx,
        mark: ResponseMark,
        matcher: &ResponseMatcher,
    ) -> Result<ResponseRecord, ActionError>;

    async fn wait_for_network_idle(&self, ctx: &ExecCtx) -> Result<(), ActionError>;

    async fn screenshot(&self) -> Result<Vec<u8>, ActionError>;

    /// Releases the page and its browser. Safe to call more than once.
    async fn close(&self) -> Result<(), ActionError>;
}

/// Opens one exclusively-owned page per top-level operation.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageDriver>, ActionError>;
}
