//! [`PageDriver`] over a live Chromium page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{
    event_bus, metrics, AdapterMetricsSnapshot, Anchor, Cdp, CdpAdapter, CdpConfig, MousePhase,
    PageId, RawEvent, ResponseRecord,
};
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::ActionError;
use crate::locator::{Locator, ScriptOp, ScriptReply};
use crate::page::{PageDriver, PageFactory};
use crate::types::{ElementState, ExecCtx, FilePayload, ResponseMark, ResponseMatcher, UrlPattern};
use crate::waiting::poll_until;

const NETWORK_IDLE_WINDOW_MS: u64 = 500;
const DRAG_STEPS: u32 = 12;
const DRAG_STEP_PAUSE: Duration = Duration::from_millis(16);
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Launches one browser per [`PageFactory::open`] call.
#[derive(Clone, Debug)]
pub struct CdpPageFactory {
    cfg: CdpConfig,
}

impl CdpPageFactory {
    pub fn new(cfg: CdpConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl PageFactory for CdpPageFactory {
    async fn open(&self) -> Result<Box<dyn PageDriver>, ActionError> {
        let (bus, _rx) = event_bus(256);
        let adapter = Arc::new(CdpAdapter::new(self.cfg.clone(), bus)?);
        if let Err(err) = Arc::clone(&adapter).start().await {
            adapter.shutdown().await;
            return Err(err.into());
        }
        let page = match adapter.create_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                adapter.shutdown().await;
                return Err(err.into());
            }
        };
        info!(target: "grc-page", browser = ?adapter.browser_id, ?page, "browser page opened");
        Ok(Box::new(CdpPage::new(adapter, page)))
    }
}

pub struct CdpPage {
    adapter: Arc<CdpAdapter>,
    page: PageId,
    uploads: Mutex<Option<TempDir>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    opened_at: AdapterMetricsSnapshot,
}

impl CdpPage {
    pub fn new(adapter: Arc<CdpAdapter>, page: PageId) -> Self {
        let forwarder = spawn_event_logger(&adapter, page);
        Self {
            adapter,
            page,
            uploads: Mutex::new(None),
            forwarder: Mutex::new(Some(forwarder)),
            closed: AtomicBool::new(false),
            opened_at: metrics::snapshot(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page
    }

    async fn eval(
        &self,
        locator: &Locator,
        op: ScriptOp,
        arg: Option<&str>,
    ) -> Result<ScriptReply, ActionError> {
        let script = locator.script(op, arg)?;
        let value = self.adapter.evaluate_script(self.page, &script).await?;
        ScriptReply::parse(&value)
    }

    /// One lookup attempt. Transient evaluation failures (mid-navigation
    /// context teardown) count as "not yet".
    async fn probe_point(&self, locator: &Locator) -> Result<Option<Anchor>, ActionError> {
        match self.eval(locator, ScriptOp::Locate, None).await {
            Ok(ScriptReply::Point { x, y }) => Ok(Some(Anchor::new(x, y))),
            Ok(ScriptReply::NotFound | ScriptReply::FrameMissing) => Ok(None),
            Ok(other) => Err(ActionError::Script(format!(
                "unexpected reply {other:?} locating {locator}"
            ))),
            Err(err @ (ActionError::Script(_) | ActionError::CdpIo(_))) => {
                debug!(target: "grc-page", %locator, %err, "lookup retry");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn locate(&self, ctx: &ExecCtx, locator: &Locator) -> Result<Anchor, ActionError> {
        locator.validate()?;
        let this = self;
        poll_until(
            ctx,
            || ActionError::AnchorNotFound(locator.to_string()),
            move || this.probe_point(locator),
        )
        .await
    }

    async fn probe_count(&self, locator: &Locator) -> Result<usize, ActionError> {
        match self.eval(locator, ScriptOp::Count, None).await? {
            ScriptReply::Count(count) => Ok(count),
            ScriptReply::Done => Ok(0),
            other => Err(ActionError::Script(format!(
                "unexpected reply {other:?} counting {locator}"
            ))),
        }
    }

    async fn probe_handle(&self, locator: &Locator) -> Result<Option<String>, ActionError> {
        let script = locator.script(ScriptOp::Element, None)?;
        match self.adapter.evaluate_handle(self.page, &script).await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                debug!(target: "grc-page", %locator, %err, "handle lookup retry");
                Ok(None)
            }
        }
    }

    fn upload_dir(&self) -> Result<std::path::PathBuf, ActionError> {
        let mut guard = self
            .uploads
            .lock()
            .map_err(|_| ActionError::Internal("upload dir lock poisoned".into()))?;
        if guard.is_none() {
            let dir = tempfile::Builder::new().prefix("grc-upload-").tempdir()?;
            *guard = Some(dir);
        }
        guard
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| ActionError::Internal("upload dir missing".into()))
    }

    async fn mouse(&self, phase: MousePhase, at: Anchor) -> Result<(), ActionError> {
        self.adapter
            .dispatch_mouse(self.page, phase, at)
            .await
            .map_err(ActionError::from)
    }

    async fn url_probe(&self) -> Option<String> {
        self.current_url().await.ok()
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, ctx: &ExecCtx, url: &str) -> Result<(), ActionError> {
        ctx.ensure_live("goto")?;
        info!(target: "grc-page", action_id = %ctx.action_id, %url, "navigate");
        tokio::select! {
            _ = ctx.cancel_token.cancelled() => {
                Err(ActionError::Interrupted(format!("navigation to {url} cancelled")))
            }
            result = self.adapter.navigate(self.page, url, ctx.remaining_time()) => {
                result.map_err(ActionError::from)
            }
        }
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        match self.adapter.evaluate_script(self.page, "location.href").await {
            Ok(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ActionError::Script(format!("location.href returned {value}"))),
            Err(err) => self
                .adapter
                .registry
                .last_url(&self.page)
                .ok_or_else(|| err.into()),
        }
    }

    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<(), ActionError> {
        let at = self.locate(ctx, locator).await?;
        debug!(target: "grc-page", action_id = %ctx.action_id, %locator, x = at.x, y = at.y, "click");
        self.mouse(MousePhase::Pressed, at).await?;
        self.mouse(MousePhase::Released, at).await
    }

    async fn fill(&self, ctx: &ExecCtx, locator: &Locator, text: &str) -> Result<(), ActionError> {
        self.locate(ctx, locator).await?;
        debug!(target: "grc-page", action_id = %ctx.action_id, %locator, len = text.len(), "fill");
        match self.eval(locator, ScriptOp::Focus, None).await? {
            ScriptReply::Done => {}
            ScriptReply::NotInteractable(reason) => {
                return Err(ActionError::NotInteractable(format!("{locator}: {reason}")));
            }
            ScriptReply::NotFound | ScriptReply::FrameMissing => {
                return Err(ActionError::AnchorNotFound(locator.to_string()));
            }
            other => {
                return Err(ActionError::Script(format!(
                    "unexpected reply {other:?} focusing {locator}"
                )));
            }
        }
        if !text.is_empty() {
            self.adapter.insert_text(self.page, text).await?;
        }
        self.eval(locator, ScriptOp::Change, None).await?;
        Ok(())
    }

    async fn select_option(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        label: &str,
    ) -> Result<(), ActionError> {
        locator.validate()?;
        let saw_select = AtomicBool::new(false);
        let saw = &saw_select;
        let this = self;
        poll_until(
            ctx,
            || {
                if saw.load(Ordering::Relaxed) {
                    ActionError::OptionNotFound(format!("'{label}' in {locator}"))
                } else {
                    ActionError::AnchorNotFound(locator.to_string())
                }
            },
            move || async move {
                match this.eval(locator, ScriptOp::Select, Some(label)).await {
                    Ok(ScriptReply::Done) => Ok(Some(())),
                    Ok(ScriptReply::OptionMissing) => {
                        saw.store(true, Ordering::Relaxed);
                        Ok(None)
                    }
                    Ok(ScriptReply::NotInteractable(reason)) => {
                        Err(ActionError::NotInteractable(format!("{locator}: {reason}")))
                    }
                    Ok(_) => Ok(None),
                    Err(ActionError::Script(_) | ActionError::CdpIo(_)) => Ok(None),
                    Err(err) => Err(err),
                }
            },
        )
        .await
    }

    async fn set_input_files(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        file: &FilePayload,
    ) -> Result<(), ActionError> {
        locator.validate()?;
        let this = self;
        let object_id = poll_until(
            ctx,
            || ActionError::AnchorNotFound(locator.to_string()),
            move || this.probe_handle(locator),
        )
        .await?;

        let path = self.upload_dir()?.join(file.safe_file_name());
        tokio::fs::write(&path, &file.bytes).await?;
        info!(
            target: "grc-page",
            action_id = %ctx.action_id,
            %locator,
            file = %file.file_name,
            mime = %file.mime_type,
            bytes = file.bytes.len(),
            "set input files"
        );
        let result = self
            .adapter
            .set_file_input_files(self.page, &object_id, std::slice::from_ref(&path))
            .await;
        if let Err(err) = self.adapter.release_object(self.page, &object_id).await {
            debug!(target: "grc-page", %err, "release object failed");
        }
        result.map_err(ActionError::from)
    }

    async fn drag_to(
        &self,
        ctx: &ExecCtx,
        source: &Locator,
        target: &Locator,
    ) -> Result<(), ActionError> {
        let from = self.locate(ctx, source).await?;
        let to = self.locate(ctx, target).await?;
        debug!(target: "grc-page", action_id = %ctx.action_id, %source, %target, "drag");
        self.mouse(MousePhase::Pressed, from).await?;
        for step in 1..=DRAG_STEPS {
            ctx.ensure_live("drag")?;
            let t = f64::from(step) / f64::from(DRAG_STEPS);
            self.mouse(MousePhase::Moved, from.lerp(&to, t)).await?;
            sleep(DRAG_STEP_PAUSE).await;
        }
        self.mouse(MousePhase::Released, to).await
    }

    async fn wait_for(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        state: ElementState,
    ) -> Result<(), ActionError> {
        locator.validate()?;
        let this = self;
        poll_until(
            ctx,
            || match state {
                ElementState::Visible => ActionError::AnchorNotFound(locator.to_string()),
                ElementState::Hidden => {
                    ActionError::WaitTimeout(format!("{locator} still visible"))
                }
            },
            move || async move {
                let count = match this.probe_count(locator).await {
                    Ok(count) => count,
                    Err(ActionError::Script(_) | ActionError::CdpIo(_)) => return Ok(None),
                    Err(err) => return Err(err),
                };
                let reached = match state {
                    ElementState::Visible => count > 0,
                    ElementState::Hidden => count == 0,
                };
                Ok(reached.then_some(()))
            },
        )
        .await
    }

    async fn count(&self, locator: &Locator) -> Result<usize, ActionError> {
        self.probe_count(locator).await
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, ActionError> {
        match self.eval(locator, ScriptOp::Texts, None).await? {
            ScriptReply::Texts(texts) => Ok(texts),
            ScriptReply::NotFound | ScriptReply::FrameMissing | ScriptReply::Done => Ok(Vec::new()),
            other => Err(ActionError::Script(format!(
                "unexpected reply {other:?} reading {locator}"
            ))),
        }
    }

    async fn wait_for_url(
        &self,
        ctx: &ExecCtx,
        pattern: &UrlPattern,
    ) -> Result<String, ActionError> {
        let last_seen = Mutex::new(String::new());
        let last = &last_seen;
        let this = self;
        let url = poll_until(
            ctx,
            || {
                let seen = last.lock().map(|s| s.clone()).unwrap_or_default();
                ActionError::NavTimeout(format!("url never matched {pattern}; last seen '{seen}'"))
            },
            move || async move {
                let Some(url) = this.url_probe().await else {
                    return Ok(None);
                };
                let matched = pattern.is_match(&url);
                if let Ok(mut slot) = last.lock() {
                    *slot = url.clone();
                }
                Ok(matched.then_some(url))
            },
        )
        .await?;
        debug!(target: "grc-page", action_id = %ctx.action_id, %url, "url reached");
        Ok(url)
    }

    fn response_mark(&self) -> ResponseMark {
        ResponseMark(self.adapter.response_mark(&self.page))
    }

    async fn wait_for_response(
        &self,
        ctx: &ExecCtx,
        mark: ResponseMark,
        matcher: &ResponseMatcher,
    ) -> Result<ResponseRecord, ActionError> {
        let adapter = &self.adapter;
        let page = self.page;
        poll_until(
            ctx,
            || ActionError::WaitTimeout(format!("no response matching {matcher}")),
            move || async move {
                Ok(adapter
                    .responses_since(&page, mark.0)
                    .into_iter()
                    .find(|record| matcher.matches(record)))
            },
        )
        .await
    }

    async fn wait_for_network_idle(&self, ctx: &ExecCtx) -> Result<(), ActionError> {
        let adapter = &self.adapter;
        let page = self.page;
        poll_until(
            ctx,
            || ActionError::WaitTimeout("network never went idle".into()),
            move || async move {
                Ok(adapter
                    .network_snapshot(&page)
                    .filter(|snapshot| snapshot.is_quiet(NETWORK_IDLE_WINDOW_MS, 0))
                    .map(|_| ()))
            },
        )
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ActionError> {
        self.adapter
            .screenshot(self.page, SCREENSHOT_TIMEOUT)
            .await
            .map_err(ActionError::from)
    }

    async fn close(&self) -> Result<(), ActionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Ok(mut guard) = self.forwarder.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        if let Err(err) = self.adapter.close_page(self.page).await {
            warn!(target: "grc-page", %err, "close page failed; shutting browser down anyway");
        }
        self.adapter.shutdown().await;
        if let Ok(mut guard) = self.uploads.lock() {
            guard.take();
        }
        let usage = metrics::snapshot().since(&self.opened_at);
        info!(
            target: "grc-page",
            page = ?self.page,
            commands = usage.commands,
            failures = usage.failures,
            responses = usage.responses,
            cdp_secs = usage.latency_seconds,
            "browser page closed"
        );
        Ok(())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(target: "grc-page", page = ?self.page, "page dropped without close");
            self.adapter.cancel_token().cancel();
        }
    }
}

fn spawn_event_logger(adapter: &Arc<CdpAdapter>, page: PageId) -> JoinHandle<()> {
    let mut rx = adapter.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(RawEvent::PageNavigated { page: p, url, .. }) if p == page => {
                    debug!(target: "grc-page", %url, "navigated");
                }
                Ok(RawEvent::ResponseObserved {
                    page: p,
                    url,
                    status,
                }) if p == page && status >= 400 => {
                    debug!(target: "grc-page", %url, status, "error response");
                }
                Ok(RawEvent::Error { page: p, message }) if p.is_none() || p == Some(page) => {
                    debug!(target: "grc-page", %message, "page error");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}
