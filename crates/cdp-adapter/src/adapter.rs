use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{Anchor, MousePhase, WaitGate};
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::RawEvent;
use crate::ids::{BrowserId, PageId, SessionId};
use crate::metrics;
use crate::network::{NetworkSnapshot, NetworkTracker, ResponseRecord};
use crate::registry::Registry;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

pub type EventBus = broadcast::Sender<RawEvent>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Command surface consumed by the page driver.
#[async_trait]
pub trait Cdp: Send + Sync {
    async fn navigate(&self, page: PageId, url: &str, deadline: Duration)
        -> Result<(), AdapterError>;

    /// Evaluates `expression` and returns the JSON value of its result.
    async fn evaluate_script(&self, page: PageId, expression: &str) -> Result<Value, AdapterError>;

    /// Evaluates `expression` and returns a remote object id, or `None` when the
    /// result is `null`/`undefined`.
    async fn evaluate_handle(
        &self,
        page: PageId,
        expression: &str,
    ) -> Result<Option<String>, AdapterError>;

    async fn release_object(&self, page: PageId, object_id: &str) -> Result<(), AdapterError>;

    async fn dispatch_mouse(
        &self,
        page: PageId,
        phase: MousePhase,
        at: Anchor,
    ) -> Result<(), AdapterError>;

    async fn insert_text(&self, page: PageId, text: &str) -> Result<(), AdapterError>;

    async fn set_file_input_files(
        &self,
        page: PageId,
        object_id: &str,
        files: &[PathBuf],
    ) -> Result<(), AdapterError>;

    async fn wait_basic(
        &self,
        page: PageId,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError>;

    async fn screenshot(&self, page: PageId, deadline: Duration) -> Result<Vec<u8>, AdapterError>;

    async fn close_page(&self, page: PageId) -> Result<(), AdapterError>;
}

pub struct CdpAdapter {
    pub browser_id: BrowserId,
    pub cfg: CdpConfig,
    pub bus: EventBus,
    pub registry: Arc<Registry>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn CdpTransport>,
    network: NetworkTracker,
}

impl CdpAdapter {
    /// Builds an adapter backed by a real Chromium transport.
    pub fn new(cfg: CdpConfig, bus: EventBus) -> Result<Self, AdapterError> {
        if cfg.websocket_url.is_none() && cfg.executable.as_os_str().is_empty() {
            return Err(AdapterError::new(AdapterErrorKind::Launch)
                .with_hint("no Chrome/Chromium executable found; set GRC_CHROME or browser.executable"));
        }
        info!(
            target: "cdp-adapter",
            executable = %cfg.executable.display(),
            headless = cfg.headless,
            "using Chromium transport"
        );
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Ok(Self::with_transport(cfg, bus, transport))
    }

    pub fn with_transport(
        cfg: CdpConfig,
        bus: EventBus,
        transport: Arc<dyn CdpTransport>,
    ) -> Self {
        Self {
            browser_id: BrowserId::new(),
            cfg,
            bus,
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            transport,
            network: NetworkTracker::new(),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }

        self.transport.start().await?;
        let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", browser = ?self.browser_id, "event loop started");
        Ok(())
    }

    /// Stops the event loop and tears down the browser.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
        if let Err(err) = self.transport.shutdown().await {
            warn!(target: "cdp-adapter", ?err, "transport shutdown failed");
        }
        self.network.clear();
    }

    pub fn register_page(
        &self,
        page: PageId,
        session: SessionId,
        target_id: Option<String>,
        cdp_session: Option<String>,
    ) {
        self.registry
            .register(page, session, target_id, cdp_session);
        self.network.track(page);
    }

    /// Opens a new tab, waits for its flattened session and enables the
    /// Page/Network/Runtime domains on it.
    pub async fn create_page(&self, url: &str) -> Result<PageId, AdapterError> {
        let response = self
            .send_command("Target.createTarget", json!({ "url": url }))
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let deadline = Instant::now() + ATTACH_TIMEOUT;
        let page = loop {
            if let Some(page) = self.registry.page_for_target(&target_id) {
                if self.registry.cdp_session(&page).is_some() {
                    break page;
                }
            }

            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("timed out waiting for target attach"));
            }

            sleep(Duration::from_millis(50)).await;
        };

        for domain in ["Page.enable", "Network.enable", "Runtime.enable"] {
            self.send_page_command(page, domain, json!({})).await?;
        }
        debug!(target: "cdp-adapter", ?page, %target_id, "page ready");
        Ok(page)
    }

    /// Sequence mark for [`CdpAdapter::responses_since`].
    pub fn response_mark(&self, page: &PageId) -> u64 {
        self.network.mark(page)
    }

    pub fn responses_since(&self, page: &PageId, mark: u64) -> Vec<ResponseRecord> {
        self.network.responses_since(page, mark)
    }

    pub fn network_snapshot(&self, page: &PageId) -> Option<NetworkSnapshot> {
        self.network.snapshot(page)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.bus.subscribe()
    }

    /// Runs until shutdown or until the browser connection drops. A lost
    /// connection is final: pages are dropped and callers see CdpIo errors.
    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        loop {
            let event = select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => event,
            };
            match event {
                Some(event) => self.handle_event(event).await,
                None if self.shutdown.is_cancelled() => break,
                None => {
                    warn!(target: "cdp-adapter", browser = ?self.browser_id, "cdp event stream ended");
                    self.handle_transport_disconnect();
                    break;
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn handle_transport_disconnect(&self) {
        let pages = self.registry.clear();
        for page in &pages {
            self.emit_page_event(*page, "closed");
        }
        self.network.clear();

        let message = if pages.is_empty() {
            "cdp transport lost"
        } else {
            "cdp transport lost; open pages were dropped"
        };
        let _ = self.bus.send(RawEvent::Error {
            page: None,
            message: message.to_string(),
        });
    }

    async fn handle_event(&self, event: TransportEvent) {
        if let Err(err) = self.process_event(event) {
            let _ = self.bus.send(RawEvent::Error {
                page: None,
                message: format!("cdp event handling error: {err}"),
            });
        }
    }

    fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::observe_event();
        let session = event.session_id.as_ref();
        match event.method.as_str() {
            "Target.targetCreated" => self.on_target_created(event.params),
            "Target.targetDestroyed" => self.on_target_destroyed(event.params),
            "Target.attachedToTarget" => self.on_target_attached(event.params),
            "Target.detachedFromTarget" => self.on_target_detached(event.params),
            "Page.frameNavigated" => self.on_frame_navigated(session, event.params),
            "Page.loadEventFired" => {
                if let Some(page) = self.page_from_session(session) {
                    self.emit_page_event(page, "load");
                }
                Ok(())
            }
            "Network.requestWillBeSent" => self.on_network_request(session, event.params),
            "Network.responseReceived" => self.on_network_response(session, event.params),
            "Network.loadingFinished" | "Network.loadingFailed" => {
                self.on_network_settled(session, event.params)
            }
            "Runtime.exceptionThrown" => self.on_exception_thrown(session, event.params),
            _ => {
                debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
                Ok(())
            }
        }
    }

    fn on_target_created(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetCreatedParams = decode(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }

        let target_id = payload.target_info.target_id;
        if self.registry.page_for_target(&target_id).is_some() {
            return Ok(());
        }
        let page = PageId::new();
        self.registry
            .register(page, SessionId::new(), Some(target_id), None);
        self.network.track(page);
        if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
            self.registry.note_url(&page, url);
        }
        self.emit_page_event(page, "opened");
        Ok(())
    }

    fn on_target_destroyed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetDestroyedParams = decode(params)?;
        if let Some(page) = self.registry.forget_target(&payload.target_id) {
            self.network.forget(&page);
            self.emit_page_event(page, "closed");
        }
        Ok(())
    }

    fn on_target_attached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: AttachedToTargetParams = decode(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }

        if let Some(page) = self
            .registry
            .attach(&payload.target_info.target_id, payload.session_id)
        {
            self.emit_page_event(page, "attached");
        }
        Ok(())
    }

    fn on_target_detached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DetachedFromTargetParams = decode(params)?;
        self.registry.detach(&payload.session_id);
        Ok(())
    }

    fn on_frame_navigated(
        &self,
        session: Option<&String>,
        params: Value,
    ) -> Result<(), AdapterError> {
        let payload: FrameNavigatedParams = decode(params)?;
        // child frames navigate independently of the page URL
        if payload.frame.parent_id.is_some() {
            return Ok(());
        }
        if let Some(page) = self.page_from_session(session) {
            self.registry.note_url(&page, payload.frame.url.clone());
            let _ = self.bus.send(RawEvent::PageNavigated {
                page,
                url: payload.frame.url,
                ts: timestamp_now(),
            });
        }
        Ok(())
    }

    fn on_network_request(
        &self,
        session: Option<&String>,
        params: Value,
    ) -> Result<(), AdapterError> {
        let payload: RequestWillBeSentParams = decode(params)?;
        if let Some(page) = self.page_from_session(session) {
            self.network
                .on_request(page, &payload.request_id, &payload.request.method);
        }
        Ok(())
    }

    fn on_network_response(
        &self,
        session: Option<&String>,
        params: Value,
    ) -> Result<(), AdapterError> {
        let payload: ResponseReceivedParams = decode(params)?;
        if let Some(page) = self.page_from_session(session) {
            self.network.on_response(
                page,
                &payload.request_id,
                &payload.response.url,
                payload.response.status,
            );
            metrics::observe_response();
            let _ = self.bus.send(RawEvent::ResponseObserved {
                page,
                url: payload.response.url,
                status: payload.response.status,
            });
        }
        Ok(())
    }

    fn on_network_settled(
        &self,
        session: Option<&String>,
        params: Value,
    ) -> Result<(), AdapterError> {
        let payload: RequestSettledParams = decode(params)?;
        if let Some(page) = self.page_from_session(session) {
            self.network.on_settled(page, &payload.request_id);
        }
        Ok(())
    }

    fn on_exception_thrown(
        &self,
        session: Option<&String>,
        params: Value,
    ) -> Result<(), AdapterError> {
        let payload: ExceptionThrownParams = decode(params)?;
        let message = payload
            .exception_details
            .exception
            .and_then(|ex| ex.description)
            .or(payload.exception_details.text)
            .unwrap_or_else(|| "runtime exception".to_string());

        let page = self.page_from_session(session);
        let _ = self.bus.send(RawEvent::Error { page, message });
        Ok(())
    }

    fn page_from_session(&self, session: Option<&String>) -> Option<PageId> {
        session.and_then(|sid| self.registry.page_for_session(sid))
    }

    fn emit_page_event(&self, page: PageId, phase: &str) {
        let _ = self.bus.send(RawEvent::PageLifecycle {
            page,
            phase: phase.to_string(),
            ts: timestamp_now(),
        });
    }

    async fn wait_for_dom_ready(&self, page: PageId, deadline: Instant) -> Result<(), AdapterError> {
        loop {
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("wait_basic DomReady timed out"));
            }

            let response = self
                .send_page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": "document.readyState",
                        "returnByValue": true,
                    }),
                )
                .await?;

            let ready = response
                .get("result")
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
                .map(|state| matches!(state, "interactive" | "complete"))
                .unwrap_or(false);

            if ready {
                return Ok(());
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_network_quiet(
        &self,
        page: PageId,
        window_ms: u64,
        max_inflight: u32,
        deadline: Instant,
    ) -> Result<(), AdapterError> {
        loop {
            if let Some(snapshot) = self.network.snapshot(&page) {
                if snapshot.is_quiet(window_ms, max_inflight) {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("wait_basic NetworkQuiet timed out"));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        self.send_with_metrics(CommandTarget::Browser, method, params)
            .await
    }

    async fn send_page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.registry.cdp_session(&page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("missing cdp session for page {page:?}"))
        })?;
        self.send_with_metrics(CommandTarget::Session(session), method, params)
            .await
    }

    async fn send_with_metrics(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        let result = self.transport.send_command(target, method, params).await;
        metrics::observe_command(method, start.elapsed(), result.is_ok());
        result
    }
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        deadline: Duration,
    ) -> Result<(), AdapterError> {
        let start = Instant::now();
        let response = self
            .send_page_command(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(|v| v.as_str()) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error_text}"))
                .retriable(true));
        }
        self.registry.note_url(&page, url);
        let deadline_at = start
            .checked_add(deadline)
            .unwrap_or_else(|| start + Duration::from_secs(30));
        self.wait_for_dom_ready(page, deadline_at).await
    }

    async fn evaluate_script(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint("evaluate_script raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn evaluate_handle(
        &self,
        page: PageId,
        expression: &str,
    ) -> Result<Option<String>, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "objectGroup": "grc-handles",
                    "returnByValue": false,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint("evaluate_handle raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("objectId"))
            .and_then(|val| val.as_str())
            .map(str::to_string))
    }

    async fn release_object(&self, page: PageId, object_id: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Runtime.releaseObject",
            json!({ "objectId": object_id }),
        )
        .await
        .map(|_| ())
    }

    async fn dispatch_mouse(
        &self,
        page: PageId,
        phase: MousePhase,
        at: Anchor,
    ) -> Result<(), AdapterError> {
        let mut payload = json!({
            "type": phase.as_cdp(),
            "x": at.x,
            "y": at.y,
            "button": "left",
        });
        match phase {
            MousePhase::Pressed | MousePhase::Released => {
                payload["clickCount"] = json!(1);
            }
            MousePhase::Moved => {
                payload["buttons"] = json!(1);
            }
        }
        self.send_page_command(page, "Input.dispatchMouseEvent", payload)
            .await
            .map(|_| ())
    }

    async fn insert_text(&self, page: PageId, text: &str) -> Result<(), AdapterError> {
        self.send_page_command(page, "Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn set_file_input_files(
        &self,
        page: PageId,
        object_id: &str,
        files: &[PathBuf],
    ) -> Result<(), AdapterError> {
        let files: Vec<String> = files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        self.send_page_command(
            page,
            "DOM.setFileInputFiles",
            json!({ "objectId": object_id, "files": files }),
        )
        .await
        .map(|_| ())
    }

    async fn wait_basic(
        &self,
        page: PageId,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        match gate {
            WaitGate::DomReady => self.wait_for_dom_ready(page, deadline).await,
            WaitGate::NetworkQuiet {
                window_ms,
                max_inflight,
            } => {
                self.wait_for_network_quiet(page, window_ms, max_inflight, deadline)
                    .await
            }
        }
    }

    async fn screenshot(&self, page: PageId, deadline: Duration) -> Result<Vec<u8>, AdapterError> {
        let response = tokio::time::timeout(
            deadline,
            self.send_page_command(page, "Page.captureScreenshot", json!({ "format": "png" })),
        )
        .await
        .map_err(|_| {
            AdapterError::new(AdapterErrorKind::NavTimeout).with_hint("screenshot timed out")
        })??;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    async fn close_page(&self, page: PageId) -> Result<(), AdapterError> {
        let Some(target_id) = self.registry.target_id(&page) else {
            return Ok(());
        };
        self.send_command("Target.closeTarget", json!({ "targetId": target_id }))
            .await?;
        self.registry.forget(&page);
        self.network.forget(&page);
        Ok(())
    }
}

fn decode<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, AdapterError> {
    serde_json::from_value(params)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

#[derive(Debug, Deserialize)]
struct TargetCreatedParams {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetDestroyedParams {
    #[serde(rename = "targetId")]
    target_id: String,
}

#[derive(Debug, Deserialize)]
struct AttachedToTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct DetachedFromTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfoPayload {
    #[serde(rename = "targetId")]
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameNavigatedParams {
    frame: FramePayload,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    #[serde(rename = "parentId")]
    parent_id: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RequestWillBeSentParams {
    #[serde(rename = "requestId")]
    request_id: String,
    request: RequestPayload,
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    method: String,
}

#[derive(Debug, Deserialize)]
struct ResponseReceivedParams {
    #[serde(rename = "requestId")]
    request_id: String,
    response: ResponsePayload,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    url: String,
    status: i64,
}

#[derive(Debug, Deserialize)]
struct RequestSettledParams {
    #[serde(rename = "requestId")]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct ExceptionThrownParams {
    #[serde(rename = "exceptionDetails")]
    exception_details: ExceptionDetails,
}

#[derive(Debug, Deserialize)]
struct ExceptionDetails {
    text: Option<String>,
    exception: Option<ExceptionObject>,
}

#[derive(Debug, Deserialize)]
struct ExceptionObject {
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct MockTransport {
        started: AtomicBool,
        shutdowns: AtomicUsize,
        rx: Mutex<mpsc::Receiver<TransportEvent>>,
        commands: Mutex<Vec<(String, Value)>>,
        responses: Mutex<VecDeque<Value>>,
    }

    impl MockTransport {
        fn new_pair() -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
            let (tx, rx) = mpsc::channel(16);
            (
                Arc::new(Self {
                    started: AtomicBool::new(false),
                    shutdowns: AtomicUsize::new(0),
                    rx: Mutex::new(rx),
                    commands: Mutex::new(Vec::new()),
                    responses: Mutex::new(VecDeque::new()),
                }),
                tx,
            )
        }

        async fn commands(&self) -> Vec<(String, Value)> {
            self.commands.lock().await.clone()
        }

        async fn set_response(&self, value: Value) {
            self.responses.lock().await.push_back(value);
        }
    }

    #[async_trait]
    impl CdpTransport for MockTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            let mut guard = self.rx.lock().await;
            guard.recv().await
        }

        async fn send_command(
            &self,
            _target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.commands
                .lock()
                .await
                .push((method.to_string(), params));
            Ok(self
                .responses
                .lock()
                .await
                .pop_front()
                .unwrap_or(Value::Null))
        }

        async fn shutdown(&self) -> Result<(), AdapterError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn started_adapter() -> (
        Arc<CdpAdapter>,
        Arc<MockTransport>,
        mpsc::Sender<TransportEvent>,
        broadcast::Receiver<RawEvent>,
    ) {
        let (bus, rx) = crate::event_bus(32);
        let (transport, tx) = MockTransport::new_pair();
        let adapter = Arc::new(CdpAdapter::with_transport(
            CdpConfig::default(),
            bus,
            transport.clone() as Arc<dyn CdpTransport>,
        ));
        Arc::clone(&adapter).start().await.expect("start adapter");
        assert!(transport.started.load(Ordering::SeqCst));
        (adapter, transport, tx, rx)
    }

    fn attached_page(adapter: &CdpAdapter) -> PageId {
        let page = PageId::new();
        adapter.register_page(
            page,
            SessionId::new(),
            Some("target-1".into()),
            Some("session-1".into()),
        );
        page
    }

    #[tokio::test]
    async fn lost_connection_drops_pages_and_reports_once() {
        let (adapter, _transport, tx, mut rx) = started_adapter().await;
        let page = attached_page(&adapter);
        drop(tx);

        let mut saw_close = false;
        let message = loop {
            let event = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("event before timeout")
                .expect("bus open");
            match event {
                RawEvent::PageLifecycle { page: closed, phase, .. } if phase == "closed" => {
                    assert_eq!(closed, page);
                    saw_close = true;
                }
                RawEvent::Error { page: None, message } => break message,
                _ => {}
            }
        };
        assert!(saw_close);
        assert_eq!(message, "cdp transport lost; open pages were dropped");
        assert!(adapter.registry.is_empty());
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn create_page_waits_for_attach_and_enables_domains() {
        let (adapter, transport, tx, _rx) = started_adapter().await;
        transport.set_response(json!({ "targetId": "t-9" })).await;

        let creating = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.create_page("about:blank").await })
        };

        tx.send(TransportEvent {
            method: "Target.targetCreated".into(),
            params: json!({ "targetInfo": { "targetId": "t-9", "type": "page", "url": "about:blank" } }),
            session_id: None,
        })
        .await
        .unwrap();
        tx.send(TransportEvent {
            method: "Target.attachedToTarget".into(),
            params: json!({
                "sessionId": "s-9",
                "targetInfo": { "targetId": "t-9", "type": "page" }
            }),
            session_id: None,
        })
        .await
        .unwrap();

        let page = timeout(Duration::from_secs(2), creating)
            .await
            .expect("create_page finished")
            .expect("join")
            .expect("page created");
        assert_eq!(adapter.registry.cdp_session(&page).as_deref(), Some("s-9"));

        let methods: Vec<String> = transport
            .commands()
            .await
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(
            methods,
            vec![
                "Target.createTarget",
                "Page.enable",
                "Network.enable",
                "Runtime.enable"
            ]
        );

        adapter.shutdown().await;
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigate_and_screenshot_route_through_session() {
        let (adapter, transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);

        transport.set_response(json!({ "frameId": "f" })).await;
        transport
            .set_response(json!({ "result": { "value": "complete" } }))
            .await;
        adapter
            .navigate(page, "https://example.com", Duration::from_secs(5))
            .await
            .expect("navigate through transport");
        assert_eq!(
            adapter.registry.last_url(&page).as_deref(),
            Some("https://example.com")
        );

        transport
            .set_response(json!({ "data": STANDARD.encode("img") }))
            .await;
        let bytes = adapter
            .screenshot(page, Duration::from_secs(5))
            .await
            .expect("screenshot through transport");
        assert_eq!(bytes, b"img");

        let commands = transport.commands().await;
        assert!(commands.iter().any(|(method, _)| method == "Page.navigate"));
        assert!(commands
            .iter()
            .any(|(method, _)| method == "Page.captureScreenshot"));

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn navigate_surfaces_error_text() {
        let (adapter, transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);

        transport
            .set_response(json!({ "frameId": "f", "errorText": "net::ERR_NAME_NOT_RESOLVED" }))
            .await;
        let err = adapter
            .navigate(page, "https://nowhere.invalid", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn network_events_feed_response_log() {
        let (adapter, _transport, _tx, mut rx) = started_adapter().await;
        let page = attached_page(&adapter);
        let mark = adapter.response_mark(&page);
        let session = Some("session-1".to_string());

        adapter
            .handle_event(TransportEvent {
                method: "Network.requestWillBeSent".into(),
                params: json!({ "requestId": "r1", "request": { "method": "POST", "url": "https://x.test/SaveImportFiles" } }),
                session_id: session.clone(),
            })
            .await;
        assert_eq!(adapter.network_snapshot(&page).unwrap().inflight, 1);

        adapter
            .handle_event(TransportEvent {
                method: "Network.responseReceived".into(),
                params: json!({ "requestId": "r1", "response": { "url": "https://x.test/SaveImportFiles", "status": 200 } }),
                session_id: session.clone(),
            })
            .await;
        adapter
            .handle_event(TransportEvent {
                method: "Network.loadingFinished".into(),
                params: json!({ "requestId": "r1" }),
                session_id: session,
            })
            .await;

        let responses = adapter.responses_since(&page, mark);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, 200);
        assert_eq!(responses[0].method.as_deref(), Some("POST"));
        assert_eq!(adapter.network_snapshot(&page).unwrap().inflight, 0);

        let observed = timeout(Duration::from_millis(500), async {
            loop {
                if let Ok(RawEvent::ResponseObserved { status, .. }) = rx.recv().await {
                    break status;
                }
            }
        })
        .await
        .expect("response event");
        assert_eq!(observed, 200);

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn main_frame_navigation_updates_last_url() {
        let (adapter, _transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);

        adapter
            .handle_event(TransportEvent {
                method: "Page.frameNavigated".into(),
                params: json!({ "frame": { "id": "child", "parentId": "main", "url": "https://x.test/frame" } }),
                session_id: Some("session-1".into()),
            })
            .await;
        assert!(adapter.registry.last_url(&page).is_none());

        adapter
            .handle_event(TransportEvent {
                method: "Page.frameNavigated".into(),
                params: json!({ "frame": { "id": "main", "url": "https://x.test/Admin/App/42" } }),
                session_id: Some("session-1".into()),
            })
            .await;
        assert_eq!(
            adapter.registry.last_url(&page).as_deref(),
            Some("https://x.test/Admin/App/42")
        );

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn wait_basic_network_quiet_times_out_while_busy() {
        let (adapter, _transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);
        adapter.network.on_request(page, "r1", "GET");

        let err = adapter
            .wait_basic(
                page,
                WaitGate::NetworkQuiet {
                    window_ms: 0,
                    max_inflight: 0,
                },
                Duration::from_millis(250),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NavTimeout);

        adapter.network.on_settled(page, "r1");
        adapter
            .wait_basic(
                page,
                WaitGate::NetworkQuiet {
                    window_ms: 0,
                    max_inflight: 0,
                },
                Duration::from_millis(250),
            )
            .await
            .expect("quiet once settled");

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn input_commands_carry_coordinates_and_files() {
        let (adapter, transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);

        adapter
            .dispatch_mouse(page, MousePhase::Pressed, Anchor::new(42.0, 24.0))
            .await
            .unwrap();
        adapter.insert_text(page, "Vendors").await.unwrap();
        adapter
            .set_file_input_files(page, "obj-1", &[PathBuf::from("/tmp/vendors.csv")])
            .await
            .unwrap();

        let commands = transport.commands().await;
        let (_, pressed) = &commands[0];
        assert_eq!(pressed["type"], "mousePressed");
        assert_eq!(pressed["x"].as_f64(), Some(42.0));
        assert_eq!(pressed["clickCount"], 1);
        assert_eq!(commands[1].1["text"], "Vendors");
        assert_eq!(commands[2].0, "DOM.setFileInputFiles");
        assert_eq!(commands[2].1["objectId"], "obj-1");
        assert_eq!(commands[2].1["files"][0], "/tmp/vendors.csv");

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn evaluate_script_maps_exceptions() {
        let (adapter, transport, _tx, _rx) = started_adapter().await;
        let page = attached_page(&adapter);

        transport
            .set_response(json!({ "exceptionDetails": { "text": "boom" } }))
            .await;
        let err = adapter.evaluate_script(page, "throw 1").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Script);

        transport
            .set_response(json!({ "result": { "type": "object", "subtype": "null" } }))
            .await;
        assert!(adapter
            .evaluate_handle(page, "null")
            .await
            .unwrap()
            .is_none());

        adapter.shutdown().await;
    }
}
