//! DevTools websocket transport.
//!
//! One [`ChromiumTransport`] owns one browser for its whole life. A single I/O
//! task multiplexes outgoing calls, incoming responses and events, and a
//! keep-alive probe. A dropped connection is reported, never silently
//! replaced: the page state a workflow built up would be gone.

use std::collections::HashMap;
use std::convert::TryInto;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::launch;

const CALL_QUEUE: usize = 128;
const EVENT_QUEUE: usize = 512;
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// A keep-alive probe still unanswered after this long marks the link dead.
const HEARTBEAT_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;

    /// Tear the browser down. Transports that do not own a process can ignore it.
    async fn shutdown(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<BrowserLink>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn link(&self) -> Result<Arc<BrowserLink>, AdapterError> {
        match self.link.lock().await.as_ref() {
            Some(link) if link.is_alive() => Ok(Arc::clone(link)),
            Some(_) => Err(connection_lost()),
            None => Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("transport used before start")),
        }
    }
}

fn connection_lost() -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint("browser connection lost")
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        let link = {
            let mut slot = self.link.lock().await;
            match slot.as_ref() {
                Some(link) if link.is_alive() => return Ok(()),
                Some(_) => return Err(connection_lost()),
                None => {
                    let link = Arc::new(BrowserLink::connect(&self.cfg).await?);
                    *slot = Some(Arc::clone(&link));
                    link
                }
            }
        };

        let deadline = self.deadline();
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            deadline,
        )
        .await?;
        link.call(
            CommandTarget::Browser,
            "Target.setAutoAttach",
            json!({ "autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true }),
            deadline,
        )
        .await?;
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                debug!(target: "cdp-transport", %err, "no events: link unavailable");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .call(target, method, params, self.deadline())
            .await
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        let Some(link) = self.link.lock().await.take() else {
            return Ok(());
        };
        if link.is_alive() {
            // chromium may drop the socket before it answers
            let _ = link
                .call(CommandTarget::Browser, "Browser.close", json!({}), CLOSE_GRACE)
                .await;
        }
        link.kill_child().await;
        Ok(())
    }
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// Live websocket to one browser plus the child process when we launched it.
struct BrowserLink {
    calls: mpsc::Sender<Call>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    io_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl BrowserLink {
    async fn connect(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (mut child, ws_url) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let (child, url) = launch::spawn_browser(cfg).await?;
                (Some(child), url)
            }
        };

        let conn = match Connection::<CdpEventMessage>::connect(&ws_url).await {
            Ok(conn) => conn,
            Err(err) => {
                if let Some(child) = child.as_mut() {
                    let _ = child.kill().await;
                }
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("connecting to {ws_url}: {err}")));
            }
        };

        let (calls_tx, calls_rx) = mpsc::channel(CALL_QUEUE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let alive = Arc::new(AtomicBool::new(true));
        let heartbeat = Some(Duration::from_millis(cfg.heartbeat_interval_ms))
            .filter(|period| !period.is_zero());

        let flag = Arc::clone(&alive);
        let io_task = tokio::spawn(async move {
            let outcome = pump(conn, calls_rx, events_tx, heartbeat).await;
            flag.store(false, Ordering::Relaxed);
            match outcome {
                Ok(()) => debug!(target: "cdp-transport", "connection closed"),
                Err(err) => error!(target: "cdp-transport", %err, "connection failed"),
            }
        });

        info!(target: "cdp-transport", url = %ws_url, launched = child.is_some(), "connected to chromium");
        Ok(Self {
            calls: calls_tx,
            events: Mutex::new(events_rx),
            io_task,
            child: Mutex::new(child),
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        let (reply, answer) = oneshot::channel();
        let call = Call {
            target,
            method: method.to_string(),
            params,
            reply,
        };
        self.calls.send(call).await.map_err(|_| connection_lost())?;

        match tokio::time::timeout(deadline, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(connection_lost()),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} unanswered after {deadline:?}"))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    async fn kill_child(&self) {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(target: "cdp-transport", ?err, "chromium already exited");
            }
        }
    }
}

impl Drop for BrowserLink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.io_task.abort();
        let Some(mut child) = self.child.try_lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to kill chromium");
                    }
                });
            }
            Err(_) => warn!(target: "cdp-transport", "no runtime left to kill chromium"),
        }
    }
}

/// Runs until the browser hangs up, the link is dropped or a keep-alive goes
/// unanswered. Pending calls are failed on the way out.
async fn pump(
    mut conn: Connection<CdpEventMessage>,
    mut calls: mpsc::Receiver<Call>,
    events: mpsc::Sender<TransportEvent>,
    heartbeat: Option<Duration>,
) -> Result<(), AdapterError> {
    let mut pending: HashMap<CallId, Reply> = HashMap::new();
    let mut ticker = heartbeat.map(|period| {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    let mut probe: Option<(CallId, Instant)> = None;

    let outcome = loop {
        tokio::select! {
            call = calls.recv() => {
                let Some(call) = call else { break Ok(()) };
                let session = match call.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
                };
                let method: MethodId = call.method.into();
                match conn.submit_command(method, session, call.params) {
                    Ok(id) => {
                        pending.insert(id, call.reply);
                    }
                    Err(err) => {
                        let err = AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string());
                        let _ = call.reply.send(Err(err.clone()));
                        break Err(err);
                    }
                }
            }
            _ = tick(&mut ticker) => {
                if let Some((_, sent)) = probe {
                    if sent.elapsed() > HEARTBEAT_GRACE {
                        break Err(AdapterError::new(AdapterErrorKind::CdpIo)
                            .with_hint("keep-alive probe unanswered"));
                    }
                    continue;
                }
                match conn.submit_command("Browser.getVersion".to_string().into(), None, json!({})) {
                    Ok(id) => probe = Some((id, Instant::now())),
                    Err(err) => break Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(err.to_string())),
                }
            }
            message = conn.next() => match message {
                Some(Ok(Message::Response(resp))) => {
                    if probe.as_ref().is_some_and(|(id, _)| *id == resp.id) {
                        probe = None;
                        continue;
                    }
                    let error = resp.error.map(|err| (err.code, err.message));
                    if let Some(reply) = pending.remove(&resp.id) {
                        let _ = reply.send(payload(resp.result, error));
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    if let Err(err) = forward(event, &events).await {
                        warn!(target: "cdp-transport", %err, "event dropped");
                    }
                }
                Some(Err(err)) => break Err(map_cdp_error(err)),
                None => break Ok(()),
            }
        }
    };

    let reason = match &outcome {
        Ok(()) => connection_lost(),
        Err(err) => err.clone(),
    };
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(reason.clone()));
    }
    outcome
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn forward(
    event: CdpEventMessage,
    events: &mpsc::Sender<TransportEvent>,
) -> Result<(), AdapterError> {
    let raw: CdpJsonEventMessage = event.try_into().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("undecodable event: {err}"))
    })?;
    events
        .send(TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        })
        .await
        .map_err(|_| AdapterError::new(AdapterErrorKind::Internal).with_hint("event consumer gone"))
}

/// Result of one command reply. Server-side failures (code >= 500) may be
/// retried.
fn payload(result: Option<Value>, error: Option<(i64, String)>) -> Result<Value, AdapterError> {
    match (result, error) {
        (Some(result), _) => Ok(result),
        (None, Some((code, message))) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {code}: {message}"))
            .retriable(code >= 500)),
        (None, None) => {
            Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response"))
        }
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    let kind = match err {
        CdpError::Timeout => AdapterErrorKind::NavTimeout,
        CdpError::LaunchExit(..) | CdpError::LaunchTimeout(..) | CdpError::LaunchIo(..) => {
            AdapterErrorKind::Launch
        }
        CdpError::Serde(_) | CdpError::JavascriptException(_) | CdpError::FrameNotFound(_) => {
            AdapterErrorKind::Internal
        }
        _ => AdapterErrorKind::CdpIo,
    };
    let retriable = matches!(kind, AdapterErrorKind::NavTimeout | AdapterErrorKind::CdpIo);
    AdapterError::new(kind).with_hint(hint).retriable(retriable)
}
