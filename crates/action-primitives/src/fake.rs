//! Deterministic [`PageDriver`] for workflow tests.
//!
//! Behaviour is scripted per locator, keyed on the locator's display form, so
//! tests read the same way the workflows do.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cdp_adapter::ResponseRecord;

use crate::errors::ActionError;
use crate::locator::Locator;
use crate::page::{PageDriver, PageFactory};
use crate::types::{ElementState, ExecCtx, FilePayload, ResponseMark, ResponseMatcher, UrlPattern};
use crate::waiting::poll_until;

/// One recorded interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageAction {
    Goto(String),
    Click(String),
    Fill { locator: String, text: String },
    Select { locator: String, label: String },
    Upload { locator: String, file_name: String, len: usize },
    Drag { source: String, target: String },
    WaitFor { locator: String, state: ElementState },
    WaitForUrl(String),
    WaitForResponse(String),
    NetworkIdle,
    Screenshot,
    Close,
}

#[derive(Default)]
struct State {
    url: String,
    actions: Vec<PageAction>,
    navigations: HashMap<String, VecDeque<String>>,
    texts: HashMap<String, VecDeque<Vec<String>>>,
    counts: HashMap<String, usize>,
    triggers: HashMap<String, Vec<(String, String, i64)>>,
    failures: HashMap<String, ActionError>,
    missing: HashSet<String>,
    hides: HashMap<String, Vec<String>>,
    reveals: HashMap<String, Vec<String>>,
    responses: Vec<ResponseRecord>,
    next_seq: u64,
    closed: bool,
}

impl State {
    fn record(&mut self, action: PageAction) {
        self.actions.push(action);
    }

    fn take_failure(&mut self, key: &str) -> Result<(), ActionError> {
        match self.failures.remove(key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Side effects of interacting with `key`: queued navigation and responses.
    fn fire(&mut self, key: &str) {
        if let Some(url) = self.navigations.get_mut(key).and_then(VecDeque::pop_front) {
            self.url = url;
        }
        if let Some(hidden) = self.hides.get(key).cloned() {
            self.missing.extend(hidden);
        }
        if let Some(revealed) = self.reveals.get(key).cloned() {
            for target in revealed {
                self.missing.remove(&target);
            }
        }
        if let Some(triggers) = self.triggers.get(key).cloned() {
            for (url, method, status) in triggers {
                self.next_seq += 1;
                self.responses.push(ResponseRecord {
                    seq: self.next_seq,
                    url,
                    method: Some(method),
                    status,
                });
            }
        }
    }
}

/// Scriptable in-memory page. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<Mutex<State>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_url(&self, url: impl Into<String>) -> &Self {
        self.state().url = url.into();
        self
    }

    /// Each interaction with `locator` moves the page to the next queued URL.
    pub fn navigate_on_click(&self, locator: &Locator, url: impl Into<String>) -> &Self {
        self.state()
            .navigations
            .entry(locator.to_string())
            .or_default()
            .push_back(url.into());
        self
    }

    /// Successive `texts` reads return successive entries; the last one sticks.
    pub fn texts_for(&self, locator: &Locator, reads: Vec<Vec<String>>) -> &Self {
        self.state()
            .texts
            .insert(locator.to_string(), reads.into_iter().collect());
        self
    }

    pub fn count_for(&self, locator: &Locator, count: usize) -> &Self {
        self.state().counts.insert(locator.to_string(), count);
        self
    }

    /// Interacting with `locator` emits a response.
    pub fn push_response_on(
        &self,
        locator: &Locator,
        url: impl Into<String>,
        method: impl Into<String>,
        status: i64,
    ) -> &Self {
        self.state()
            .triggers
            .entry(locator.to_string())
            .or_default()
            .push((url.into(), method.into(), status));
        self
    }

    /// The next interaction with `locator` fails with `err`.
    pub fn fail_on(&self, locator: &Locator, err: ActionError) -> &Self {
        self.state().failures.insert(locator.to_string(), err);
        self
    }

    /// Lookups of `locator` wait until the deadline.
    pub fn missing(&self, locator: &Locator) -> &Self {
        self.state().missing.insert(locator.to_string());
        self
    }

    pub fn reveal(&self, locator: &Locator) -> &Self {
        self.state().missing.remove(&locator.to_string());
        self
    }

    /// Interacting with `trigger` hides `target`.
    pub fn hide_on_click(&self, trigger: &Locator, target: &Locator) -> &Self {
        self.state()
            .hides
            .entry(trigger.to_string())
            .or_default()
            .push(target.to_string());
        self
    }

    /// Interacting with `trigger` reveals `target`.
    pub fn reveal_on_click(&self, trigger: &Locator, target: &Locator) -> &Self {
        self.state()
            .reveals
            .entry(trigger.to_string())
            .or_default()
            .push(target.to_string());
        self
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.state().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Resolves a lookup: immediate when present, a full wait when missing.
    async fn lookup(&self, ctx: &ExecCtx, locator: &Locator) -> Result<String, ActionError> {
        locator.validate()?;
        let key = locator.to_string();
        let this = self;
        let probe_key = key.clone();
        poll_until(
            ctx,
            || ActionError::AnchorNotFound(locator.to_string()),
            move || {
                let present = !this.state().missing.contains(&probe_key);
                async move { Ok(present.then_some(())) }
            },
        )
        .await?;
        Ok(key)
    }

    fn interact(&self, key: &str, action: PageAction) -> Result<(), ActionError> {
        let mut state = self.state();
        state.take_failure(key)?;
        state.record(action);
        state.fire(key);
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, ctx: &ExecCtx, url: &str) -> Result<(), ActionError> {
        ctx.ensure_live("goto")?;
        let mut state = self.state();
        state.record(PageAction::Goto(url.to_string()));
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.state().url.clone())
    }

    async fn click(&self, ctx: &ExecCtx, locator: &Locator) -> Result<(), ActionError> {
        let key = self.lookup(ctx, locator).await?;
        self.interact(&key, PageAction::Click(key.clone()))
    }

    async fn fill(&self, ctx: &ExecCtx, locator: &Locator, text: &str) -> Result<(), ActionError> {
        let key = self.lookup(ctx, locator).await?;
        self.interact(
            &key,
            PageAction::Fill {
                locator: key.clone(),
                text: text.to_string(),
            },
        )
    }

    async fn select_option(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        label: &str,
    ) -> Result<(), ActionError> {
        let key = self.lookup(ctx, locator).await?;
        self.interact(
            &key,
            PageAction::Select {
                locator: key.clone(),
                label: label.to_string(),
            },
        )
    }

    async fn set_input_files(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        file: &FilePayload,
    ) -> Result<(), ActionError> {
        let key = self.lookup(ctx, locator).await?;
        self.interact(
            &key,
            PageAction::Upload {
                locator: key.clone(),
                file_name: file.file_name.clone(),
                len: file.bytes.len(),
            },
        )
    }

    async fn drag_to(
        &self,
        ctx: &ExecCtx,
        source: &Locator,
        target: &Locator,
    ) -> Result<(), ActionError> {
        let from = self.lookup(ctx, source).await?;
        let to = self.lookup(ctx, target).await?;
        self.interact(
            &from,
            PageAction::Drag {
                source: from.clone(),
                target: to,
            },
        )
    }

    async fn wait_for(
        &self,
        ctx: &ExecCtx,
        locator: &Locator,
        state: ElementState,
    ) -> Result<(), ActionError> {
        let key = locator.to_string();
        self.state().record(PageAction::WaitFor {
            locator: key.clone(),
            state,
        });
        match state {
            ElementState::Visible => self.lookup(ctx, locator).await.map(|_| ()),
            ElementState::Hidden => {
                let this = self;
                let probe_key = key.clone();
                poll_until(
                    ctx,
                    || ActionError::WaitTimeout(format!("{key} still visible")),
                    move || {
                        let hidden = this.state().missing.contains(&probe_key);
                        async move { Ok(hidden.then_some(())) }
                    },
                )
                .await
            }
        }
    }

    async fn count(&self, locator: &Locator) -> Result<usize, ActionError> {
        let key = locator.to_string();
        let state = self.state();
        if state.missing.contains(&key) {
            return Ok(0);
        }
        Ok(state.counts.get(&key).copied().unwrap_or(1))
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, ActionError> {
        let mut state = self.state();
        let Some(reads) = state.texts.get_mut(&locator.to_string()) else {
            return Ok(Vec::new());
        };
        let texts = if reads.len() > 1 {
            reads.pop_front().unwrap_or_default()
        } else {
            reads.front().cloned().unwrap_or_default()
        };
        Ok(texts)
    }

    async fn wait_for_url(
        &self,
        ctx: &ExecCtx,
        pattern: &UrlPattern,
    ) -> Result<String, ActionError> {
        self.state()
            .record(PageAction::WaitForUrl(pattern.as_str().to_string()));
        let this = self;
        poll_until(
            ctx,
            || {
                ActionError::NavTimeout(format!(
                    "url never matched {pattern}; last seen '{}'",
                    this.state().url
                ))
            },
            move || {
                let url = this.state().url.clone();
                async move { Ok(pattern.is_match(&url).then_some(url)) }
            },
        )
        .await
    }

    fn response_mark(&self) -> ResponseMark {
        ResponseMark(self.state().next_seq)
    }

    async fn wait_for_response(
        &self,
        ctx: &ExecCtx,
        mark: ResponseMark,
        matcher: &ResponseMatcher,
    ) -> Result<ResponseRecord, ActionError> {
        self.state()
            .record(PageAction::WaitForResponse(matcher.to_string()));
        let this = self;
        poll_until(
            ctx,
            || ActionError::WaitTimeout(format!("no response matching {matcher}")),
            move || {
                let found = this
                    .state()
                    .responses
                    .iter()
                    .find(|record| record.seq > mark.0 && matcher.matches(record))
                    .cloned();
                async move { Ok(found) }
            },
        )
        .await
    }

    async fn wait_for_network_idle(&self, ctx: &ExecCtx) -> Result<(), ActionError> {
        ctx.ensure_live("network idle")?;
        self.state().record(PageAction::NetworkIdle);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ActionError> {
        self.state().record(PageAction::Screenshot);
        Ok(b"\x89PNG\r\n\x1a\nscripted".to_vec())
    }

    async fn close(&self) -> Result<(), ActionError> {
        let mut state = self.state();
        if !state.closed {
            state.closed = true;
            state.record(PageAction::Close);
        }
        Ok(())
    }
}

/// Hands out clones of one [`ScriptedPage`] and counts opens.
#[derive(Clone, Default)]
pub struct ScriptedPageFactory {
    page: ScriptedPage,
    opens: Arc<AtomicUsize>,
    open_error: Arc<Mutex<Option<ActionError>>>,
}

impl ScriptedPageFactory {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn page(&self) -> &ScriptedPage {
        &self.page
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The next `open` fails with `err`.
    pub fn fail_open(&self, err: ActionError) {
        if let Ok(mut slot) = self.open_error.lock() {
            *slot = Some(err);
        }
    }
}

#[async_trait]
impl PageFactory for ScriptedPageFactory {
    async fn open(&self) -> Result<Box<dyn PageDriver>, ActionError> {
        if let Some(err) = self.open_error.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(err);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.page.clone()))
    }
}
