//! Chromium DevTools Protocol adapter.
//!
//! Launches (or attaches to) a Chromium instance, tracks page targets and their
//! flattened sessions, and exposes the small command surface the locator layer
//! needs: navigation, script evaluation, synthetic input, file inputs, network
//! bookkeeping and screenshots.

use tokio::sync::broadcast;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// One launched (or attached) browser.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct BrowserId(pub Uuid);

    /// A page target as the adapter knows it.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct PageId(pub Uuid);

    /// Adapter-side handle paired with a flattened CDP session.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct SessionId(pub Uuid);

    macro_rules! fresh_id {
        ($($ty:ident),*) => {$(
            impl $ty {
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $ty {
                fn default() -> Self {
                    Self::new()
                }
            }
        )*};
    }

    fresh_id!(BrowserId, PageId, SessionId);
}

pub mod error {
    use std::fmt;

    use thiserror::Error;

    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    pub enum AdapterErrorKind {
        #[error("navigation timed out")]
        NavTimeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("browser launch failed")]
        Launch,
        #[error("target element not found")]
        TargetNotFound,
        #[error("script evaluation failed")]
        Script,
        #[error("internal error")]
        Internal,
    }

    /// Adapter failure with an optional human hint and structured detail.
    #[derive(Clone, Debug)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match &self.hint {
                Some(hint) => write!(f, "{}: {}", self.kind, hint),
                None => write!(f, "{}", self.kind),
            }
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }
    }
}

pub mod events {
    use super::ids::PageId;
    use serde::{Deserialize, Serialize};

    /// What the adapter broadcasts while it follows the browser.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub enum RawEvent {
        PageLifecycle { page: PageId, phase: String, ts: u64 },
        PageNavigated { page: PageId, url: String, ts: u64 },
        ResponseObserved { page: PageId, url: String, status: i64 },
        Error { page: Option<PageId>, message: String },
    }
}

pub mod adapter;
pub mod commands;
pub mod config;
pub mod launch;
pub mod metrics;
pub mod network;
pub mod registry;
pub mod transport;

pub use adapter::{Cdp, CdpAdapter, EventBus};
pub use commands::*;
pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use events::RawEvent;
pub use ids::{BrowserId, PageId, SessionId};
pub use launch::find_chrome;
pub use metrics::AdapterMetricsSnapshot;
pub use network::{NetworkSnapshot, ResponseRecord};
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Broadcast channel the adapter publishes [`RawEvent`]s on.
pub fn event_bus(buffer: usize) -> (EventBus, broadcast::Receiver<RawEvent>) {
    broadcast::channel(buffer)
}
