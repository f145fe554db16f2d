//! Failures a [`crate::page::PageDriver`] call can end in.

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("page load timed out: {0}")]
    NavTimeout(String),

    /// A locator or network wait ran past its deadline.
    #[error("timed out waiting: {0}")]
    WaitTimeout(String),

    /// The run's cancellation token fired.
    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("no element matched {0}")]
    AnchorNotFound(String),

    /// A select or listbox had no entry with the requested label.
    #[error("no option labelled {0}")]
    OptionNotFound(String),

    #[error("element cannot be used: {0}")]
    NotInteractable(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("could not start the browser: {0}")]
    Launch(String),

    #[error("browser connection failed: {0}")]
    CdpIo(String),

    #[error("file i/o failed: {0}")]
    Io(String),

    #[error("{0}")]
    Internal(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::WaitTimeout(_) | ActionError::CdpIo(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::NavTimeout(_) | ActionError::AnchorNotFound(_)
        )
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::Launch => ActionError::Launch(message),
            AdapterErrorKind::TargetNotFound => ActionError::AnchorNotFound(message),
            AdapterErrorKind::Script => ActionError::Script(message),
            AdapterErrorKind::Internal => ActionError::Internal(message),
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        ActionError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_kinds_map_onto_action_errors() {
        let err: ActionError = AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint("slow")
            .into();
        assert!(matches!(err, ActionError::NavTimeout(ref m) if m.contains("slow")));
        assert!(err.is_timeout());

        let err: ActionError = AdapterError::new(AdapterErrorKind::CdpIo).into();
        assert!(err.is_retryable());
    }
}
