//! Provisioning error types

use action_primitives::ActionError;
use grc_core_types::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A page interaction failed or an expected element never appeared
    #[error("{step}: {source}")]
    Action {
        step: &'static str,
        #[source]
        source: ActionError,
    },

    /// The page landed somewhere other than the expected route
    #[error("{step}: unexpected route '{url}'")]
    Route { step: &'static str, url: String },

    /// Input rejected before any browser work
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Completion was never observed within the poll budget
    #[error("Import completion not observed after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn action(step: &'static str) -> impl FnOnce(ActionError) -> Self {
        move |source| ProvisionError::Action { step, source }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ProvisionError::TimedOut { .. } => true,
            ProvisionError::Action { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ProvisionError::Action {
                source: ActionError::Interrupted(_),
                ..
            }
        )
    }
}

impl From<CoreError> for ProvisionError {
    fn from(err: CoreError) -> Self {
        ProvisionError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
