//! Top-level error type and process exit codes.

use agent_core::AgentError;
use platform_api::PlatformError;
use provisioning::ProvisionError;
use thiserror::Error;

pub mod exit {
    pub const FAILURE: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const TIMED_OUT: i32 = 4;
    pub const AUTOMATION: i32 = 5;
    pub const PLATFORM: i32 = 6;
    pub const MODEL: i32 = 7;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema inference degraded to zero columns
    #[error("Schema inference returned no columns for '{0}'")]
    EmptyAnalysis(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CopilotError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CopilotError::Config(_) => exit::CONFIG,
            CopilotError::EmptyAnalysis(_) | CopilotError::Agent(_) => exit::MODEL,
            CopilotError::Platform(err) => platform_code(err),
            CopilotError::Provision(err) => provision_code(err),
            CopilotError::Io(_) => exit::FAILURE,
        }
    }
}

fn platform_code(err: &PlatformError) -> i32 {
    match err {
        PlatformError::Config(_) => exit::CONFIG,
        _ => exit::PLATFORM,
    }
}

fn provision_code(err: &ProvisionError) -> i32 {
    if err.is_cancelled() {
        return exit::INTERRUPTED;
    }
    match err {
        ProvisionError::TimedOut { .. } => exit::TIMED_OUT,
        ProvisionError::Config(_) => exit::CONFIG,
        ProvisionError::InvalidInput(_) | ProvisionError::Io(_) => exit::FAILURE,
        ProvisionError::Action { .. } | ProvisionError::Route { .. } => exit::AUTOMATION,
    }
}

/// Exit code for the first recognised error in `err`'s chain.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<CopilotError>() {
            return err.exit_code();
        }
        if let Some(err) = cause.downcast_ref::<ProvisionError>() {
            return provision_code(err);
        }
        if let Some(err) = cause.downcast_ref::<PlatformError>() {
            return platform_code(err);
        }
        if cause.downcast_ref::<AgentError>().is_some() {
            return exit::MODEL;
        }
    }
    exit::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn codes_survive_added_context() {
        let err: anyhow::Error = Err::<(), _>(ProvisionError::TimedOut { attempts: 120 })
            .context("importing vendors.csv")
            .unwrap_err();
        assert_eq!(exit_code(&err), exit::TIMED_OUT);
    }

    #[test]
    fn wrapped_crate_errors_map_through_copilot_error() {
        let err = CopilotError::from(PlatformError::RetriesExhausted { attempts: 50 });
        assert_eq!(err.exit_code(), exit::PLATFORM);
        let err = CopilotError::from(ProvisionError::Config("instance_url is not set".into()));
        assert_eq!(err.exit_code(), exit::CONFIG);
    }

    #[test]
    fn unknown_errors_are_generic_failures() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), exit::FAILURE);
        let err = anyhow::Error::new(CopilotError::EmptyAnalysis("Vendors".into()));
        assert_eq!(exit_code(&err), exit::MODEL);
    }
}
