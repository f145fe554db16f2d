//! GRC copilot command-line application.
//!
//! Wires configuration, logging and the workspace crates into the
//! `grc-copilot` binary:
//!
//! * `agent-core` for schema inference and the writing features,
//! * `platform-api` for citations and controls,
//! * `provisioning` (over `action-primitives`) for the browser workflows.

pub mod cli;
pub mod config;
pub mod errors;

pub use config::{resolve_config_path, AppConfig};
pub use errors::{exit_code, CopilotError};
