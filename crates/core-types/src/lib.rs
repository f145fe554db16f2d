//! Shared domain types for the GRC copilot crates.
//!
//! Everything in here is plain data: the inferred import schema that travels
//! between provisioning phases, the compliance reference records pulled from
//! the record platform, and the identifiers used to correlate work.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

mod import_job;
mod reference;
mod schema;

pub use import_job::ImportJobName;
pub use reference::{Citation, Control};
pub use schema::{ColumnSchema, ColumnType, ImportAnalysisResult};

/// Errors raised while validating shared domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("import analysis for '{0}' has no columns")]
    EmptySchema(String),

    #[error("unknown column type tag '{0}'")]
    UnknownColumnType(String),

    #[error("{0}")]
    Message(String),
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Correlates log lines and reports for one top-level operation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
