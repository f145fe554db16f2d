//! Browser-driven provisioning on the record platform.
//!
//! The platform has no API for creating applications, imports or reports, so
//! these workflows script its admin UI through the [`action_primitives`]
//! locator capability:
//!
//! * [`ApplicationProvisioner`] creates an application and one field per
//!   inferred column.
//! * [`ImportWorkflow`] creates an import configuration, uploads the file,
//!   runs it and polls the messaging history until it completes.
//! * [`ReportProvisioner`] lays the columns out in a saved report.
//!
//! [`ProvisioningPipeline`] owns the browser session for each top-level
//! operation.

pub mod application;
pub mod config;
pub mod errors;
pub mod import;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod selectors;
pub mod session;

pub use application::{ApplicationProvisioner, CreatedApplication};
pub use config::{DisplayZone, HistoryColumns, ProvisioningConfig};
pub use errors::ProvisionError;
pub use import::{
    completion_matches, parse_history_time, system_clock, Clock, CompletionCriteria, HistoryRow,
    ImportState, ImportWorkflow,
};
pub use pipeline::{ProvisionOutcome, ProvisioningPipeline};
pub use report::ReportProvisioner;
pub use session::Session;
