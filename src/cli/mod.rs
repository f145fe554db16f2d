pub mod analyze;
pub mod assist;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod provision;
pub mod reference;
pub mod runtime;

pub use context::CliContext;
pub use dispatch::dispatch;
pub use env::CliArgs;
pub use output::{LogFormat, OutputFormat};
