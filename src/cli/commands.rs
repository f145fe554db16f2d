use clap::Subcommand;

use super::analyze::AnalyzeArgs;
use super::assist::{CompleteArgs, WriteArgs};
use super::config::ConfigArgs;
use super::provision::{ImportArgs, ProvisionArgs, ReportArgs};
use super::reference::{CitationsArgs, ControlArgs, MapControlArgs};

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Infer a column schema from a CSV sample
    Analyze(AnalyzeArgs),

    /// Create an application, import a CSV into it and build its report
    Provision(ProvisionArgs),

    /// Import a CSV into an existing application, then build its report
    Import(ImportArgs),

    /// Build the saved report for an existing application
    Report(ReportArgs),

    /// List the compliance citations (cached on disk)
    Citations(CitationsArgs),

    /// Fetch a random control record
    Control(ControlArgs),

    /// Map a control onto the citations with the model
    MapControl(MapControlArgs),

    /// Continue a piece of text
    Complete(CompleteArgs),

    /// Draft HTML content from a prompt
    Write(WriteArgs),

    /// Manage configuration
    Config(ConfigArgs),
}
