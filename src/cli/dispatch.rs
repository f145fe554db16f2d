use super::analyze::cmd_analyze;
use super::assist::{cmd_complete, cmd_write};
use super::config::cmd_config;
use super::env::CliArgs;
use super::provision::{cmd_import, cmd_provision, cmd_report};
use super::reference::{cmd_citations, cmd_control, cmd_map_control};
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Analyze(args) => cmd_analyze(args, ctx).await,
        Commands::Provision(args) => cmd_provision(args, ctx).await,
        Commands::Import(args) => cmd_import(args, ctx).await,
        Commands::Report(args) => cmd_report(args, ctx).await,
        Commands::Citations(args) => cmd_citations(args, ctx).await,
        Commands::Control(args) => cmd_control(args, ctx).await,
        Commands::MapControl(args) => cmd_map_control(args, ctx).await,
        Commands::Complete(args) => cmd_complete(args, ctx).await,
        Commands::Write(args) => cmd_write(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
    }
}
