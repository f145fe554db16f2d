use std::path::{Path, PathBuf};
use std::time::Duration;

use action_primitives::FilePayload;
use anyhow::{Context, Result};
use clap::Args;
use provisioning::ProvisionOutcome;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use super::analyze::{resolve_analysis, AnalysisSource};
use super::context::CliContext;
use super::output::emit;
use crate::errors::CopilotError;

const CSV_MIME: &str = "text/csv";

#[derive(Args, Clone, Debug)]
pub struct ProvisionArgs {
    /// CSV file to import
    #[arg(value_name = "CSV")]
    pub file: PathBuf,

    #[command(flatten)]
    pub source: AnalysisSource,

    /// Overall deadline, e.g. "45m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args, Clone, Debug)]
pub struct ImportArgs {
    /// CSV file to import
    #[arg(value_name = "CSV")]
    pub file: PathBuf,

    /// URL of the application that receives the records
    #[arg(long, value_name = "URL")]
    pub app_url: String,

    #[command(flatten)]
    pub source: AnalysisSource,

    /// Overall deadline, e.g. "45m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Args, Clone, Debug)]
pub struct ReportArgs {
    /// URL of the application to report on
    #[arg(long, value_name = "URL")]
    pub app_url: String,

    /// CSV to infer the columns from when no saved analysis is given
    #[arg(long, value_name = "CSV")]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub source: AnalysisSource,

    /// Overall deadline, e.g. "10m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Serialize)]
struct ReportUrl {
    report_url: String,
}

pub async fn cmd_provision(args: ProvisionArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline(args.timeout)?;
    let (payload, bytes) = read_payload(&args.file).await?;
    let analysis = resolve_analysis(ctx, &args.source, Some((&args.file, &bytes))).await?;

    let outcome = pipeline
        .provision(&analysis, payload)
        .await
        .map_err(CopilotError::from)
        .with_context(|| format!("provisioning '{}'", analysis.application_name))?;
    info!(import_id = outcome.import_id, "provisioning finished");
    emit(ctx.output(), &outcome, print_outcome)
}

pub async fn cmd_import(args: ImportArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline(args.timeout)?;
    let (payload, bytes) = read_payload(&args.file).await?;
    let analysis = resolve_analysis(ctx, &args.source, Some((&args.file, &bytes))).await?;

    let report_url = pipeline
        .create_import(&analysis, &args.app_url, payload)
        .await
        .map_err(CopilotError::from)
        .with_context(|| format!("importing {}", args.file.display()))?;
    emit(ctx.output(), &ReportUrl { report_url }, |r| {
        println!("Report: {}", r.report_url)
    })
}

pub async fn cmd_report(args: ReportArgs, ctx: &CliContext) -> Result<()> {
    let pipeline = ctx.pipeline(args.timeout)?;
    let csv = match &args.file {
        Some(path) => Some((path.clone(), read_bytes(path).await?)),
        None => None,
    };
    let analysis = resolve_analysis(
        ctx,
        &args.source,
        csv.as_ref().map(|(path, bytes)| (path.as_path(), bytes.as_slice())),
    )
    .await?;

    let report_url = pipeline
        .create_report(&analysis, &args.app_url)
        .await
        .map_err(CopilotError::from)
        .with_context(|| format!("building the report for {}", args.app_url))?;
    emit(ctx.output(), &ReportUrl { report_url }, |r| {
        println!("Report: {}", r.report_url)
    })
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn read_payload(path: &Path) -> Result<(FilePayload, Vec<u8>)> {
    let bytes = read_bytes(path).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("import.csv")
        .to_string();
    Ok((FilePayload::new(file_name, CSV_MIME, bytes.clone()), bytes))
}

fn print_outcome(outcome: &ProvisionOutcome) {
    println!("Application: {}", outcome.application_url);
    println!("Import:      {} (#{})", outcome.import_name, outcome.import_id);
    println!("Report:      {}", outcome.report_url);
}
