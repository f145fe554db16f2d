use std::path::{Path, PathBuf};

use agent_core::{sample_rows, DEFAULT_SAMPLE_ROWS};
use anyhow::{Context, Result};
use clap::Args;
use grc_core_types::ImportAnalysisResult;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use super::output::emit;
use crate::errors::CopilotError;

#[derive(Args, Clone, Debug)]
pub struct AnalyzeArgs {
    /// CSV file to sample
    #[arg(value_name = "CSV")]
    pub file: PathBuf,

    #[command(flatten)]
    pub source: AnalysisSource,

    /// Write the analysis as JSON for later `provision --analysis`
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
}

/// Where a command gets its column schema from.
#[derive(Args, Clone, Debug, Default)]
pub struct AnalysisSource {
    /// Application name (defaults to the CSV file stem)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Saved analysis JSON; skips the model call
    #[arg(long, value_name = "FILE")]
    pub analysis: Option<PathBuf>,

    /// Rows sent to the model, header included
    #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,
}

pub async fn cmd_analyze(args: AnalyzeArgs, ctx: &CliContext) -> Result<()> {
    let bytes = fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let analysis = resolve_analysis(ctx, &args.source, Some((&args.file, &bytes))).await?;

    if let Some(path) = &args.save {
        let json = serde_json::to_string_pretty(&analysis)?;
        fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "analysis saved");
    }

    emit(ctx.output(), &analysis, print_analysis)
}

/// Loads the saved analysis when one is given, otherwise infers it from the
/// CSV sample. An empty inference result is an error.
pub async fn resolve_analysis(
    ctx: &CliContext,
    source: &AnalysisSource,
    csv: Option<(&Path, &[u8])>,
) -> Result<ImportAnalysisResult> {
    if let Some(path) = &source.analysis {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut analysis: ImportAnalysisResult = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        if let Some(name) = &source.name {
            analysis.application_name = name.clone();
        }
        analysis
            .ensure_columns()
            .map_err(|_| CopilotError::EmptyAnalysis(analysis.application_name.clone()))?;
        return Ok(analysis);
    }

    let Some((path, bytes)) = csv else {
        return Err(CopilotError::Config(
            "either --analysis or a CSV file is required".into(),
        )
        .into());
    };
    let name = match &source.name {
        Some(name) => name.clone(),
        None => application_name_for(path)?,
    };
    let rows = sample_rows(bytes, source.sample_rows.max(1)).map_err(CopilotError::from)?;
    let analysis = ctx.inferencer()?.infer(&name, &rows).await;
    if analysis.is_empty() {
        return Err(CopilotError::EmptyAnalysis(name).into());
    }
    info!(application = %analysis.application_name, columns = analysis.columns.len(), "schema inferred");
    Ok(analysis)
}

fn application_name_for(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CopilotError::Config(format!(
                "cannot derive an application name from {}; pass --name",
                path.display()
            ))
            .into()
        })
}

pub fn print_analysis(analysis: &ImportAnalysisResult) {
    println!("Application: {}", analysis.application_name);
    for column in &analysis.columns {
        println!(
            "  {:<24} {:<7} {}",
            column.name,
            column.column_type.as_str(),
            column.description
        );
    }
}
