use anyhow::{Context, Result};
use clap::Args;
use grc_core_types::{Citation, Control};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use super::output::emit;
use crate::errors::CopilotError;

#[derive(Args, Clone, Debug, Default)]
pub struct CitationsArgs {
    /// Drop the cache file and fetch the report again
    #[arg(long)]
    pub refresh: bool,

    /// Only print the first N citations
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ControlArgs {}

#[derive(Args, Clone, Debug, Default)]
pub struct MapControlArgs {
    /// Map this control text instead of a random control
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Serialize)]
struct CitationList {
    total: usize,
    citations: Vec<Citation>,
}

#[derive(Serialize)]
struct ControlMapping {
    control: Control,
    mappings: Vec<Citation>,
}

pub async fn cmd_citations(args: CitationsArgs, ctx: &CliContext) -> Result<()> {
    let service = ctx.reference_service()?;
    if args.refresh {
        let path = &service.config().cache_path;
        match fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "citation cache cleared"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("removing {}", path.display()));
            }
        }
    }

    let mut citations = service
        .get_citations()
        .await
        .map_err(CopilotError::from)
        .context("loading citations")?;
    let total = citations.len();
    if let Some(limit) = args.limit {
        citations.truncate(limit);
    }
    emit(ctx.output(), &CitationList { total, citations }, |list| {
        for citation in &list.citations {
            println!("{:>6}  {}", citation.id, citation.guidance);
        }
        println!("{} citations", list.total);
    })
}

pub async fn cmd_control(_args: ControlArgs, ctx: &CliContext) -> Result<()> {
    let control = ctx
        .reference_service()?
        .get_random_control()
        .await
        .map_err(CopilotError::from)
        .context("looking up a random control")?;
    emit(ctx.output(), &control, print_control)
}

/// Maps a control onto the citation catalogue with the model.
pub async fn cmd_map_control(args: MapControlArgs, ctx: &CliContext) -> Result<()> {
    let assistant = ctx.assistant()?;
    let service = ctx.reference_service()?;
    let control = match args.name {
        Some(name) => Control {
            id: 0.0,
            name,
            citation_ids: Vec::new(),
        },
        None => service
            .get_random_control()
            .await
            .map_err(CopilotError::from)
            .context("looking up a random control")?,
    };
    let citations = service
        .get_citations()
        .await
        .map_err(CopilotError::from)
        .context("loading citations")?;

    let ids = assistant
        .map_control(&control, &citations)
        .await
        .map_err(CopilotError::from)?;
    let mappings = citations
        .into_iter()
        .filter(|citation| ids.contains(&citation.id))
        .collect();
    emit(ctx.output(), &ControlMapping { control, mappings }, |m| {
        print_control(&m.control);
        if m.mappings.is_empty() {
            println!("No matching citations");
        }
        for citation in &m.mappings {
            println!("  -> {:>6}  {}", citation.id, citation.guidance);
        }
    })
}

fn print_control(control: &Control) {
    println!("Control {}: {}", control.id, control.name);
    if !control.citation_ids.is_empty() {
        let ids: Vec<String> = control.citation_ids.iter().map(i64::to_string).collect();
        println!("  citations: {}", ids.join(", "));
    }
}
