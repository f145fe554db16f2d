use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use serde::Serialize;
use tokio::fs;

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::errors::CopilotError;

#[derive(Args, Clone, Debug)]
pub struct CompleteArgs {
    /// Text to continue
    pub input: String,
}

#[derive(Args, Clone, Debug)]
pub struct WriteArgs {
    /// What to write
    pub prompt: String,

    /// Existing HTML to build on
    #[arg(long, value_name = "FILE")]
    pub existing: Option<PathBuf>,
}

#[derive(Serialize)]
struct Completion {
    completion: String,
}

#[derive(Serialize)]
struct Draft {
    content: String,
}

pub async fn cmd_complete(args: CompleteArgs, ctx: &CliContext) -> Result<()> {
    let completion = ctx
        .assistant()?
        .complete(&args.input)
        .await
        .map_err(CopilotError::from)?;
    emit(ctx.output(), &Completion { completion }, |c| {
        println!("{}", c.completion)
    })
}

/// Human output streams deltas as they arrive; structured output waits for
/// the whole draft.
pub async fn cmd_write(args: WriteArgs, ctx: &CliContext) -> Result<()> {
    let existing = match &args.existing {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => String::new(),
    };
    let mut stream = ctx
        .assistant()?
        .write(&args.prompt, &existing)
        .await
        .map_err(CopilotError::from)?;

    let live = ctx.output() == OutputFormat::Human;
    let mut content = String::new();
    let mut stdout = std::io::stdout();
    while let Some(delta) = stream.next().await {
        let delta = delta.map_err(CopilotError::from)?;
        if live {
            stdout.write_all(delta.as_bytes())?;
            stdout.flush()?;
        }
        content.push_str(&delta);
    }

    if live {
        println!();
        return Ok(());
    }
    emit(ctx.output(), &Draft { content }, |_| {})
}
