use std::env;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::LogFormat;

pub const LOCAL_ENV_PATH: &str = "config/local.env";

/// `KEY=value` pairs from a dotenv-style file. Blank lines, `#` comments and
/// an optional `export ` prefix are accepted; malformed lines are skipped.
fn parse_local_env(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                pairs.push((key.trim().to_string(), unquote(value.trim())));
            }
            _ => warn!(line = idx + 1, "skipping malformed local.env line"),
        }
    }
    pairs
}

/// Exports the pairs from `path` that the shell has not already set and
/// returns how many were applied.
pub fn load_local_env_overrides(path: &Path) -> usize {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(path = %path.display(), ?err, "cannot read local.env");
            return 0;
        }
    };
    let mut applied = 0;
    for (key, value) in parse_local_env(&contents) {
        if env::var_os(&key).is_some() {
            debug!(%key, "local.env entry shadowed by the environment");
            continue;
        }
        env::set_var(&key, value);
        applied += 1;
    }
    info!(path = %path.display(), applied, "applied local.env");
    applied
}

/// `RUST_LOG` takes precedence over `level`; logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .context("failed to install tracing subscriber")?;

    Ok(())
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return inner.to_string();
    }
    match value.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) => inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\t", "\t"),
        None => value.to_string(),
    }
}
