use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use grc_copilot::cli::runtime::{init_logging, load_local_env_overrides, LOCAL_ENV_PATH};
use grc_copilot::cli::{dispatch, CliArgs, CliContext};
use grc_copilot::{exit_code, resolve_config_path, AppConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    if let Err(err) = init_logging(&cli.log_level, cli.debug, cli.log_format) {
        eprintln!("error: {err:#}");
        return ExitCode::from(2);
    }

    match run(&cli).await {
        Ok(()) => {
            info!("command completed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err).clamp(1, 255) as u8)
        }
    }
}

async fn run(cli: &CliArgs) -> Result<()> {
    load_local_env_overrides(Path::new(LOCAL_ENV_PATH));
    let config_path = resolve_config_path(cli.config.as_ref())?;
    let config = AppConfig::load(&config_path)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "grc-copilot starting"
    );

    let ctx = CliContext::new(config, config_path, cli.output);
    let cancel = ctx.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            cancel.cancel();
        }
    });

    dispatch(cli, &ctx).await
}
