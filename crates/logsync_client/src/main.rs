//! The `logsync-client` binary.

use clap::Parser;
use logsync_client::{ClientConfig, HttpRemoteClient};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "logsync-client", about = "Sync local graphs against a logsync server")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Run a single pass over all graphs and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match ClientConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if args.once {
        config.sync.once = true;
    }

    let remote = match HttpRemoteClient::new(&config.server.host, config.server.api_token.clone())
    {
        Ok(remote) => remote,
        Err(err) => {
            error!(error = %err, "failed to set up remote client");
            return ExitCode::FAILURE;
        }
    };

    // Per-file sync failures never reach this point; only setup problems do.
    match logsync_client::runner::run(&config, &remote) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "sync aborted");
            ExitCode::FAILURE
        }
    }
}
