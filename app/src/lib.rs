//! Perdiem Application Shell
//!
//! This is the thin command-line shell that parses arguments, wires the
//! lookup pipeline and prints results. Core logic lives in the `crates/`
//! directory.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
pub mod state;

use anyhow::Context;
use cli::{Cli, Command};
use perdiem_core::AppConfig;
use state::AppState;
use std::process::ExitCode;
use tracing::info;

/// Initialize tracing subscriber for logging.
///
/// Logs go to stderr so that `--json` output on stdout stays parseable.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,perdiem=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Resolve the effective configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config =
        AppConfig::load_with_env(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(backend) = cli.cache {
        config.cache.backend = backend;
    }
    Ok(config)
}

/// Run one command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    info!("Starting perdiem v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let state = AppState::init(config).await?;

    match cli.command {
        Command::Lookup { code, force } => {
            let lookup = commands::lookup(&state.orchestrator, &code, force).await?;
            println!("{}", output::render_lookup(&lookup, cli.json)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Batch { codes, file } => {
            let codes = commands::collect_codes(codes, file.as_deref())?;
            if codes.is_empty() {
                anyhow::bail!("no location codes given");
            }

            let outcome = commands::batch(&state.orchestrator, &codes).await;
            println!("{}", output::render_batch(&outcome, cli.json)?);
            Ok(if outcome.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
