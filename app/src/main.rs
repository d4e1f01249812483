//! `perdiem` command-line entry point.

use clap::Parser;
use perdiem_app::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    perdiem_app::init_tracing();
    let cli = Cli::parse();
    perdiem_app::run(cli).await
}
