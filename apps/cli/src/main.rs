//! dumpdeploy command-line entry point.

mod app;
mod args;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = args::Args::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(args))
}
