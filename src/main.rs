use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vetledger::cli::Cli;

/// Log filter from `VETLEDGER_LOG`, falling back to warnings only
/// (debug with `--verbose`). Logs go to stderr so table output stays clean.
fn init_tracing(verbose: bool) {
    let default = if verbose { "vetledger=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("VETLEDGER_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}
