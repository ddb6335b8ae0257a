//! missive CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use missive_client::cli::Cli;
use missive_client::error::ClientResult;
use missive_client::repl::Repl;
use missive_client::socket;
use missive_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default().with_level(Level::WARN)
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let (reader, writer) = socket::connect(
        &cli.host,
        cli.port,
        cli.encoding.into(),
        Duration::from_secs(cli.timeout),
    )
    .await?;

    Repl::new(reader, writer).run().await
}
