//! missived entry point.
//!
//! Starts the daemon in the foreground and runs until SIGTERM/SIGINT.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, info};

use missive_core::{TracingConfig, init_tracing};
use missive_server::{
    DEFAULT_HOST, DEFAULT_PORT, DeliveryEngine, Dispatcher, MemoryStore, ServerConfig,
    ServerResult, SignalHandler, SocketServer,
};

/// Message delivery daemon.
#[derive(Parser, Debug)]
#[command(name = "missived", version, about = "Message delivery daemon")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MISSIVE_PORT")]
    port: u16,

    /// Maximum number of concurrent client connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let tracing_config = if cli.debug {
        TracingConfig::daemon().with_level(Level::DEBUG)
    } else {
        TracingConfig::daemon()
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

async fn run(cli: Cli) -> ServerResult<()> {
    // 1. Signal handler
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    // 2. Store, delivery engine, dispatcher
    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(DeliveryEngine::new(store.clone()));
    let dispatcher = Arc::new(Dispatcher::new(store, delivery));

    // 3. Socket server
    let config = ServerConfig::new(cli.host, cli.port).with_max_connections(cli.max_connections);
    let server = SocketServer::new(config).await?;

    // 4. Run until shutdown signal
    let shutdown = signal_handler.shutdown();
    server
        .run_until_shutdown(dispatcher, shutdown.wait())
        .await?;

    info!("Server stopped");
    Ok(())
}
