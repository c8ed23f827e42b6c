//! `ni660x` command line.
//!
//! Serve a counting application over JSON-RPC:
//! ```bash
//! ni660x serve config/ni660x.toml --port 9000
//! ```
//!
//! Call it from another shell:
//! ```bash
//! ni660x call start_all '[100, 0.01, 0.01]'
//! ni660x call get_channel_data '{"name": "ct1", "start": -10}'
//! ```

mod logging;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ni660x_core::{AppConfig, CountingApp};
use ni660x_driver_mock::MockBoard;
use ni660x_server::{Dispatcher, RpcClient, RpcServer};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, info};

use settings::ServeSettings;

#[derive(Parser)]
#[command(name = "ni660x")]
#[command(about = "Gated multi-channel pulse counting with remote control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the counting application and serve it until Ctrl+C
    Serve {
        /// Acquisition config file (TOML or YAML)
        config: PathBuf,

        /// Address to bind [default: localhost or [server].host]
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind [default: 9000 or [server].port]
        #[arg(short, long)]
        port: Option<u16>,

        /// Log filter [default: info or [logging].level]
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Call one method on a running server and print the result as JSON
    Call {
        /// Method name (see `system.listMethods`)
        method: String,

        /// Parameters as a JSON array or object
        #[arg(default_value = "[]")]
        params: String,

        /// Server address
        #[arg(long, default_value = "localhost:9000")]
        addr: String,

        /// Log filter
        #[arg(long, default_value = "warn")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            log_level,
        } => serve(config, host, port, log_level).await,
        Commands::Call {
            method,
            params,
            addr,
            log_level,
        } => {
            logging::init(&log_level)?;
            call(&addr, &method, &params).await
        }
    }
}

async fn serve(
    path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
) -> Result<()> {
    let settings = ServeSettings::load(&path)?.with_overrides(host, port, log_level);
    logging::init(&settings.logging.level)?;

    let config = AppConfig::load(&path)
        .with_context(|| format!("Invalid acquisition config {}", path.display()))?;

    let board = MockBoard::with_simulation(settings.simulation.clone());
    let app = CountingApp::open(config, &board).context("Failed to open counting application")?;
    let dispatcher = Dispatcher::new(Arc::new(RwLock::new(app)));

    let server = RpcServer::bind(settings.bind_addr(), dispatcher.clone())
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr()))?;

    info!("Use Ctrl+C to exit");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    let served = server.run_until(shutdown).await;

    dispatcher.app().write().close();
    served?;
    Ok(())
}

async fn call(addr: &str, method: &str, params: &str) -> Result<()> {
    let params: Value =
        serde_json::from_str(params).context("Parameters must be a JSON array or object")?;
    let mut client = RpcClient::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let result = client.call(method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
