//! API runtime entry point.
//!
//! ```text
//! load config → init logging/metrics → start(bundles) → exit code
//! ```
//!
//! Exits non-zero when startup fails, when the server fails while serving,
//! or when graceful shutdown does not complete.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use api_runtime::api::{bundle_by_name, default_bundles, register_all, Api, ApiBundle};
use api_runtime::config::schema::{self, SERVER_METRICS_ADDRESS, SERVER_METRICS_ENABLED};
use api_runtime::config::ConfigStore;
use api_runtime::flags::NoopProvider;
use api_runtime::lifecycle::{self, startup::API_TITLE};
use api_runtime::observability::{logging, metrics};
use api_runtime::RuntimeError;

#[derive(Parser)]
#[command(name = "api-runtime")]
#[command(about = "Bootstrap and serve the API bundles", long_about = None)]
struct Cli {
    /// TOML file layered under the environment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bundle to serve (repeatable); defaults to ingestion and hub
    #[arg(short, long = "bundle", global = true)]
    bundles: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the API until a shutdown signal arrives (default)
    Serve,
    /// Validate configuration and bundle registration, then exit
    CheckConfig,
}

fn select_bundles(names: &[String]) -> Result<Vec<ApiBundle>, Box<dyn std::error::Error>> {
    if names.is_empty() {
        return Ok(default_bundles());
    }
    names
        .iter()
        .map(|name| bundle_by_name(name).ok_or_else(|| format!("unknown bundle: {name}").into()))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = schema::load(cli.config.as_deref()).map_err(RuntimeError::Config)?;
    let bundles = select_bundles(&cli.bundles)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&store, &bundles).await,
        Commands::CheckConfig => check_config(&store, &bundles),
    }
}

async fn serve(store: &ConfigStore, bundles: &[ApiBundle]) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(store)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-runtime starting");

    if store.get_bool(SERVER_METRICS_ENABLED) {
        let raw = store.get_string(SERVER_METRICS_ADDRESS);
        match raw.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => {
                tracing::error!(metrics_address = %raw, "Failed to parse metrics address");
            }
        }
    }

    if let Err(e) = lifecycle::start(&CancellationToken::new(), store, bundles).await {
        if e.is_startup() {
            tracing::error!(error = %e, "Startup failed");
        } else {
            tracing::error!(error = %e, "Server exited with error");
        }
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn check_config(store: &ConfigStore, bundles: &[ApiBundle]) -> Result<(), Box<dyn std::error::Error>> {
    let mut api = Api::new(API_TITLE, env!("CARGO_PKG_VERSION"), Arc::new(NoopProvider));
    register_all(store, &mut api, bundles)?;

    println!("Configuration is valid");
    for op in api.operations() {
        println!("  {:<7} {:<24} {}", op.method, op.path, op.operation_id);
    }
    Ok(())
}
