use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gravity_lite::api::{run_api, ApiState};
use gravity_lite::config::{ControllerConfig, DEFAULT_PIPELINE_COUNT};
use gravity_lite::controller::Controller;
use gravity_lite::shutdown::install_shutdown_handler;
use gravity_lite::store::SqliteStore;
use gravity_lite::transport::GrpcTransport;

#[derive(Parser, Debug)]
#[command(name = "gravity-lite")]
#[command(version)]
#[command(about = "Pipeline-assignment coordinator for a data-distribution cluster")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the coordinator
    Server(ServerArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Number of pipelines in the fixed universe
    #[arg(long, default_value_t = DEFAULT_PIPELINE_COUNT)]
    pipelines: u64,

    /// Timeout for each call to a synchronizer, in milliseconds
    #[arg(long, default_value = "10000")]
    request_timeout_ms: u64,

    /// Pause before every dispatch attempt, in milliseconds
    #[arg(long, default_value = "10")]
    retry_interval_ms: u64,

    /// Warn about pipelines left unowned for longer than this, in milliseconds
    #[arg(long, default_value = "30000")]
    unassigned_warn_after_ms: u64,

    /// SQLite database holding synchronizer records
    #[arg(long, default_value = "./datastore/controller.db")]
    store: PathBuf,

    /// Bind address for the admin HTTP API
    #[arg(long, default_value = "127.0.0.1:44444")]
    api_addr: SocketAddr,

    /// Synchronizer gRPC endpoint; "{id}" is replaced by the synchronizer ID
    #[arg(long, default_value = "http://{id}:7100")]
    synchronizer_endpoint: String,
}

impl ServerArgs {
    fn into_config(self) -> ControllerConfig {
        ControllerConfig {
            api_addr: self.api_addr,
            synchronizer_endpoint: self.synchronizer_endpoint,
            ..ControllerConfig::new(self.pipelines)
                .with_request_timeout_ms(self.request_timeout_ms)
                .with_retry_interval_ms(self.retry_interval_ms)
                .with_unassigned_warn_after_ms(self.unassigned_warn_after_ms)
                .with_store_path(self.store)
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    if config.pipeline_count == 0 {
        return Err("--pipelines must be at least 1".into());
    }

    tracing::info!(
        pipelines = config.pipeline_count,
        store = %config.store_path.display(),
        api_addr = %config.api_addr,
        endpoint = %config.synchronizer_endpoint,
        "Starting coordinator"
    );

    let store = Arc::new(SqliteStore::open(&config.store_path)?);
    let transport = Arc::new(
        GrpcTransport::new(config.synchronizer_endpoint.clone())
            .with_connect_timeout(config.request_timeout()),
    );

    let controller = Arc::new(Controller::new(config, store, transport));
    let shutdown = install_shutdown_handler();

    let worker = controller.start(shutdown.clone()).await?;

    let api = tokio::spawn(run_api(
        controller.config().api_addr,
        ApiState {
            controller: controller.clone(),
        },
        shutdown.clone(),
    ));

    shutdown.cancelled().await;
    tracing::info!("Shutting down");

    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Dispatch worker panicked");
    }
    if let Err(e) = api.await {
        tracing::error!(error = %e, "Admin API task panicked");
    }

    tracing::info!("Coordinator stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
    }
}
