#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use docpool::RenderPool;
use server::config::{CliArgs, ServerConfig};
use server::http::{AppState, router};
use server::render::FsRenderer;
use server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let renderer = FsRenderer::new(&config.output_dir).await?;
    let pool = RenderPool::new(config.pool_config(), renderer);
    pool.start();

    let state = AppState::new(pool, config.monitor_timeout);
    let app = router(state.clone());

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config.server_addr, &config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state, config, providers))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting document service on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting document service on {} with {} workers, queue capacity {}",
            _addr,
            _config.num_workers,
            _config.queue_capacity
        );
    }
}

async fn shutdown_signal(
    state: AppState<FsRenderer>,
    config: ServerConfig,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Drain the pool, then release monitors; /health now reports unavailable.
    if !state.shutdown(config.shutdown_timeout).await {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Worker pool did not stop within {:?}",
            config.shutdown_timeout
        );
    }

    // 2. Flush telemetry
    providers.shutdown();
}
