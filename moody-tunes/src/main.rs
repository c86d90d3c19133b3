//! moody-tunes - emotion-driven music discovery service
//!
//! Serves the browse/vote/playlist API, runs background workers for
//! Spotify exports, suggested songs and top-artist refreshes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moody_common::config::TomlConfig;
use moody_tunes::config::RuntimeSettings;
use moody_tunes::services::spotify_client::{SpotifyClient, SpotifyClientConfig};
use moody_tunes::workers::pool::DEFAULT_POLL_INTERVAL;
use moody_tunes::workers::schedule::default_schedules;
use moody_tunes::workers::{ScheduleRunner, WorkerPool};
use moody_tunes::{AppOptions, AppState};

/// Interval between sweeps of expired browse cache entries
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Command-line arguments for moody-tunes
#[derive(Parser, Debug)]
#[command(name = "moody-tunes")]
#[command(about = "Emotion-driven music discovery service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "MTDJ_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database path (overrides configuration)
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("moody_tunes={0},moody_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting moody-tunes v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let cipher = config.token_cipher().context("Invalid encryption configuration")?;

    let db = moody_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let settings = RuntimeSettings::load(&db).await?;
    info!(?settings, "Runtime settings loaded");

    let client_config =
        SpotifyClientConfig::from_provider_config(&config.provider, settings.provider_batch_size);
    let provider = Arc::new(SpotifyClient::new(client_config).context("Failed to build Spotify client")?);

    let state = AppState::new(
        db,
        settings,
        provider,
        cipher,
        AppOptions {
            image_upload_path: config.image_upload_path.clone(),
            auth_state_length: config.provider.auth_state_length,
            max_top_artists: config.provider.max_top_artists,
        },
    );

    state.queue.reset_interrupted().await?;

    let shutdown_token = CancellationToken::new();
    let workers = WorkerPool::start(
        state.worker_context(),
        config.worker_count,
        DEFAULT_POLL_INTERVAL,
        shutdown_token.clone(),
    );
    let scheduler = tokio::spawn(
        ScheduleRunner::new(state.queue.clone(), default_schedules(), shutdown_token.clone()).run(),
    );
    let cache_sweeper = tokio::spawn(purge_cache(state.clone(), shutdown_token.clone()));

    let app = moody_tunes::build_router(state);

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, waiting for workers");
    shutdown_token.cancel();
    workers.join().await;
    let _ = scheduler.await;
    let _ = cache_sweeper.await;

    info!("Shutdown complete");
    Ok(())
}

async fn purge_cache(state: AppState, shutdown_token: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(CACHE_PURGE_INTERVAL) => {
                let removed = state.browse_cache.purge_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired browse cache entries");
                }
            }
            _ = shutdown_token.cancelled() => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
