use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reqwest::Url;
use tokio::signal;
use tracing::{debug, info};

use repgate::api::{create_router, AppState};
use repgate::challenge::{HttpPoseClient, SessionPool};
use repgate::config::{Config, StorageBackend};
use repgate::observability::init_tracing;
use repgate::settings::load_seed;
use repgate::storage::{FileStorage, MemoryStorage, PostgresStorage, SeedState, StateStore, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = ?config.storage,
        fail_mode = %config.fail_mode,
        "Starting repgate"
    );

    // First-run defaults
    let seed = match config.seed_path {
        Some(ref path) => {
            let seed = load_seed(path)
                .with_context(|| format!("loading seed file {}", path.display()))?;
            info!(path = %path.display(), sites = seed.block_list.len(), "Seed settings loaded");
            seed
        }
        None => SeedState::defaults(),
    };

    // Open the state store and seed whatever is absent
    let backend = open_backend(&config).await?;
    let store = StateStore::new(backend, seed);
    store
        .initialize()
        .await
        .context("initializing gate state")?;

    let pose = HttpPoseClient::new(config.pose_service_url.clone(), config.pose_timeout())
        .context("building pose service client")?;
    info!(base_url = pose.base_url(), "Pose service client ready");

    let challenge_page = Url::parse(&config.challenge_page_url)
        .with_context(|| format!("invalid challenge page URL {}", config.challenge_page_url))?;

    // Create application state
    let state = Arc::new(AppState::new(
        store,
        Arc::new(pose),
        challenge_page,
        config.fail_mode,
        config.exemption_duration(),
    ));

    let eviction_handle = spawn_session_eviction(state.sessions.clone(), &config);

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    eviction_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn open_backend(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = match config.storage {
        StorageBackend::Memory => {
            info!("State kept in memory; it will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
        StorageBackend::File => {
            let storage = FileStorage::open(&config.state_path)
                .await
                .with_context(|| format!("opening state file {}", config.state_path.display()))?;
            info!(path = %config.state_path.display(), "File storage enabled");
            Arc::new(storage)
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("--database-url is required for the postgres backend")?;
            let storage =
                PostgresStorage::connect(url, config.db_min_connections, config.db_max_connections)
                    .await
                    .context("connecting to postgres")?;
            storage
                .run_migrations()
                .await
                .context("running migrations")?;
            info!("Postgres storage enabled");
            Arc::new(storage)
        }
    };

    Ok(backend)
}

fn spawn_session_eviction(pool: Arc<SessionPool>, config: &Config) -> tokio::task::JoinHandle<()> {
    let idle_secs = i64::try_from(config.session_idle_timeout().as_secs()).unwrap_or(i64::MAX);
    let mut interval = tokio::time::interval(config.session_evict_interval());

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            let evicted = pool.evict_idle(idle_secs);
            if evicted > 0 {
                info!(evicted, remaining = pool.session_count(), "Evicted idle challenge sessions");
            } else {
                debug!(sessions = pool.session_count(), "No idle challenge sessions");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
