use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prospect_crm_api::config::{Config, StorageBackend};
use prospect_crm_api::db::Database;
use prospect_crm_api::db_storage::PgStore;
use prospect_crm_api::handlers::AppState;
use prospect_crm_api::memory_storage::MemoryStore;
use prospect_crm_api::routes::build_router;
use prospect_crm_api::store::CrmStore;

/// Main entry point for the application.
///
/// Initializes logging, loads configuration, opens the selected storage
/// backend (running migrations when asked to), builds the router and serves
/// it until the process is stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prospect_crm_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let store: Arc<dyn CrmStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
            let db = Database::new(database_url).await?;
            tracing::info!("Database connection pool established");

            if config.run_migrations {
                db.migrate().await?;
                tracing::info!("✓ Migrations applied");
            }

            Arc::new(PgStore::new(db.pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage: data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Build application state
    let app_state = Arc::new(AppState::new(config.clone(), store)?);
    tracing::info!(
        "Auth client ready (token cache TTL: {}s)",
        config.auth_cache_ttl_secs
    );

    let app = build_router(app_state)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer address is the rate limiter's fallback key when no proxy headers are set
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
