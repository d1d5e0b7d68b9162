//! Tripund API - storefront and admin backend

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripund_api::api::{self, AppState};
use tripund_api::auth::CredentialHasher;
use tripund_api::clock::{Clock, SystemClock};
use tripund_api::config::Config;
use tripund_api::events::EventPublisher;
use tripund_api::store::{DocumentStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.uses_default_secret() {
        warn!("JWT_SECRET is not set, signing tokens with the development default");
    }

    let store = open_store(&config).await?;
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "cannot reach NATS, domain events will be dropped");
                None
            }
        },
        None => None,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hasher = CredentialHasher::new(&config.password_hash)?;
    let port = config.port;
    let bootstrap_admin = config.bootstrap_admin.clone();
    let state = AppState::new(config, store, clock, hasher, EventPublisher::new(nats));

    if let Err(e) = state.catalog.seed_defaults().await {
        warn!(error = %e, "failed to seed default categories");
    }
    if let Some((email, password)) = bootstrap_admin {
        if state.auth.bootstrap_super_admin(&email, &password).await? {
            info!(%email, "created bootstrap super admin");
        }
    }

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 Tripund API listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Postgres when a URL resolves and the database answers, otherwise the
/// in-memory store.
async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let Some(url) = config.resolve_database_url()? else {
        warn!("no database configured, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    match PgPoolOptions::new().max_connections(10).connect(&url).await {
        Ok(pool) => {
            sqlx::migrate!("./migrations").run(&pool).await?;
            Ok(Arc::new(PgStore::new(pool, config.store_project_id.clone())))
        }
        Err(e) => {
            warn!(error = %e, "database unavailable, falling back to the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
