use std::sync::Arc;

use anyhow::{Context, Result};
use parlor_auth::Authenticator;
use parlor_config::AppConfig;
use parlor_database::{
    initialize_database, MembershipRepository, MessageRepository, RoomRepository,
    SessionRepository, UserRepository,
};
use parlor_hub::{ChatStores, Hub};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything the server needs, wired against one SQLite pool.
#[derive(Clone)]
pub struct ChatServices {
    pub db_pool: SqlitePool,
    pub users: UserRepository,
    pub stores: ChatStores,
    pub authenticator: Authenticator,
    pub hub: Hub,
}

impl ChatServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database).await?;

        let users = UserRepository::new(db_pool.clone());
        let sessions = SessionRepository::new(db_pool.clone());
        let expired = sessions
            .delete_expired()
            .await
            .context("failed to sweep expired sessions")?;
        if expired > 0 {
            info!(expired, "removed expired sessions");
        }

        let authenticator =
            Authenticator::new(Arc::new(users.clone()), Arc::new(sessions), &config.auth);

        let stores = ChatStores {
            rooms: Arc::new(RoomRepository::new(db_pool.clone())),
            memberships: Arc::new(MembershipRepository::new(db_pool.clone())),
            messages: Arc::new(MessageRepository::new(db_pool.clone())),
        };
        let hub = Hub::start(stores.clone(), &config.chat)
            .await
            .context("failed to start chat hub")?;

        Ok(Self {
            db_pool,
            users,
            stores,
            authenticator,
            hub,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
