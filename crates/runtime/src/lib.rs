use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_config::AppConfig;
use parley_database::initialize_database;
use parley_gateway::GatewayState;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

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

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub state: Arc<GatewayState>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let state = Arc::new(GatewayState::new(db_pool.clone(), config));
        if state.capability.is_enabled() {
            info!("system capability enabled");
        } else {
            warn!("no system key configured; privileged workspace adds are disabled");
        }
        info!(
            default_max_members = config.rooms.default_max_members,
            invite_ttl_days = config.invites.ttl_days,
            "chat services ready"
        );

        Ok(Self { db_pool, state })
    }

    /// Delete invites that can no longer be accepted.
    pub async fn cleanup_expired_invites(&self) -> Result<u64> {
        self.state
            .services
            .workspaces
            .cleanup_expired_invites()
            .await
            .context("failed to clean up settled invites")
    }

    /// Run [`Self::cleanup_expired_invites`] on a fixed period until aborted.
    pub fn spawn_invite_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let services = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(error) = services.cleanup_expired_invites().await {
                    warn!(error = %format!("{error:#}"), "invite sweep failed");
                }
                let pruned = services.state.dispatcher.prune().await;
                if pruned > 0 {
                    info!(pruned, "released idle dispatch channels");
                }
            }
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
