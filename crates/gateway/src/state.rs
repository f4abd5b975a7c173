//! Shared application state for the gateway

use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, GatewayResult};
use parley_auth::{SystemCapability, TokenValidator};
use parley_chats::{ChatError, ChatServices};
use parley_config::{AppConfig, DatabaseConfig, GatewayConfig};
use sqlx::SqlitePool;

/// Shared application state containing all services
#[derive(Clone)]
pub struct GatewayState {
    /// Database connection pool, used for liveness checks
    pub pool: SqlitePool,
    /// Room roster, message log, workspace cascade and accounts
    pub services: ChatServices,
    /// Bearer token validation
    pub tokens: TokenValidator,
    /// Topic and private-queue fan-out
    pub dispatcher: Dispatcher,
    /// Key guarding the privileged system endpoints
    pub capability: SystemCapability,
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Wire every service over an already migrated pool.
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        let tokens = TokenValidator::from_config(&config.auth);
        let services = ChatServices::new(
            pool.clone(),
            config.rooms.clone(),
            config.invites.clone(),
            tokens.clone(),
        );

        Self {
            pool,
            services,
            tokens,
            dispatcher: Dispatcher::new(config.gateway.channel_capacity),
            capability: SystemCapability::new(config.auth.system_key.clone()),
            config: config.gateway.clone(),
        }
    }

    /// Open the configured database, apply migrations and wire the services.
    pub async fn from_config(config: &AppConfig) -> GatewayResult<Self> {
        let pool = parley_database::initialize_database(&config.database)
            .await
            .map_err(|e| GatewayError::Chat(ChatError::Database(e)))?;

        Ok(Self::new(pool, config))
    }

    /// State over a private in-memory database.
    pub async fn in_memory(mut config: AppConfig) -> GatewayResult<Self> {
        config.database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        Self::from_config(&config).await
    }
}
