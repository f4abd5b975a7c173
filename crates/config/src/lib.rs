use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
    "../crates/config/parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub invites: InvitesConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Token signing parameters and the optional system capability key.
///
/// ```
/// use parley_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.jwt_issuer, "parley");
/// assert_eq!(auth.token_ttl_seconds, 86_400);
/// assert!(auth.system_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "AuthConfig::default_audience")]
    pub jwt_audience: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// Enables the privileged system endpoints when set.
    #[serde(default)]
    pub system_key: Option<String>,
}

impl AuthConfig {
    fn default_secret() -> String {
        "parley-development-secret-change-me".to_string()
    }

    fn default_issuer() -> String {
        "parley".to_string()
    }

    fn default_audience() -> String {
        "parley-clients".to_string()
    }

    const fn default_token_ttl() -> u64 {
        86_400
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_secret(),
            jwt_issuer: Self::default_issuer(),
            jwt_audience: Self::default_audience(),
            token_ttl_seconds: Self::default_token_ttl(),
            system_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    #[serde(default = "RoomsConfig::default_max_members")]
    pub default_max_members: u32,
    #[serde(default = "RoomsConfig::default_video_participants")]
    pub max_video_participants: u32,
    #[serde(default = "RoomsConfig::default_recent_limit")]
    pub recent_message_limit: u32,
    #[serde(default = "RoomsConfig::default_page_size")]
    pub max_page_size: u32,
}

impl RoomsConfig {
    const fn default_max_members() -> u32 {
        100
    }

    const fn default_video_participants() -> u32 {
        10
    }

    const fn default_recent_limit() -> u32 {
        50
    }

    const fn default_page_size() -> u32 {
        100
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_max_members: Self::default_max_members(),
            max_video_participants: Self::default_video_participants(),
            recent_message_limit: Self::default_recent_limit(),
            max_page_size: Self::default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitesConfig {
    #[serde(default = "InvitesConfig::default_ttl_days")]
    pub ttl_days: u32,
}

impl InvitesConfig {
    const fn default_ttl_days() -> u32 {
        7
    }
}

impl Default for InvitesConfig {
    fn default() -> Self {
        Self {
            ttl_days: Self::default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Buffer size of every broadcast topic and private queue.
    #[serde(default = "GatewayConfig::default_capacity")]
    pub channel_capacity: usize,
    /// Post a system message when a connection joins or leaves a room.
    #[serde(default = "GatewayConfig::default_announce")]
    pub announce_presence: bool,
}

impl GatewayConfig {
    const fn default_capacity() -> usize {
        100
    }

    const fn default_announce() -> bool {
        true
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_capacity(),
            announce_presence: Self::default_announce(),
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default("auth.jwt_issuer", defaults.auth.jwt_issuer.clone())?
        .set_default("auth.jwt_audience", defaults.auth.jwt_audience.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            clamp_i64(defaults.auth.token_ttl_seconds),
        )?
        .set_default(
            "rooms.default_max_members",
            i64::from(defaults.rooms.default_max_members),
        )?
        .set_default(
            "rooms.max_video_participants",
            i64::from(defaults.rooms.max_video_participants),
        )?
        .set_default(
            "rooms.recent_message_limit",
            i64::from(defaults.rooms.recent_message_limit),
        )?
        .set_default("rooms.max_page_size", i64::from(defaults.rooms.max_page_size))?
        .set_default("invites.ttl_days", i64::from(defaults.invites.ttl_days))?
        .set_default(
            "gateway.channel_capacity",
            clamp_i64(defaults.gateway.channel_capacity as u64),
        )?
        .set_default("gateway.announce_presence", defaults.gateway.announce_presence)?;

    let environment_overrides = config::Environment::with_prefix("PARLEY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.token_ttl_seconds > i64::MAX as u64 {
        config.auth.token_ttl_seconds = i64::MAX as u64;
    }
    if config.gateway.channel_capacity == 0 {
        anyhow::bail!("gateway.channel_capacity must be greater than zero");
    }

    debug!(
        http.port = config.http.port,
        database.url = %config.database.url,
        system_key = config.auth.system_key.is_some(),
        "loaded configuration"
    );
    Ok(config)
}
