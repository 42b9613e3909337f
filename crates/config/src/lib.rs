use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parlor.toml",
    "config/parlor.toml",
    "crates/config/parlor.toml",
    "../parlor.toml",
    "../config/parlor.toml",
    "../crates/config/parlor.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub chat: ChatConfig,
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
            url: "sqlite://parlor.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
        }
    }
}

impl AuthConfig {
    /// One week.
    const fn default_session_ttl() -> u64 {
        7 * 24 * 60 * 60
    }
}

/// How actor mailboxes are sized.
///
/// A bounded mailbox makes a sender wait while the receiver is full, so a
/// stalled connection slows whoever forwards to it. An unbounded mailbox never
/// blocks the sender and grows without limit instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxKind {
    Bounded,
    Unbounded,
}

impl MailboxKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Bounded => "bounded",
            Self::Unbounded => "unbounded",
        }
    }
}

/// Keepalive, framing and mailbox policy for live chat connections.
///
/// ```
/// use parlor_config::ChatConfig;
/// use std::time::Duration;
///
/// let chat = ChatConfig::default();
/// assert_eq!(chat.pong_wait(), Duration::from_secs(60));
/// assert_eq!(chat.ping_interval(), Duration::from_secs(54));
/// assert!(chat.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Upper bound for a single frame write.
    pub write_wait_ms: u64,
    /// Read deadline; any inbound frame, pongs included, pushes it forward.
    pub pong_wait_ms: u64,
    /// Ping cadence. Must be shorter than `pong_wait_ms`.
    pub ping_interval_ms: u64,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
    pub mailbox: MailboxKind,
    pub mailbox_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            ping_interval_ms: 54_000,
            max_message_size: 512,
            mailbox: MailboxKind::Bounded,
            mailbox_capacity: 256,
        }
    }
}

impl ChatConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Reject settings under which the keepalive could never succeed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.write_wait_ms == 0 || self.pong_wait_ms == 0 || self.ping_interval_ms == 0 {
            bail!("chat keepalive durations must be non-zero");
        }
        if self.ping_interval_ms >= self.pong_wait_ms {
            bail!(
                "chat.ping_interval_ms ({}) must be shorter than chat.pong_wait_ms ({})",
                self.ping_interval_ms,
                self.pong_wait_ms
            );
        }
        if self.max_message_size == 0 {
            bail!("chat.max_message_size must be non-zero");
        }
        if self.mailbox == MailboxKind::Bounded && self.mailbox_capacity == 0 {
            bail!("chat.mailbox_capacity must be non-zero for bounded mailboxes");
        }
        Ok(())
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parlor_config::load;
///
/// std::env::remove_var("PARLOR_CONFIG");
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
        .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
        .set_default(
            "auth.session_ttl_seconds",
            clamp_to_i64(defaults.auth.session_ttl_seconds),
        )?
        .set_default("chat.write_wait_ms", clamp_to_i64(defaults.chat.write_wait_ms))?
        .set_default("chat.pong_wait_ms", clamp_to_i64(defaults.chat.pong_wait_ms))?
        .set_default("chat.ping_interval_ms", clamp_to_i64(defaults.chat.ping_interval_ms))?
        .set_default(
            "chat.max_message_size",
            clamp_to_i64(defaults.chat.max_message_size as u64),
        )?
        .set_default("chat.mailbox", defaults.chat.mailbox.as_str())?
        .set_default(
            "chat.mailbox_capacity",
            clamp_to_i64(defaults.chat.mailbox_capacity as u64),
        )?;

    let environment_overrides = config::Environment::with_prefix("PARLOR").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLOR_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLOR_CONFIG");
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

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    config
        .chat
        .validate()
        .context("invalid chat configuration")?;

    debug!(?config, "loaded parlor configuration");
    Ok(config)
}
