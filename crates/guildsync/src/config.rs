//! Configuration for the guild cache.
//!
//! Sources, in order of precedence (later sources override earlier):
//! 1. Bundled defaults (guildsync.toml shipped with the crate)
//! 2. User config in home directory (~/.config/guildsync/guildsync.toml)
//! 3. User config in current directory (./guildsync.toml)
//! 4. `GUILDSYNC_*` environment variables (e.g. `GUILDSYNC_BOT_TOKEN`)
//!
//! User config files are optional and silently skipped if not found.

use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use guildsync_core::RolePolicy;
use guildsync_error::{ConfigError, GuildSyncResult};
use guildsync_rate_limit::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_CONFIG: &str = include_str!("../../../guildsync.toml");

/// Guild cache configuration.
///
/// # Example
///
/// ```
/// use guildsync::GuildSyncConfig;
///
/// let config = GuildSyncConfig::default()
///     .with_bot_token(Some("bot-token".to_string()))
///     .with_ttl_secs(30);
/// assert_eq!(config.ttl().as_secs(), 30);
/// assert!(config.validate().is_ok());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default, setter(into))]
pub struct GuildSyncConfig {
    /// Bot token used for per-guild verification
    #[serde(default)]
    bot_token: Option<String>,

    /// Discord REST base URL
    #[serde(default = "default_api_base")]
    api_base: String,

    /// Freshness window of a cached guild list (seconds)
    #[serde(default = "default_ttl_secs")]
    ttl_secs: u64,

    /// Verification concurrency when the caller does not ask for one
    #[serde(default = "default_concurrency")]
    default_concurrency: usize,

    /// Per-request time budget (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,

    /// Evict entries untouched for this long (seconds); never when unset
    #[serde(default)]
    idle_eviction_secs: Option<u64>,

    /// Guild whose member roles decide admin / club labels
    #[serde(default)]
    primary_guild_id: Option<String>,

    /// Role ids granting `admin` in the primary guild
    #[serde(default)]
    admin_role_ids: Vec<String>,

    /// Role ids granting `club` in the primary guild
    #[serde(default)]
    club_role_ids: Vec<String>,
}

fn default_api_base() -> String {
    guildsync_discord::DISCORD_API_BASE.to_string()
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_request_timeout_ms() -> u64 {
    guildsync_discord::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

impl Default for GuildSyncConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            ttl_secs: default_ttl_secs(),
            default_concurrency: default_concurrency(),
            request_timeout_ms: default_request_timeout_ms(),
            idle_eviction_secs: None,
            primary_guild_id: None,
            admin_role_ids: Vec::new(),
            club_role_ids: Vec::new(),
        }
    }
}

impl GuildSyncConfig {
    /// Create a builder for programmatic construction.
    pub fn builder() -> GuildSyncConfigBuilder {
        GuildSyncConfigBuilder::default()
    }

    /// Load configuration with precedence: env > current dir > home dir > bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be parsed or the result is invalid.
    #[instrument]
    pub fn load() -> GuildSyncResult<Self> {
        debug!("Loading configuration with precedence: env > current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/guildsync/guildsync.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder
            .add_source(File::with_name("guildsync").required(false))
            .add_source(
                Environment::with_prefix("GUILDSYNC")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admin_role_ids")
                    .with_list_parse_key("club_role_ids"),
            );

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Bundled defaults only, ignoring user files and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled file fails to parse.
    pub fn bundled() -> GuildSyncResult<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Load configuration from a specific file path.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> GuildSyncResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn from_toml_str(toml: &str) -> GuildSyncResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::invalid("ttl_secs", "must be greater than zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.default_concurrency == 0 || self.default_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::invalid(
                "default_concurrency",
                format_args!("must be between 1 and {}", MAX_CONCURRENCY),
            ));
        }
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::invalid("api_base", "must not be empty"));
        }
        Ok(())
    }

    /// Bot token, if configured and not blank.
    pub fn effective_bot_token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Freshness window as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Request time budget as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Idle eviction threshold as a Duration.
    pub fn idle_eviction(&self) -> Option<Duration> {
        self.idle_eviction_secs.map(Duration::from_secs)
    }

    /// Role policy built from the primary guild and role allowlists.
    pub fn role_policy(&self) -> RolePolicy {
        RolePolicy::builder()
            .primary_guild_id(self.primary_guild_id.clone())
            .admin_role_ids(self.admin_role_ids.iter().cloned().collect::<HashSet<_>>())
            .club_role_ids(self.club_role_ids.iter().cloned().collect::<HashSet<_>>())
            .build()
            .unwrap_or_default()
    }

    /// Copy with the bot token masked, for display.
    pub fn redacted(&self) -> Self {
        Self {
            bot_token: self.bot_token.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}
