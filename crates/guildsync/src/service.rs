//! Inbound API used by the application's request handlers.

use crate::cache::{CacheSettings, GuildCache};
use crate::config::GuildSyncConfig;
use derive_getters::Getters;
use guildsync_core::{NormalizedGuild, RawGuild, ResultEnvelope};
use guildsync_discord::{DiscordApi, DiscordHttpClient};
use guildsync_error::{CacheError, CacheErrorKind, GuildSyncResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// One guild lookup request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_", into)]
pub struct GuildQuery {
    /// The user's OAuth access token
    access_token: String,
    /// Discord user id, the cache key
    user_id: String,
    /// Verification concurrency; the configured default when unset
    #[setters(strip_option)]
    concurrency: Option<usize>,
}

impl GuildQuery {
    /// Query for `user_id` authenticated with `access_token`.
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            concurrency: None,
        }
    }
}

/// Validated entry point over a shared [`GuildCache`].
///
/// # Example
///
/// ```no_run
/// use guildsync::{GuildQuery, GuildService, GuildSyncConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let service = GuildService::from_config(&GuildSyncConfig::load()?)?;
/// let shared = service
///     .get_shared_guilds_for_user(&GuildQuery::new("access-token", "user-1"))
///     .await?;
/// for guild in shared.data() {
///     println!("{} ({})", guild.name(), guild.role_label());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GuildService {
    cache: Arc<GuildCache>,
    idle_eviction: Option<Duration>,
}

impl GuildService {
    /// Wrap an existing cache.
    pub fn new(cache: Arc<GuildCache>) -> Self {
        Self {
            cache,
            idle_eviction: None,
        }
    }

    /// Evict entries idle for longer than `max_idle` before each query.
    pub fn with_idle_eviction(mut self, max_idle: Option<Duration>) -> Self {
        self.idle_eviction = max_idle;
        self
    }

    /// Build the HTTP client and cache described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &GuildSyncConfig) -> GuildSyncResult<Self> {
        let client = DiscordHttpClient::new(config.api_base().as_str(), config.request_timeout())?;
        Ok(Self::from_api(Arc::new(client), config))
    }

    /// Build a cache over any [`DiscordApi`] using `config`'s settings.
    pub fn from_api(api: Arc<dyn DiscordApi>, config: &GuildSyncConfig) -> Self {
        let cache = GuildCache::new(api, CacheSettings::from_config(config));
        Self::new(Arc::new(cache)).with_idle_eviction(config.idle_eviction())
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<GuildCache> {
        &self.cache
    }

    fn validate(&self, query: &GuildQuery) -> Result<(), CacheError> {
        if self.cache.settings().bot_token().is_none() {
            return Err(CacheError::new(CacheErrorKind::BotTokenMissing));
        }
        if query.access_token.trim().is_empty() {
            return Err(CacheError::new(CacheErrorKind::MissingAccessToken));
        }
        if query.user_id.trim().is_empty() {
            return Err(CacheError::new(CacheErrorKind::MissingUserId));
        }
        Ok(())
    }

    fn sweep(&self) {
        if let Some(max_idle) = self.idle_eviction {
            self.cache.evict_idle(max_idle);
        }
    }

    /// Every guild of the user with bot status and role labels.
    ///
    /// # Errors
    ///
    /// Validation errors before any network call, then any cache error.
    #[instrument(skip(self, query), fields(user_id = %query.user_id))]
    pub async fn get_all_user_guilds_with_bot_status(
        &self,
        query: &GuildQuery,
    ) -> Result<ResultEnvelope<Vec<NormalizedGuild>>, CacheError> {
        self.validate(query)?;
        self.sweep();
        self.cache
            .get_guilds_with_bot_status(&query.user_id, &query.access_token, query.concurrency)
            .await
    }

    /// Only the guilds the bot is installed in.
    ///
    /// # Errors
    ///
    /// Same as [`get_all_user_guilds_with_bot_status`](Self::get_all_user_guilds_with_bot_status).
    #[instrument(skip(self, query), fields(user_id = %query.user_id))]
    pub async fn get_shared_guilds_for_user(
        &self,
        query: &GuildQuery,
    ) -> Result<ResultEnvelope<Vec<NormalizedGuild>>, CacheError> {
        let all = self.get_all_user_guilds_with_bot_status(query).await?;
        let shared = all.map(|guilds| {
            guilds
                .into_iter()
                .filter(|g| *g.bot_installed())
                .collect::<Vec<_>>()
        });
        debug!(shared = shared.data().len(), "Filtered to shared guilds");
        Ok(shared)
    }

    /// Seed the cache for `user_id`, e.g. right after an OAuth login fetched the list.
    pub fn prime_user_guilds_cache(&self, user_id: &str, guilds: Vec<RawGuild>) {
        self.cache.prime(user_id, guilds);
    }
}
