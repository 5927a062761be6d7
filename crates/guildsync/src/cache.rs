//! The guild cache orchestrator.
//!
//! [`GuildCache`] owns the entry store and composes the coalescer, the
//! backoff controller and the concurrency limiter:
//!
//! ```text
//! get_user_guilds ──lock──► resolve ──► Ready / Rejected / Join / Fetch
//!                                                          │
//!                                      spawn_fetch ◄───────┘
//!                                          │ (outside the lock)
//!                                   DiscordApi::user_guilds
//!                                          │
//!                                   settle ──lock──► record outcome, release inflight
//! ```
//!
//! The store lock is never held across an `.await`.

use crate::coalescer::{
    FetchResult, GuildListEnvelope, Inflight, RawOutcome, Resolution, resolve, spawn_fetch,
};
use crate::config::GuildSyncConfig;
use crate::store::{CacheEntry, EntryStore};
use derive_getters::Getters;
use guildsync_core::{
    Clock, NormalizedGuild, RawGuild, ResultEnvelope, ResultMeta, RolePolicy, SystemClock,
    Verification, normalize_guild,
};
use guildsync_discord::DiscordApi;
use guildsync_error::{CacheError, CacheErrorKind, DiscordApiErrorKind};
use guildsync_rate_limit::{Backoff, ConcurrencyLimiter, DEFAULT_CONCURRENCY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Tunables of a [`GuildCache`].
#[derive(Debug, Clone, PartialEq, Eq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct CacheSettings {
    /// Freshness window of a cached guild list
    ttl: Duration,
    /// Verification concurrency when the caller does not ask for one
    default_concurrency: usize,
    /// Bot token used for per-guild verification
    #[getter(skip)]
    bot_token: Option<String>,
    /// Primary guild and role allowlists
    role_policy: RolePolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            default_concurrency: DEFAULT_CONCURRENCY,
            bot_token: None,
            role_policy: RolePolicy::default(),
        }
    }
}

impl CacheSettings {
    /// Settings taken from a loaded configuration.
    pub fn from_config(config: &GuildSyncConfig) -> Self {
        Self {
            ttl: config.ttl(),
            default_concurrency: *config.default_concurrency(),
            bot_token: config.effective_bot_token().map(str::to_string),
            role_policy: config.role_policy(),
        }
    }

    /// Bot token, if set and not blank.
    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Per-user cache of Discord guild lists.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```no_run
/// use guildsync::{CacheSettings, GuildCache};
/// use guildsync_discord::{DEFAULT_REQUEST_TIMEOUT, DISCORD_API_BASE, DiscordHttpClient};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = DiscordHttpClient::new(DISCORD_API_BASE, DEFAULT_REQUEST_TIMEOUT)?;
/// let cache = GuildCache::new(
///     Arc::new(client),
///     CacheSettings::default().with_bot_token(Some("bot-token".to_string())),
/// );
///
/// let guilds = cache
///     .get_guilds_with_bot_status("user-1", "access-token", None)
///     .await?;
/// println!("{} guilds, source {}", guilds.data().len(), guilds.meta().source());
/// # Ok(())
/// # }
/// ```
pub struct GuildCache {
    api: Arc<dyn DiscordApi>,
    store: Arc<Mutex<EntryStore>>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    settings: CacheSettings,
    next_fetch_id: AtomicU64,
}

impl GuildCache {
    /// Create a cache reading the system clock, with jittered backoff.
    pub fn new(api: Arc<dyn DiscordApi>, settings: CacheSettings) -> Self {
        info!(
            ttl_secs = settings.ttl.as_secs(),
            default_concurrency = settings.default_concurrency,
            bot_token_configured = settings.bot_token().is_some(),
            "Creating guild cache"
        );
        Self {
            api,
            store: Arc::new(Mutex::new(EntryStore::new())),
            clock: Arc::new(SystemClock),
            backoff: Backoff::new(),
            settings,
            next_fetch_id: AtomicU64::new(1),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the backoff controller.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Settings this cache was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, EntryStore> {
        lock_store(&self.store)
    }

    /// Guild list of `user_id`, from cache when possible.
    ///
    /// Concurrent calls for the same user share one upstream fetch. While the
    /// user is cooling down after a 429 the last known list is served stale;
    /// `force` bypasses the freshness check only.
    ///
    /// # Errors
    ///
    /// - `TokenInvalid` if Discord rejects the access token
    /// - `RateLimited` if rate limited with nothing cached
    /// - `UpstreamTimeout` / `UpstreamUnavailable` for other fetch failures
    #[instrument(skip(self, access_token), fields(token_len = access_token.len()))]
    pub async fn get_user_guilds(
        &self,
        user_id: &str,
        access_token: &str,
        force: bool,
    ) -> Result<GuildListEnvelope, CacheError> {
        let pending = {
            let mut store = self.lock();
            let now = self.clock.now_ms();
            let entry = store.get(user_id, now);
            match resolve(entry, now, force) {
                Resolution::Ready(envelope) => return Ok(envelope),
                Resolution::Rejected(err) => return Err(err),
                Resolution::Join(inflight) => inflight.join(),
                Resolution::Fetch => {
                    let inflight = self.start_fetch(user_id, access_token);
                    let pending = inflight.join();
                    entry.set_inflight(inflight);
                    pending
                }
            }
        };

        pending.await
    }

    fn start_fetch(&self, user_id: &str, access_token: &str) -> Inflight {
        let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let api = Arc::clone(&self.api);
        let token = access_token.to_string();
        let settle = Settle {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            backoff: self.backoff.clone(),
            ttl: self.settings.ttl,
            key: user_id.to_string(),
            fetch_id,
        };

        spawn_fetch(
            fetch_id,
            async move { api.user_guilds(&token).await },
            move |outcome| settle.apply(outcome),
        )
    }

    /// Guild list of `user_id` with bot installation and role labels.
    ///
    /// The list comes from [`get_user_guilds`](Self::get_user_guilds) and its
    /// metadata is kept. Each guild is then verified, at most `concurrency`
    /// (default from the settings, capped at 8) at a time. A failed
    /// verification degrades to "not installed" / "no role data" and never
    /// fails the whole call.
    ///
    /// # Errors
    ///
    /// `BotTokenMissing` when no bot token is configured (before any network
    /// call), otherwise whatever `get_user_guilds` fails with.
    #[instrument(skip(self, access_token), fields(token_len = access_token.len()))]
    pub async fn get_guilds_with_bot_status(
        &self,
        user_id: &str,
        access_token: &str,
        concurrency: Option<usize>,
    ) -> Result<ResultEnvelope<Vec<NormalizedGuild>>, CacheError> {
        let bot_token = self
            .settings
            .bot_token()
            .ok_or_else(|| CacheError::new(CacheErrorKind::BotTokenMissing))?;

        let (guilds, meta) = self
            .get_user_guilds(user_id, access_token, false)
            .await?
            .into_parts();

        let limiter =
            ConcurrencyLimiter::new(concurrency.unwrap_or(self.settings.default_concurrency));
        debug!(
            guild_count = guilds.len(),
            concurrency = limiter.limit(),
            "Verifying guilds"
        );

        let normalized = limiter
            .run_all(
                guilds
                    .iter()
                    .map(|guild| move || self.verify(guild, user_id, bot_token)),
            )
            .await;

        Ok(ResultEnvelope::new(normalized, meta))
    }

    async fn verify(&self, guild: &RawGuild, user_id: &str, bot_token: &str) -> NormalizedGuild {
        let policy = &self.settings.role_policy;

        // A 429 here reads as "not installed" and is not retried.
        let bot_installed = match self.api.bot_in_guild(guild.id(), bot_token).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!(guild_id = %guild.id(), error = %e.kind(), "Bot check failed, treating as not installed");
                false
            }
        };

        let member_roles = if bot_installed && policy.is_primary(guild.id()) {
            match self.api.member_roles(guild.id(), user_id, bot_token).await {
                Ok(roles) => Some(roles),
                Err(e) => {
                    warn!(guild_id = %guild.id(), error = %e.kind(), "Member role lookup failed");
                    None
                }
            }
        } else {
            None
        };

        normalize_guild(guild, &Verification::new(bot_installed, member_roles), policy)
    }

    /// Seed `user_id` with `guilds` and a full freshness window.
    pub fn prime(&self, user_id: &str, guilds: Vec<RawGuild>) {
        let now = self.clock.now_ms();
        self.lock().prime(user_id, guilds, now, self.settings.ttl);
    }

    /// Copy of the entry for `user_id`, if one exists.
    pub fn snapshot(&self, user_id: &str) -> Option<CacheEntry> {
        self.lock().peek(user_id).cloned()
    }

    /// Drop entries untouched for longer than `max_idle`. Returns how many.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now_ms();
        self.lock().evict_idle(now, max_idle)
    }

    /// Number of cached users.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no user is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for GuildCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildCache")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn lock_store(store: &Mutex<EntryStore>) -> MutexGuard<'_, EntryStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records the outcome of one fetch in its entry.
struct Settle {
    store: Arc<Mutex<EntryStore>>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    ttl: Duration,
    key: String,
    fetch_id: u64,
}

impl Settle {
    fn apply(self, outcome: RawOutcome) -> FetchResult {
        let mut store = lock_store(&self.store);
        let now = self.clock.now_ms();
        let entry = store.get(&self.key, now);
        entry.release_inflight(self.fetch_id);

        let err = match outcome {
            Ok(Ok(guilds)) => {
                info!(user_id = %self.key, count = guilds.len(), "Fetched guild list");
                let guilds = Arc::new(guilds);
                entry.record_success(Arc::clone(&guilds), now, self.ttl);
                return Ok(ResultEnvelope::new(guilds, ResultMeta::fresh(now)));
            }
            Ok(Err(err)) => err,
            Err(panic) => {
                error!(user_id = %self.key, panic = %panic, "Guild list fetch panicked");
                entry.record_failure(panic.clone(), None);
                return Err(CacheError::new(CacheErrorKind::UpstreamUnavailable {
                    status: None,
                    message: panic,
                }));
            }
        };

        let message = err.kind().to_string();
        match err.kind() {
            DiscordApiErrorKind::RateLimited {
                header_seconds,
                body_seconds,
            } => {
                let cooldown = self.backoff.cooldown(now, *header_seconds, *body_seconds);
                entry.apply_cooldown(&cooldown);
                entry.record_failure(message, Some(429));
                let remaining = entry.cooldown_remaining_ms(now);
                warn!(
                    user_id = %self.key,
                    retry_after_ms = cooldown.retry_after_ms(),
                    has_stale = entry.guilds().is_some(),
                    "Guild list fetch rate limited"
                );

                match entry.guilds() {
                    Some(guilds) => Ok(ResultEnvelope::new(
                        Arc::clone(guilds),
                        ResultMeta::stale_served(
                            Some(*entry.fetched_at()),
                            *cooldown.retry_after_ms(),
                            remaining,
                        ),
                    )),
                    None => Err(CacheError::new(CacheErrorKind::RateLimited {
                        retry_after_ms: remaining,
                    })),
                }
            }
            DiscordApiErrorKind::Unauthorized { status } => {
                warn!(user_id = %self.key, status, "Access token rejected");
                entry.record_failure(message, Some(*status));
                entry.discard_guilds();
                Err(CacheError::new(CacheErrorKind::TokenInvalid { status: *status }))
            }
            DiscordApiErrorKind::Timeout(after) => {
                warn!(user_id = %self.key, ?after, "Guild list fetch timed out");
                entry.record_failure(message, None);
                Err(CacheError::new(CacheErrorKind::UpstreamTimeout))
            }
            kind => {
                warn!(user_id = %self.key, error = %kind, "Guild list fetch failed");
                let status = kind.status();
                entry.record_failure(message.clone(), status);
                Err(CacheError::new(CacheErrorKind::UpstreamUnavailable {
                    status,
                    message,
                }))
            }
        }
    }
}
