//! Per-user cache entries.
//!
//! The store is plain data: it never performs I/O and never reads the clock.
//! The orchestrator passes `now` in and is the only writer.

use crate::coalescer::Inflight;
use derive_getters::Getters;
use guildsync_core::RawGuild;
use guildsync_rate_limit::{Cooldown, is_cooling_down, remaining_ms};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cached state of one user's guild list.
///
/// `guilds` is `None` until the first successful fetch (or prime). While
/// `guilds` is present `expires_at >= fetched_at`. `rate_limited_until` only
/// grows while a cooldown is active and returns to zero on success.
#[derive(Debug, Clone, Default, Getters)]
pub struct CacheEntry {
    /// Last known guild list
    guilds: Option<Arc<Vec<RawGuild>>>,
    /// When `guilds` was fetched (epoch ms)
    fetched_at: u64,
    /// End of the freshness window (epoch ms)
    expires_at: u64,
    /// End of the rate limit cooldown (epoch ms), zero when none
    rate_limited_until: u64,
    /// Message of the most recent failed fetch
    last_error: Option<String>,
    /// HTTP status of the most recent failed fetch
    last_status: Option<u16>,
    /// Last time the entry was read or written (epoch ms)
    last_touched: u64,
    #[getter(skip)]
    inflight: Option<Inflight>,
}

impl CacheEntry {
    /// Whether the cached list is inside its freshness window.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        self.guilds.is_some() && now_ms < self.expires_at
    }

    /// Whether new fetches are suppressed by a rate limit cooldown.
    pub fn is_cooling_down(&self, now_ms: u64) -> bool {
        is_cooling_down(self.rate_limited_until, now_ms)
    }

    /// Milliseconds until fetches are allowed again.
    pub fn cooldown_remaining_ms(&self, now_ms: u64) -> u64 {
        remaining_ms(self.rate_limited_until, now_ms)
    }

    /// Whether a fetch for this key is running.
    pub fn is_fetching(&self) -> bool {
        self.inflight.is_some()
    }

    pub(crate) fn inflight(&self) -> Option<&Inflight> {
        self.inflight.as_ref()
    }

    pub(crate) fn set_inflight(&mut self, inflight: Inflight) {
        debug_assert!(self.inflight.is_none(), "second inflight fetch for one key");
        self.inflight = Some(inflight);
    }

    /// Clear the inflight handle if it still belongs to fetch `id`.
    pub(crate) fn release_inflight(&mut self, id: u64) {
        if self.inflight.as_ref().is_some_and(|i| i.id() == id) {
            self.inflight = None;
        }
    }

    pub(crate) fn record_success(&mut self, guilds: Arc<Vec<RawGuild>>, now_ms: u64, ttl: Duration) {
        self.guilds = Some(guilds);
        self.fetched_at = now_ms;
        self.expires_at = now_ms.saturating_add(duration_ms(ttl));
        self.rate_limited_until = 0;
        self.last_error = None;
        self.last_status = None;
    }

    pub(crate) fn record_failure(&mut self, message: String, status: Option<u16>) {
        self.last_error = Some(message);
        self.last_status = status;
    }

    /// Extend the cooldown; it never shrinks.
    pub(crate) fn apply_cooldown(&mut self, cooldown: &Cooldown) {
        self.rate_limited_until = cooldown.extend(self.rate_limited_until);
    }

    /// Drop the cached list, keeping diagnostics.
    pub(crate) fn discard_guilds(&mut self) {
        self.guilds = None;
        self.fetched_at = 0;
        self.expires_at = 0;
    }

    fn touch(&mut self, now_ms: u64) {
        self.last_touched = self.last_touched.max(now_ms);
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Map from user id to cache entry.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
}

impl EntryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, created empty if absent.
    pub fn get(&mut self, key: &str, now_ms: u64) -> &mut CacheEntry {
        let entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            debug!(key, "Creating cache entry");
            CacheEntry::default()
        });
        entry.touch(now_ms);
        entry
    }

    /// Entry for `key` without creating or touching it.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Seed `key` with `guilds` and a full freshness window.
    pub fn prime(&mut self, key: &str, guilds: Vec<RawGuild>, now_ms: u64, ttl: Duration) {
        debug!(key, count = guilds.len(), "Priming cache entry");
        self.get(key, now_ms)
            .record_success(Arc::new(guilds), now_ms, ttl);
    }

    /// Remove idle entries untouched for longer than `max_idle`.
    ///
    /// Entries with a fetch in flight or an active cooldown are kept.
    /// Returns the number removed.
    pub fn evict_idle(&mut self, now_ms: u64, max_idle: Duration) -> usize {
        let max_idle_ms = duration_ms(max_idle);
        let before = self.entries.len();

        self.entries.retain(|_, entry| {
            entry.is_fetching()
                || entry.is_cooling_down(now_ms)
                || now_ms.saturating_sub(entry.last_touched) <= max_idle_ms
        });

        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, remaining = self.entries.len(), "Evicted idle cache entries");
        }
        removed
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
