//! At most one outbound guild-list fetch per user.
//!
//! A fetch runs as its own Tokio task and is exposed through a
//! [`Shared`] future, so every caller that attaches receives the same value or
//! the same error. The task records the outcome in the cache entry and clears
//! the inflight handle itself, so the key is released even if all callers
//! went away or the fetch panicked.
//!
//! | cached fresh? | cooling down? | inflight? | action |
//! |---|---|---|---|
//! | yes, !force | any | any | serve cache |
//! | no | yes | any | serve stale, or fail with `RateLimited` when nothing is cached |
//! | no | no | yes | join the running fetch |
//! | no | no | no | start a fetch |

use crate::store::CacheEntry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use guildsync_core::{RawGuild, ResultEnvelope, ResultMeta};
use guildsync_error::{CacheError, CacheErrorKind, DiscordApiError};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Guild list with its cache metadata.
pub type GuildListEnvelope = ResultEnvelope<Arc<Vec<RawGuild>>>;

/// What every caller attached to one fetch receives.
pub(crate) type FetchResult = Result<GuildListEnvelope, CacheError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Upstream result, or the panic message if the fetch panicked.
pub(crate) type RawOutcome = Result<Result<Vec<RawGuild>, DiscordApiError>, String>;

/// Handle to the running fetch of one key.
#[derive(Clone)]
pub(crate) struct Inflight {
    id: u64,
    fetch: SharedFetch,
}

impl Inflight {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// A future resolving to the fetch's result.
    pub(crate) fn join(&self) -> SharedFetch {
        self.fetch.clone()
    }
}

impl fmt::Debug for Inflight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inflight").field("id", &self.id).finish_non_exhaustive()
    }
}

/// What to do for one lookup.
pub(crate) enum Resolution {
    /// Answer immediately.
    Ready(GuildListEnvelope),
    /// Fail immediately.
    Rejected(CacheError),
    /// Attach to the running fetch.
    Join(Inflight),
    /// No usable data and nothing running: start a fetch.
    Fetch,
}

/// Apply the decision table to `entry`.
pub(crate) fn resolve(entry: &CacheEntry, now_ms: u64, force: bool) -> Resolution {
    if !force && entry.is_fresh(now_ms) {
        if let Some(guilds) = entry.guilds() {
            debug!("Serving fresh cache entry");
            return Resolution::Ready(ResultEnvelope::new(
                guilds.clone(),
                ResultMeta::cached(Some(*entry.fetched_at())),
            ));
        }
    }

    if entry.is_cooling_down(now_ms) {
        let remaining = entry.cooldown_remaining_ms(now_ms);
        return match entry.guilds() {
            Some(guilds) => {
                debug!(remaining_ms = remaining, "Cooling down, serving stale entry");
                Resolution::Ready(ResultEnvelope::new(
                    guilds.clone(),
                    ResultMeta::stale_served(
                        Some(*entry.fetched_at()),
                        remaining,
                        remaining,
                    ),
                ))
            }
            None => {
                debug!(remaining_ms = remaining, "Cooling down with nothing cached");
                Resolution::Rejected(CacheError::new(CacheErrorKind::RateLimited {
                    retry_after_ms: remaining,
                }))
            }
        };
    }

    match entry.inflight() {
        Some(inflight) => {
            debug!(fetch_id = inflight.id(), "Joining inflight fetch");
            Resolution::Join(inflight.clone())
        }
        None => Resolution::Fetch,
    }
}

/// Spawn `fetch`, then hand its outcome to `settle` on the same task.
///
/// `settle` must record the outcome and release the inflight handle; it runs
/// exactly once, after the fetch finishes or panics.
pub(crate) fn spawn_fetch<F, S>(id: u64, fetch: F, settle: S) -> Inflight
where
    F: Future<Output = Result<Vec<RawGuild>, DiscordApiError>> + Send + 'static,
    S: FnOnce(RawOutcome) -> FetchResult + Send + 'static,
{
    debug!(fetch_id = id, "Starting guild list fetch");
    let handle = tokio::spawn(async move {
        let outcome = AssertUnwindSafe(fetch)
            .catch_unwind()
            .await
            .map_err(panic_message);
        settle(outcome)
    });

    let fetch = async move {
        handle.await.unwrap_or_else(|e| {
            error!(fetch_id = id, error = %e, "Guild fetch task failed");
            Err(CacheError::new(CacheErrorKind::UpstreamUnavailable {
                status: None,
                message: format!("guild fetch task failed: {}", e),
            }))
        })
    }
    .boxed()
    .shared();

    Inflight { id, fetch }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "guild fetch panicked".to_string())
}
