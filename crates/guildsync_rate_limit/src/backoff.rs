//! Cooldown computation for Discord 429 responses.
//!
//! Discord reports how long to wait either in a `retry-after` header or a
//! `retry_after` JSON body field, both in (possibly fractional) seconds. The
//! header wins over the body; when neither is usable one second is assumed.
//!
//! ```text
//! retry_after = clamp(250ms, 10min, round(seconds * 1000)) + jitter(0..250ms)
//! cooldown    = now + max(10s, retry_after)
//! ```

use derive_getters::Getters;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Lower clamp on the reported retry delay.
pub const MIN_RETRY_AFTER: Duration = Duration::from_millis(250);
/// Upper clamp on the reported retry delay.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(10 * 60);
/// Upper bound of the uniform jitter added to the retry delay.
pub const MAX_JITTER: Duration = Duration::from_millis(250);
/// Shortest cooldown ever applied to a key.
pub const MIN_COOLDOWN: Duration = Duration::from_secs(10);
/// Assumed delay when Discord supplies nothing usable.
pub const FALLBACK_RETRY_AFTER_SECS: f64 = 1.0;

/// A cooldown window computed from one 429 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct Cooldown {
    /// Epoch milliseconds before which the key must not be fetched
    until: u64,
    /// Length of the window in milliseconds (never below [`MIN_COOLDOWN`])
    retry_after_ms: u64,
}

impl Cooldown {
    /// Merge with a cooldown already active on the key.
    ///
    /// Cooldowns only ever extend: the later deadline wins.
    pub fn extend(&self, existing_until: u64) -> u64 {
        existing_until.max(self.until)
    }
}

/// Pick the retry delay in seconds: header, then body, then the fallback.
///
/// Non-finite and negative values are treated as absent.
fn pick_seconds(header_seconds: Option<f64>, body_seconds: Option<f64>) -> f64 {
    [header_seconds, body_seconds]
        .into_iter()
        .flatten()
        .find(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(FALLBACK_RETRY_AFTER_SECS)
}

/// Retry delay reported by Discord, clamped to `[MIN_RETRY_AFTER, MAX_RETRY_AFTER]`.
///
/// # Example
///
/// ```
/// use guildsync_rate_limit::clamp_retry_after;
/// use std::time::Duration;
///
/// assert_eq!(clamp_retry_after(Some(1.5), Some(9.0)), Duration::from_millis(1_500));
/// assert_eq!(clamp_retry_after(None, Some(0.1)), Duration::from_millis(250));
/// assert_eq!(clamp_retry_after(Some(f64::NAN), None), Duration::from_secs(1));
/// ```
pub fn clamp_retry_after(header_seconds: Option<f64>, body_seconds: Option<f64>) -> Duration {
    let ms = (pick_seconds(header_seconds, body_seconds) * 1000.0).round();
    let ms = ms.clamp(
        MIN_RETRY_AFTER.as_millis() as f64,
        MAX_RETRY_AFTER.as_millis() as f64,
    );
    Duration::from_millis(ms as u64)
}

/// Compute the cooldown for a 429 received at `now_ms`.
///
/// `jitter` is capped at [`MAX_JITTER`]; pass `Duration::ZERO` for a
/// deterministic result.
pub fn compute_cooldown(
    now_ms: u64,
    header_seconds: Option<f64>,
    body_seconds: Option<f64>,
    jitter: Duration,
) -> Cooldown {
    let retry_after = clamp_retry_after(header_seconds, body_seconds) + jitter.min(MAX_JITTER);
    let window = retry_after.max(MIN_COOLDOWN).as_millis() as u64;
    Cooldown {
        until: now_ms.saturating_add(window),
        retry_after_ms: window,
    }
}

/// Whether a key whose cooldown ends at `rate_limited_until` is still cooling down.
pub fn is_cooling_down(rate_limited_until: u64, now_ms: u64) -> bool {
    rate_limited_until > now_ms
}

/// Milliseconds left in a cooldown, zero once it has passed.
pub fn remaining_ms(rate_limited_until: u64, now_ms: u64) -> u64 {
    rate_limited_until.saturating_sub(now_ms)
}

type JitterFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// Backoff controller applying random jitter to [`compute_cooldown`].
///
/// # Example
///
/// ```
/// use guildsync_rate_limit::{Backoff, MIN_COOLDOWN};
///
/// let backoff = Backoff::without_jitter();
/// let cooldown = backoff.cooldown(0, Some(0.1), None);
/// assert_eq!(*cooldown.retry_after_ms(), MIN_COOLDOWN.as_millis() as u64);
/// ```
#[derive(Clone)]
pub struct Backoff {
    jitter: JitterFn,
}

impl Backoff {
    /// Backoff with uniform random jitter in `[0, MAX_JITTER)`.
    pub fn new() -> Self {
        Self {
            jitter: Arc::new(tokio_retry2::strategy::jitter),
        }
    }

    /// Backoff that never adds jitter.
    pub fn without_jitter() -> Self {
        Self::with_jitter_fn(|_| Duration::ZERO)
    }

    /// Backoff with a custom jitter source.
    ///
    /// The function receives [`MAX_JITTER`] and returns the jitter to add.
    pub fn with_jitter_fn(f: impl Fn(Duration) -> Duration + Send + Sync + 'static) -> Self {
        Self { jitter: Arc::new(f) }
    }

    /// Compute the cooldown for a 429 received at `now_ms`.
    #[instrument(skip(self))]
    pub fn cooldown(
        &self,
        now_ms: u64,
        header_seconds: Option<f64>,
        body_seconds: Option<f64>,
    ) -> Cooldown {
        let jitter = (self.jitter)(MAX_JITTER);
        let cooldown = compute_cooldown(now_ms, header_seconds, body_seconds, jitter);
        debug!(
            retry_after_ms = cooldown.retry_after_ms,
            until = cooldown.until,
            "Computed rate limit cooldown"
        );
        cooldown
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff").finish_non_exhaustive()
    }
}
