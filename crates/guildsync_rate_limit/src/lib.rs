//! Rate-limit backoff and bounded concurrency.
//!
//! Two independent pieces live here:
//! - [`Backoff`] turns a Discord 429 into a per-key cooldown window, with a
//!   floor that stops retry storms when Discord reports a near-zero
//!   `retry_after`, a ceiling, and jitter so many keys do not retry in lockstep.
//! - [`ConcurrencyLimiter`] bounds how many per-guild verification calls run
//!   at once, queuing the rest in submission order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod limiter;

pub use backoff::{
    Backoff, Cooldown, FALLBACK_RETRY_AFTER_SECS, MAX_JITTER, MAX_RETRY_AFTER, MIN_COOLDOWN,
    MIN_RETRY_AFTER, clamp_retry_after, compute_cooldown, is_cooling_down, remaining_ms,
};
pub use limiter::{ConcurrencyLimiter, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
