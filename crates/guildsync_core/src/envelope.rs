//! Result envelope carrying cache metadata alongside the data.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Where the data in an envelope came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Fetched from Discord for this request (or a request it joined).
    #[display("fresh")]
    Fresh,
    /// Served from a cache entry still inside its freshness window.
    #[display("cache")]
    Cache,
    /// Served from an expired cache entry because Discord is rate limiting.
    #[display("stale")]
    Stale,
}

/// Metadata describing how a result was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    source: Source,
    stale: bool,
    rate_limited: bool,
    retry_after_ms: Option<u64>,
    cooldown_remaining_ms: Option<u64>,
    fetched_at: Option<u64>,
}

impl ResultMeta {
    /// Data just fetched from Discord.
    pub fn fresh(fetched_at: u64) -> Self {
        Self {
            source: Source::Fresh,
            stale: false,
            rate_limited: false,
            retry_after_ms: None,
            cooldown_remaining_ms: None,
            fetched_at: Some(fetched_at),
        }
    }

    /// Data served from a fresh cache entry.
    pub fn cached(fetched_at: Option<u64>) -> Self {
        Self {
            source: Source::Cache,
            fetched_at,
            ..Self::fresh(0)
        }
    }

    /// Expired data served while the key is cooling down after a 429.
    pub fn stale_served(
        fetched_at: Option<u64>,
        retry_after_ms: u64,
        cooldown_remaining_ms: u64,
    ) -> Self {
        Self {
            source: Source::Stale,
            stale: true,
            rate_limited: true,
            retry_after_ms: Some(retry_after_ms),
            cooldown_remaining_ms: Some(cooldown_remaining_ms),
            fetched_at,
        }
    }
}

/// Data plus the metadata describing where it came from.
///
/// # Example
///
/// ```
/// use guildsync_core::{ResultEnvelope, ResultMeta, Source};
///
/// let envelope = ResultEnvelope::new(vec![1, 2, 3], ResultMeta::fresh(1_000));
/// let lengths = envelope.map(|v| v.len());
/// assert_eq!(*lengths.data(), 3);
/// assert_eq!(*lengths.meta().source(), Source::Fresh);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ResultEnvelope<T> {
    data: T,
    meta: ResultMeta,
}

impl<T> ResultEnvelope<T> {
    /// Wrap data with its metadata.
    pub fn new(data: T, meta: ResultMeta) -> Self {
        Self { data, meta }
    }

    /// Transform the data, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        ResultEnvelope {
            data: f(self.data),
            meta: self.meta,
        }
    }

    /// Take the data, discarding the metadata.
    pub fn into_data(self) -> T {
        self.data
    }

    /// Split into data and metadata.
    pub fn into_parts(self) -> (T, ResultMeta) {
        (self.data, self.meta)
    }
}
