//! Guild cache failures surfaced to the application.

/// Failure conditions of the guild cache.
///
/// Each kind maps to the HTTP status the application layer should answer
/// with, see [`CacheErrorKind::status`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CacheErrorKind {
    /// The user access token was rejected (401/403). Never retried.
    #[display("Discord access token invalid (HTTP {})", status)]
    TokenInvalid {
        /// Status Discord answered with
        status: u16,
    },

    /// Rate limited with no cached data to fall back on.
    #[display("Discord rate limited, retry after {}ms", retry_after_ms)]
    RateLimited {
        /// Milliseconds until the key may be fetched again
        retry_after_ms: u64,
    },

    /// The guild list request timed out.
    #[display("Discord request timed out")]
    UpstreamTimeout,

    /// Discord failed in some other way (5xx, transport, undecodable body).
    #[display("Discord unavailable: {}", message)]
    UpstreamUnavailable {
        /// Status Discord answered with, if any
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// No bot token configured.
    #[display("Bot token not configured")]
    BotTokenMissing,

    /// The caller supplied no access token.
    #[display("Missing Discord access token")]
    MissingAccessToken,

    /// The caller supplied no user id.
    #[display("Missing Discord user id")]
    MissingUserId,
}

impl CacheErrorKind {
    /// HTTP status the application layer should respond with.
    pub fn status(&self) -> u16 {
        match self {
            CacheErrorKind::TokenInvalid { .. } => 401,
            CacheErrorKind::RateLimited { .. } => 429,
            CacheErrorKind::UpstreamTimeout => 504,
            CacheErrorKind::UpstreamUnavailable { .. } => 502,
            CacheErrorKind::BotTokenMissing => 500,
            CacheErrorKind::MissingAccessToken | CacheErrorKind::MissingUserId => 400,
        }
    }

    /// Suggested `Retry-After` in milliseconds, for rate limit failures.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            CacheErrorKind::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Guild cache error with source location tracking.
///
/// # Examples
///
/// ```
/// use guildsync_error::{CacheError, CacheErrorKind};
///
/// let err = CacheError::new(CacheErrorKind::RateLimited { retry_after_ms: 10_250 });
/// assert_eq!(err.kind().status(), 429);
/// assert_eq!(err.kind().retry_after_ms(), Some(10_250));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Guild Cache Error: {} at line {} in {}", kind, line, file)]
pub struct CacheError {
    kind: CacheErrorKind,
    line: u32,
    file: &'static str,
}

impl CacheError {
    /// Create a new CacheError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CacheErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CacheErrorKind {
        &self.kind
    }
}

impl From<CacheErrorKind> for CacheError {
    #[track_caller]
    fn from(kind: CacheErrorKind) -> Self {
        Self::new(kind)
    }
}
