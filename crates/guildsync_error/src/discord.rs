//! Upstream Discord REST failures.
//!
//! These describe what went wrong on the wire. The cache layer maps them into
//! [`CacheErrorKind`](crate::CacheErrorKind) values that callers act on.

use std::time::Duration;

/// Discord REST failure conditions.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum DiscordApiErrorKind {
    /// 401 or 403: the credential was rejected.
    #[display("Discord rejected the credential (HTTP {})", status)]
    Unauthorized {
        /// HTTP status code
        status: u16,
    },

    /// 429: the route is rate limited.
    ///
    /// Carries the raw `retry-after` header and `retry_after` body values in
    /// seconds, when Discord supplied them.
    #[display(
        "Discord rate limited the request (header: {:?}s, body: {:?}s)",
        header_seconds,
        body_seconds
    )]
    RateLimited {
        /// Seconds from the `retry-after` header
        header_seconds: Option<f64>,
        /// Seconds from the JSON body `retry_after` field
        body_seconds: Option<f64>,
    },

    /// The request exceeded its time budget.
    #[display("Discord request timed out after {:?}", _0)]
    Timeout(Duration),

    /// Any other non-success status.
    #[display("Discord returned HTTP {}: {}", status, message)]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Connection-level failure before a response arrived.
    #[display("Discord transport error: {}", _0)]
    Transport(String),

    /// The response body was not the expected JSON shape.
    #[display("Failed to decode Discord response: {}", _0)]
    Decode(String),
}

impl DiscordApiErrorKind {
    /// HTTP status code reported by Discord, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            DiscordApiErrorKind::Unauthorized { status } => Some(*status),
            DiscordApiErrorKind::RateLimited { .. } => Some(429),
            DiscordApiErrorKind::Status { status, .. } => Some(*status),
            DiscordApiErrorKind::Timeout(_)
            | DiscordApiErrorKind::Transport(_)
            | DiscordApiErrorKind::Decode(_) => None,
        }
    }
}

/// Discord REST error with source location tracking.
///
/// # Examples
///
/// ```
/// use guildsync_error::{DiscordApiError, DiscordApiErrorKind};
///
/// let err = DiscordApiError::new(DiscordApiErrorKind::Unauthorized { status: 401 });
/// assert_eq!(err.kind().status(), Some(401));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Discord API Error: {} at line {} in {}", kind, line, file)]
pub struct DiscordApiError {
    kind: DiscordApiErrorKind,
    line: u32,
    file: &'static str,
}

impl DiscordApiError {
    /// Create a new DiscordApiError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: DiscordApiErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &DiscordApiErrorKind {
        &self.kind
    }
}
