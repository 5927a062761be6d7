//! Top-level error wrapper types.

use crate::{CacheError, ConfigError, DiscordApiError};

/// Every failure class in the workspace.
///
/// # Examples
///
/// ```
/// use guildsync_error::{ConfigError, GuildSyncError};
///
/// let err: GuildSyncError = ConfigError::new("bad ttl").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum GuildSyncErrorKind {
    /// Guild cache error
    #[from(CacheError)]
    Cache(CacheError),
    /// Raw upstream error
    #[from(DiscordApiError)]
    Discord(DiscordApiError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// guildsync error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("GuildSync Error: {}", _0)]
pub struct GuildSyncError(Box<GuildSyncErrorKind>);

impl GuildSyncError {
    /// Create a new error from a kind.
    pub fn new(kind: GuildSyncErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &GuildSyncErrorKind {
        &self.0
    }

    /// HTTP status the application layer should respond with.
    pub fn status(&self) -> u16 {
        match self.kind() {
            GuildSyncErrorKind::Cache(err) => err.kind().status(),
            GuildSyncErrorKind::Discord(err) => err.kind().status().unwrap_or(502),
            GuildSyncErrorKind::Config(_) => 500,
        }
    }

    /// Suggested `Retry-After` in milliseconds, for rate limit failures.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self.kind() {
            GuildSyncErrorKind::Cache(err) => err.kind().retry_after_ms(),
            _ => None,
        }
    }
}

impl<T> From<T> for GuildSyncError
where
    T: Into<GuildSyncErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for guildsync operations.
pub type GuildSyncResult<T> = std::result::Result<T, GuildSyncError>;
