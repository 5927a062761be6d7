//! Failures loading `guildsync.toml` and `GUILDSYNC_*` overrides.

use std::fmt;

/// A configuration source could not be read, or a setting is out of range.
///
/// `field` names the offending setting when one value is at fault; it is
/// `None` for unreadable or unparsable sources.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// What went wrong
    pub message: String,
    /// Setting at fault, as spelled in `guildsync.toml`
    pub field: Option<&'static str>,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// A source-level failure, such as a missing file or bad TOML.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            field: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Setting `field` holds a value that cannot be used.
    ///
    /// # Examples
    ///
    /// ```
    /// use guildsync_error::ConfigError;
    ///
    /// let err = ConfigError::invalid("ttl_secs", "must be greater than zero");
    /// assert_eq!(err.field, Some("ttl_secs"));
    /// assert_eq!(err.message, "ttl_secs must be greater than zero");
    /// ```
    #[track_caller]
    pub fn invalid(field: &'static str, reason: impl fmt::Display) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: format!("{} {}", field, reason),
            field: Some(field),
            line: location.line(),
            file: location.file(),
        }
    }
}
