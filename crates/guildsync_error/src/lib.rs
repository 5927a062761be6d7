//! Error types for the guildsync workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! [`GuildSyncError`] aggregates every failure class at crate boundaries.
//!
//! # Examples
//!
//! ```
//! use guildsync_error::{CacheError, CacheErrorKind, GuildSyncResult};
//!
//! fn lookup() -> GuildSyncResult<Vec<String>> {
//!     Err(CacheError::new(CacheErrorKind::BotTokenMissing))?
//! }
//!
//! let err = lookup().unwrap_err();
//! assert_eq!(err.status(), 500);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod discord;
mod error;

pub use cache::{CacheError, CacheErrorKind};
pub use config::ConfigError;
pub use discord::{DiscordApiError, DiscordApiErrorKind};
pub use error::{GuildSyncError, GuildSyncErrorKind, GuildSyncResult};
