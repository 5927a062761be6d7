//! Coalescing, rate-limit aware cache of Discord guild memberships.
//!
//! Answers "which guilds is this user in, and is our bot installed in each"
//! without hammering Discord:
//!
//! - one guild-list fetch per user at a time; concurrent callers share it
//! - fresh lists are served from memory for a configurable TTL
//! - on HTTP 429 the user cools down for at least ten seconds and the last
//!   known list is served marked `stale`
//! - per-guild bot checks run through a bounded-concurrency limiter
//!
//! # Quick start
//!
//! ```no_run
//! use guildsync::{GuildQuery, GuildService, GuildSyncConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GuildSyncConfig::load()?;
//! let service = GuildService::from_config(&config)?;
//!
//! let query = GuildQuery::new("user-access-token", "80351110224678912");
//! let guilds = service.get_all_user_guilds_with_bot_status(&query).await?;
//! if *guilds.meta().stale() {
//!     println!("served stale, Discord is rate limiting");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod cli;
mod coalescer;
mod config;
mod service;
mod store;

pub use cache::{CacheSettings, GuildCache};
pub use cli::{Cli, Commands};
pub use coalescer::GuildListEnvelope;
pub use config::{GuildSyncConfig, GuildSyncConfigBuilder};
pub use service::{GuildQuery, GuildService};
pub use store::{CacheEntry, EntryStore};

pub use guildsync_core::{
    Clock, ManualClock, NormalizedGuild, RawGuild, ResultEnvelope, ResultMeta, RoleLabel,
    RolePolicy, RoleSource, Source, SystemClock,
};
pub use guildsync_error::{CacheError, CacheErrorKind, GuildSyncError, GuildSyncResult};
