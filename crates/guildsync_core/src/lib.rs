//! Core data types for the guildsync Discord guild cache.
//!
//! This crate provides the data model shared by every other guildsync crate:
//! raw Discord guild records, the normalized guild shape handed to the
//! application, the result envelope carrying cache metadata, and the clock
//! abstraction the cache reads time from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod envelope;
mod guild;
mod normalize;
mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{ResultEnvelope, ResultMeta, Source};
pub use guild::RawGuild;
pub use normalize::{
    ADMINISTRATOR, MANAGE_GUILD, NormalizedGuild, RoleLabel, RolePolicy, RolePolicyBuilder,
    RoleSource, Verification, has_admin_or_manage_permission, normalize_guild,
};
pub use telemetry::init_tracing;
