//! Discord REST access for the guild cache.
//!
//! The cache talks to Discord only through the [`DiscordApi`] trait, so it can
//! be exercised without network access. [`DiscordHttpClient`] is the
//! production implementation built on `reqwest`.
//!
//! Endpoints used:
//! - `GET /users/@me/guilds` with the user's OAuth access token
//! - `GET /guilds/{guild_id}` with the bot token (is the bot installed?)
//! - `GET /guilds/{guild_id}/members/{user_id}` with the bot token (member roles)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod client;

pub use api::DiscordApi;
pub use client::{DEFAULT_REQUEST_TIMEOUT, DISCORD_API_BASE, DiscordHttpClient};
