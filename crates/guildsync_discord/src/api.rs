//! The seam between the cache and Discord.

use async_trait::async_trait;
use guildsync_core::RawGuild;
use guildsync_error::DiscordApiError;

/// Discord REST operations the guild cache depends on.
///
/// Implementations report every non-success outcome as an error, except the
/// definite "bot is not in this guild" answer (403/404) from
/// [`bot_in_guild`](DiscordApi::bot_in_guild). Callers decide which failures
/// to absorb.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Guilds the owner of `access_token` belongs to.
    async fn user_guilds(&self, access_token: &str) -> Result<Vec<RawGuild>, DiscordApiError>;

    /// Whether the bot is a member of `guild_id`.
    async fn bot_in_guild(&self, guild_id: &str, bot_token: &str)
    -> Result<bool, DiscordApiError>;

    /// Role ids `user_id` holds in `guild_id`.
    async fn member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        bot_token: &str,
    ) -> Result<Vec<String>, DiscordApiError>;
}
