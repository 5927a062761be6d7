//! `reqwest` implementation of [`DiscordApi`].

use crate::DiscordApi;
use async_trait::async_trait;
use guildsync_core::RawGuild;
use guildsync_error::{DiscordApiError, DiscordApiErrorKind};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Discord REST API base URL.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
/// Per-request time budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// 429 response body.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<f64>,
}

/// Guild member response, only the part we read.
#[derive(Debug, Deserialize)]
struct MemberBody {
    #[serde(default)]
    roles: Vec<serde_json::Value>,
}

/// Discord REST client.
///
/// # Example
///
/// ```no_run
/// use guildsync_discord::{DiscordApi, DiscordHttpClient, DISCORD_API_BASE, DEFAULT_REQUEST_TIMEOUT};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = DiscordHttpClient::new(DISCORD_API_BASE, DEFAULT_REQUEST_TIMEOUT)?;
/// let guilds = client.user_guilds("user-oauth-token").await?;
/// println!("{} guilds", guilds.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DiscordHttpClient {
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl DiscordHttpClient {
    /// Create a client for `api_base` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, DiscordApiError> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        debug!(api_base = %api_base, timeout_ms = timeout.as_millis() as u64, "Creating Discord HTTP client");

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DiscordApiError::new(DiscordApiErrorKind::Transport(format!(
                "Failed to build HTTP client: {}",
                e
            )))
        })?;

        Ok(Self {
            client,
            api_base,
            timeout,
        })
    }

    /// Base URL requests are sent to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get(&self, path: &str, authorization: String) -> Result<Response, DiscordApiError> {
        let url = format!("{}{}", self.api_base, path);
        self.client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> DiscordApiError {
        if err.is_timeout() {
            DiscordApiError::new(DiscordApiErrorKind::Timeout(self.timeout))
        } else {
            DiscordApiError::new(DiscordApiErrorKind::Transport(err.to_string()))
        }
    }

    /// Turn a non-success response into an error.
    async fn failure(&self, response: Response) -> DiscordApiError {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                DiscordApiError::new(DiscordApiErrorKind::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let header_seconds = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok());
                let body_seconds = response
                    .text()
                    .await
                    .ok()
                    .and_then(|body| serde_json::from_str::<RateLimitBody>(&body).ok())
                    .and_then(|body| body.retry_after);
                warn!(?header_seconds, ?body_seconds, "Discord returned 429");
                DiscordApiError::new(DiscordApiErrorKind::RateLimited {
                    header_seconds,
                    body_seconds,
                })
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                DiscordApiError::new(DiscordApiErrorKind::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl DiscordApi for DiscordHttpClient {
    #[instrument(skip(self, access_token), fields(token_len = access_token.len()))]
    async fn user_guilds(&self, access_token: &str) -> Result<Vec<RawGuild>, DiscordApiError> {
        let response = self
            .get("/users/@me/guilds", format!("Bearer {}", access_token))
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            DiscordApiError::new(DiscordApiErrorKind::Decode(e.to_string()))
        })?;

        if !body.is_array() {
            warn!("Discord user guilds response was not an array, treating as empty");
            return Ok(Vec::new());
        }

        let guilds: Vec<RawGuild> = serde_json::from_value(body)
            .map_err(|e| DiscordApiError::new(DiscordApiErrorKind::Decode(e.to_string())))?;
        debug!(count = guilds.len(), "Fetched user guilds");
        Ok(guilds)
    }

    #[instrument(skip(self, bot_token))]
    async fn bot_in_guild(
        &self,
        guild_id: &str,
        bot_token: &str,
    ) -> Result<bool, DiscordApiError> {
        let response = self
            .get(&format!("/guilds/{}", guild_id), format!("Bot {}", bot_token))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            _ => Err(self.failure(response).await),
        }
    }

    #[instrument(skip(self, bot_token))]
    async fn member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        bot_token: &str,
    ) -> Result<Vec<String>, DiscordApiError> {
        let response = self
            .get(
                &format!("/guilds/{}/members/{}", guild_id, user_id),
                format!("Bot {}", bot_token),
            )
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response).await);
        }

        let member: MemberBody = response.json().await.map_err(|e| {
            DiscordApiError::new(DiscordApiErrorKind::Decode(e.to_string()))
        })?;

        Ok(member
            .roles
            .into_iter()
            .map(|role| match role {
                serde_json::Value::String(id) => id,
                other => other.to_string(),
            })
            .collect())
    }
}
