//! Scripted `DiscordApi` used by the cache tests.

#![allow(dead_code)]

use async_trait::async_trait;
use guildsync::{CacheSettings, GuildCache, ManualClock, RawGuild};
use guildsync_discord::DiscordApi;
use guildsync_error::{DiscordApiError, DiscordApiErrorKind};
use guildsync_rate_limit::Backoff;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One scripted answer of `user_guilds`.
#[derive(Debug, Clone)]
pub enum GuildsReply {
    Guilds(Vec<RawGuild>),
    RateLimited {
        header_seconds: Option<f64>,
        body_seconds: Option<f64>,
    },
    Unauthorized(u16),
    Timeout,
    Status(u16),
    Panic,
}

/// Scripted answer of `bot_in_guild` for one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotReply {
    Installed,
    Missing,
    RateLimited,
    ServerError,
}

#[derive(Default)]
pub struct MockDiscord {
    replies: Mutex<VecDeque<GuildsReply>>,
    gate: Option<Arc<Notify>>,
    bot: Mutex<HashMap<String, BotReply>>,
    roles: Mutex<HashMap<String, Vec<String>>>,
    failing_roles: Mutex<HashSet<String>>,
    user_guild_calls: AtomicUsize,
    bot_calls: AtomicUsize,
    member_calls: AtomicUsize,
    bot_in_flight: AtomicUsize,
    max_bot_in_flight: AtomicUsize,
}

impl MockDiscord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every `user_guilds` call until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Queue the next `user_guilds` answer. An empty queue answers `[]`.
    pub fn push(&self, reply: GuildsReply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn set_bot(&self, guild_id: &str, reply: BotReply) -> &Self {
        self.bot.lock().unwrap().insert(guild_id.to_string(), reply);
        self
    }

    pub fn set_roles(&self, guild_id: &str, roles: &[&str]) -> &Self {
        self.roles.lock().unwrap().insert(
            guild_id.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn fail_roles(&self, guild_id: &str) -> &Self {
        self.failing_roles
            .lock()
            .unwrap()
            .insert(guild_id.to_string());
        self
    }

    pub fn user_guild_calls(&self) -> usize {
        self.user_guild_calls.load(Ordering::SeqCst)
    }

    pub fn bot_calls(&self) -> usize {
        self.bot_calls.load(Ordering::SeqCst)
    }

    pub fn member_calls(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    pub fn max_bot_in_flight(&self) -> usize {
        self.max_bot_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscordApi for MockDiscord {
    async fn user_guilds(&self, _access_token: &str) -> Result<Vec<RawGuild>, DiscordApiError> {
        self.user_guild_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GuildsReply::Guilds(Vec::new()));

        match reply {
            GuildsReply::Guilds(guilds) => Ok(guilds),
            GuildsReply::RateLimited {
                header_seconds,
                body_seconds,
            } => Err(DiscordApiError::new(DiscordApiErrorKind::RateLimited {
                header_seconds,
                body_seconds,
            })),
            GuildsReply::Unauthorized(status) => Err(DiscordApiError::new(
                DiscordApiErrorKind::Unauthorized { status },
            )),
            GuildsReply::Timeout => Err(DiscordApiError::new(DiscordApiErrorKind::Timeout(
                std::time::Duration::from_secs(8),
            ))),
            GuildsReply::Status(status) => {
                Err(DiscordApiError::new(DiscordApiErrorKind::Status {
                    status,
                    message: "upstream failure".to_string(),
                }))
            }
            GuildsReply::Panic => panic!("scripted guild fetch panic"),
        }
    }

    async fn bot_in_guild(
        &self,
        guild_id: &str,
        _bot_token: &str,
    ) -> Result<bool, DiscordApiError> {
        self.bot_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.bot_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_bot_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give other verifications a chance to overlap.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let reply = self
            .bot
            .lock()
            .unwrap()
            .get(guild_id)
            .copied()
            .unwrap_or(BotReply::Missing);
        self.bot_in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            BotReply::Installed => Ok(true),
            BotReply::Missing => Ok(false),
            BotReply::RateLimited => Err(DiscordApiError::new(DiscordApiErrorKind::RateLimited {
                header_seconds: Some(1.0),
                body_seconds: None,
            })),
            BotReply::ServerError => Err(DiscordApiError::new(DiscordApiErrorKind::Status {
                status: 500,
                message: "boom".to_string(),
            })),
        }
    }

    async fn member_roles(
        &self,
        guild_id: &str,
        _user_id: &str,
        _bot_token: &str,
    ) -> Result<Vec<String>, DiscordApiError> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_roles.lock().unwrap().contains(guild_id) {
            return Err(DiscordApiError::new(DiscordApiErrorKind::Status {
                status: 404,
                message: "Unknown Member".to_string(),
            }));
        }
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(guild_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn guild(id: &str) -> RawGuild {
    RawGuild::new(id, format!("Guild {}", id))
}

/// Cache over `api` with a manual clock at t=1_000_000 and no jitter.
pub fn cache_with(api: Arc<MockDiscord>, settings: CacheSettings) -> (GuildCache, ManualClock) {
    let clock = ManualClock::new(1_000_000);
    let cache = GuildCache::new(api, settings)
        .with_clock(Arc::new(clock.clone()))
        .with_backoff(Backoff::without_jitter());
    (cache, clock)
}

pub fn settings_with_bot() -> CacheSettings {
    CacheSettings::default().with_bot_token(Some("bot-token".to_string()))
}
