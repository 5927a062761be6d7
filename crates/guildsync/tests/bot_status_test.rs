//! Tests for per-guild verification and the inbound service API.

mod common;

use common::{BotReply, GuildsReply, MockDiscord, cache_with, guild, settings_with_bot};
use guildsync::{
    CacheErrorKind, CacheSettings, GuildQuery, GuildService, GuildSyncConfig, RoleLabel,
    RolePolicy, RoleSource, Source,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn policy() -> RolePolicy {
    RolePolicy::builder()
        .primary_guild_id(Some("primary".to_string()))
        .admin_role_ids(HashSet::from(["admin-role".to_string()]))
        .club_role_ids(HashSet::from(["club-role".to_string()]))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_missing_bot_token_fails_before_network() {
    let api = Arc::new(MockDiscord::new());
    let (cache, _clock) = cache_with(Arc::clone(&api), CacheSettings::default());

    let err = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), &CacheErrorKind::BotTokenMissing);
    assert_eq!(err.kind().status(), 500);
    assert_eq!(api.user_guild_calls(), 0);
    assert_eq!(api.bot_calls(), 0);
}

#[tokio::test]
async fn test_blank_bot_token_counts_as_missing() {
    let api = Arc::new(MockDiscord::new());
    let settings = CacheSettings::default().with_bot_token(Some("   ".to_string()));
    let (cache, _clock) = cache_with(Arc::clone(&api), settings);

    let err = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &CacheErrorKind::BotTokenMissing);
}

#[tokio::test]
async fn test_failing_verification_keeps_other_guilds() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("g1"), guild("g2"), guild("g3")]));
    api.set_bot("g1", BotReply::Installed)
        .set_bot("g2", BotReply::ServerError)
        .set_bot("g3", BotReply::Installed);
    let (cache, _clock) = cache_with(Arc::clone(&api), settings_with_bot());

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", Some(2))
        .await
        .unwrap();

    let ids: Vec<_> = envelope.data().iter().map(|g| g.id().as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2", "g3"]);
    let installed: Vec<_> = envelope.data().iter().map(|g| *g.bot_installed()).collect();
    assert_eq!(installed, vec![true, false, true]);
    assert_eq!(api.bot_calls(), 3);
}

#[tokio::test]
async fn test_bot_check_rate_limit_reads_as_not_installed() {
    // Known approximation: a 429 on the bot check is not retried and the
    // guild is reported without the bot.
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("g1")]));
    api.set_bot("g1", BotReply::RateLimited);
    let (cache, _clock) = cache_with(Arc::clone(&api), settings_with_bot());

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    assert!(!*envelope.data()[0].bot_installed());
    assert!(!*envelope.data()[0].connectable());
    assert_eq!(api.bot_calls(), 1);
    assert!(!*envelope.meta().rate_limited());
}

#[tokio::test]
async fn test_verification_respects_concurrency_ceiling() {
    let api = Arc::new(MockDiscord::new());
    let guilds: Vec<_> = (0..10).map(|i| guild(&format!("g{}", i))).collect();
    api.push(GuildsReply::Guilds(guilds));
    let (cache, _clock) = cache_with(Arc::clone(&api), settings_with_bot());

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", Some(3))
        .await
        .unwrap();

    assert_eq!(envelope.data().len(), 10);
    assert_eq!(api.bot_calls(), 10);
    assert!(api.max_bot_in_flight() <= 3);
    assert!(api.max_bot_in_flight() >= 1);
}

#[tokio::test]
async fn test_requested_concurrency_is_capped_at_eight() {
    let api = Arc::new(MockDiscord::new());
    let guilds: Vec<_> = (0..20).map(|i| guild(&format!("g{}", i))).collect();
    api.push(GuildsReply::Guilds(guilds));
    let (cache, _clock) = cache_with(Arc::clone(&api), settings_with_bot());

    cache
        .get_guilds_with_bot_status("u1", "token", Some(64))
        .await
        .unwrap();

    assert_eq!(api.bot_calls(), 20);
    assert!(api.max_bot_in_flight() <= 8);
}

#[tokio::test]
async fn test_primary_guild_roles_decide_label() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("primary"), guild("other")]));
    api.set_bot("primary", BotReply::Installed)
        .set_bot("other", BotReply::Installed)
        .set_roles("primary", &["club-role"]);
    let settings = settings_with_bot().with_role_policy(policy());
    let (cache, _clock) = cache_with(Arc::clone(&api), settings);

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    let primary = &envelope.data()[0];
    assert!(*primary.is_primary());
    assert_eq!(*primary.role_label(), RoleLabel::Club);
    assert_eq!(*primary.role_source(), RoleSource::Roles);

    let other = &envelope.data()[1];
    assert!(!*other.is_primary());
    assert_eq!(*other.role_label(), RoleLabel::Member);
    assert_eq!(*other.role_source(), RoleSource::Default);

    // Roles are only looked up for the primary guild.
    assert_eq!(api.member_calls(), 1);
}

#[tokio::test]
async fn test_owner_beats_primary_roles() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("primary").with_owner(true)]));
    api.set_bot("primary", BotReply::Installed)
        .set_roles("primary", &["club-role"]);
    let settings = settings_with_bot().with_role_policy(policy());
    let (cache, _clock) = cache_with(Arc::clone(&api), settings);

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    assert_eq!(*envelope.data()[0].role_label(), RoleLabel::Admin);
    assert_eq!(*envelope.data()[0].role_source(), RoleSource::Permissions);
}

#[tokio::test]
async fn test_member_role_failure_means_no_role_data() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("primary")]));
    api.set_bot("primary", BotReply::Installed)
        .fail_roles("primary");
    let settings = settings_with_bot().with_role_policy(policy());
    let (cache, _clock) = cache_with(Arc::clone(&api), settings);

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    let primary = &envelope.data()[0];
    assert!(*primary.bot_installed());
    assert_eq!(*primary.role_label(), RoleLabel::Member);
    assert_eq!(*primary.role_source(), RoleSource::Default);
}

#[tokio::test]
async fn test_roles_not_looked_up_without_bot() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("primary")]));
    api.set_bot("primary", BotReply::Missing)
        .set_roles("primary", &["admin-role"]);
    let settings = settings_with_bot().with_role_policy(policy());
    let (cache, _clock) = cache_with(Arc::clone(&api), settings);

    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    assert_eq!(api.member_calls(), 0);
    assert_eq!(*envelope.data()[0].role_label(), RoleLabel::Member);
}

#[tokio::test]
async fn test_stale_metadata_carries_through_verification() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::RateLimited {
        header_seconds: Some(1.0),
        body_seconds: None,
    });
    api.set_bot("g1", BotReply::Installed);
    let (cache, clock) = cache_with(Arc::clone(&api), settings_with_bot());
    cache.prime("u1", vec![guild("g1")]);

    clock.advance(Duration::from_secs(61));
    let envelope = cache
        .get_guilds_with_bot_status("u1", "token", None)
        .await
        .unwrap();

    assert_eq!(*envelope.meta().source(), Source::Stale);
    assert!(*envelope.meta().stale());
    assert!(*envelope.meta().rate_limited());
    assert!(*envelope.data()[0].bot_installed());
}

fn service_with(api: Arc<MockDiscord>, bot_token: Option<&str>) -> GuildService {
    let config = GuildSyncConfig::default().with_bot_token(bot_token.map(str::to_string));
    GuildService::from_api(api, &config)
}

#[tokio::test]
async fn test_service_validates_inputs_before_network() {
    let api = Arc::new(MockDiscord::new());

    let service = service_with(Arc::clone(&api), None);
    let err = service
        .get_all_user_guilds_with_bot_status(&GuildQuery::new("token", "u1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &CacheErrorKind::BotTokenMissing);

    let service = service_with(Arc::clone(&api), Some("bot-token"));
    let err = service
        .get_all_user_guilds_with_bot_status(&GuildQuery::new("", "u1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &CacheErrorKind::MissingAccessToken);
    assert_eq!(err.kind().status(), 400);

    let err = service
        .get_shared_guilds_for_user(&GuildQuery::new("token", " "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &CacheErrorKind::MissingUserId);

    assert_eq!(api.user_guild_calls(), 0);
}

#[tokio::test]
async fn test_shared_guilds_only_include_installed() {
    let api = Arc::new(MockDiscord::new());
    api.push(GuildsReply::Guilds(vec![guild("g1"), guild("g2"), guild("g3")]));
    api.set_bot("g2", BotReply::Installed);
    let service = service_with(Arc::clone(&api), Some("bot-token"));

    let shared = service
        .get_shared_guilds_for_user(&GuildQuery::new("token", "u1").with_concurrency(2usize))
        .await
        .unwrap();

    assert_eq!(shared.data().len(), 1);
    assert_eq!(shared.data()[0].id(), "g2");
    assert_eq!(*shared.meta().source(), Source::Fresh);
}

#[tokio::test]
async fn test_primed_cache_serves_service_queries() {
    let api = Arc::new(MockDiscord::new());
    api.set_bot("g1", BotReply::Installed);
    let service = service_with(Arc::clone(&api), Some("bot-token"));

    service.prime_user_guilds_cache("u1", vec![guild("g1")]);
    let all = service
        .get_all_user_guilds_with_bot_status(&GuildQuery::new("token", "u1"))
        .await
        .unwrap();

    assert_eq!(api.user_guild_calls(), 0);
    assert_eq!(*all.meta().source(), Source::Cache);
    assert!(*all.data()[0].connectable());
}
