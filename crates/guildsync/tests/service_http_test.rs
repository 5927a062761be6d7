//! End-to-end tests of the service against a mock Discord server.

use guildsync::{CacheErrorKind, GuildQuery, GuildService, GuildSyncConfig, RoleLabel, Source};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> GuildSyncConfig {
    GuildSyncConfig::default()
        .with_api_base(server.uri())
        .with_bot_token(Some("bot-token".to_string()))
        .with_request_timeout_ms(2_000)
        .with_primary_guild_id(Some("g1".to_string()))
        .with_admin_role_ids(vec!["admin-role".to_string()])
}

#[tokio::test]
async fn test_guilds_with_bot_status_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/guilds"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "g1", "name": "Primary", "icon": null, "owner": false, "permissions": "0"},
            {"id": "g2", "name": "Other", "icon": "abc", "owner": false, "permissions": 32}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/g1"))
        .and(header("authorization", "Bot bot-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/g2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guilds/g1/members/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"roles": ["admin-role"]})))
        // Role lookups are not cached: once per service call.
        .expect(2)
        .mount(&server)
        .await;

    let service = GuildService::from_config(&config_for(&server)).unwrap();
    let query = GuildQuery::new("user-token", "u1");

    let all = service
        .get_all_user_guilds_with_bot_status(&query)
        .await
        .unwrap();
    assert_eq!(*all.meta().source(), Source::Fresh);
    assert_eq!(all.data().len(), 2);

    let primary = &all.data()[0];
    assert!(*primary.bot_installed());
    assert!(*primary.is_primary());
    assert_eq!(*primary.role_label(), RoleLabel::Admin);

    let other = &all.data()[1];
    assert!(!*other.bot_installed());
    assert_eq!(*other.role_label(), RoleLabel::Admin);

    // Served from cache: the guild list mock expects a single call.
    let shared = service.get_shared_guilds_for_user(&query).await.unwrap();
    assert_eq!(*shared.meta().source(), Source::Cache);
    assert_eq!(shared.data().len(), 1);
    assert_eq!(shared.data()[0].id(), "g1");
}

#[tokio::test]
async fn test_rate_limited_without_cache_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/guilds"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .set_body_json(json!({"retry_after": 30.0, "global": false})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = GuildService::from_config(&config_for(&server)).unwrap();
    let query = GuildQuery::new("user-token", "u1");

    let err = service
        .get_all_user_guilds_with_bot_status(&query)
        .await
        .unwrap_err();
    let retry_after_ms = err.kind().retry_after_ms().unwrap();
    assert!((30_000..=30_250).contains(&retry_after_ms));

    // Cooling down: answered locally.
    let err = service
        .get_all_user_guilds_with_bot_status(&query)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), CacheErrorKind::RateLimited { .. }));
}

#[tokio::test]
async fn test_invalid_token_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/guilds"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "401: Unauthorized"})))
        .mount(&server)
        .await;

    let service = GuildService::from_config(&config_for(&server)).unwrap();
    let err = service
        .get_all_user_guilds_with_bot_status(&GuildQuery::new("expired", "u3"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), &CacheErrorKind::TokenInvalid { status: 401 });
}
