use std::{sync::Arc, time::Duration};

use anyhow::Result;
use dispatch_service::{
    clients::{
        identity::{IdentityClient, IdentitySettings},
        token::TokenCache,
    },
    error::DispatchError,
    models::notification::ChannelType,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

use crate::common::user;

fn settings(server: &MockServer) -> IdentitySettings {
    IdentitySettings {
        channels_url: format!("{}/api/v1/users/channels", server.uri()),
        users_url: format!("{}/api/v1/users", server.uri()),
        login_url: format!("{}/api/v1/auth/login", server.uri()),
        refresh_url: format!("{}/api/v1/auth/refresh", server.uri()),
        username: "dispatch".to_string(),
        password: "secret".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn channels_body() -> serde_json::Value {
    json!([
        {"id": user(1), "channels": [{"type": "email", "value": "u1@example.com"}]},
        {"id": user(2), "channels": [
            {"type": "email", "value": "u2@example.com"},
            {"type": "sms", "value": "+4790000002"}
        ]}
    ])
}

async fn mount_channels(server: &MockServer, token: &str, status: u16, times: u64) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(channels_body())
    } else {
        ResponseTemplate::new(status)
    };

    Mock::given(method("GET"))
        .and(path("/api/v1/users/channels"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_string_contains("username=dispatch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refresh_token": "refresh-1"})))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, status: u16, times: u64) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"}))
    } else {
        ResponseTemplate::new(status)
    };

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(header("authorization", "Bearer refresh-1"))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

/// Test: A valid cached token fetches channels without touching auth endpoints
#[tokio::test]
async fn test_valid_token_resolves_channels() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "valid", 200, 1).await;
    mount_login(&server, 0).await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("valid")),
    )?;

    let channels = client.get_users_channels(&[user(1), user(2)]).await?;

    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].id, user(1));
    assert!(channels[1].has_channel(&ChannelType::new("sms")));
    assert_eq!(
        channels[1].addresses_for(&ChannelType::email()).collect::<Vec<_>>(),
        vec!["u2@example.com"]
    );

    Ok(())
}

/// Test: A rejected token triggers login, refresh and exactly one retry
#[tokio::test]
async fn test_expired_token_is_refreshed_and_retried() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "stale", 401, 1).await;
    mount_channels(&server, "fresh", 200, 1).await;
    mount_login(&server, 1).await;
    mount_refresh(&server, 200, 1).await;

    let tokens = Arc::new(TokenCache::with_access_token("stale"));
    let client = IdentityClient::new(settings(&server), tokens.clone())?;

    let channels = client.get_users_channels(&[user(1), user(2)]).await?;

    assert_eq!(channels.len(), 2, "Retry returns the same result as a valid token");
    let snapshot = tokens.snapshot();
    assert_eq!(snapshot.access_token.as_deref(), Some("fresh"));
    assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh-1"));

    Ok(())
}

/// Test: Forbidden responses are treated like expired tokens
#[tokio::test]
async fn test_forbidden_triggers_refresh() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "stale", 403, 1).await;
    mount_channels(&server, "fresh", 200, 1).await;
    mount_login(&server, 1).await;
    mount_refresh(&server, 200, 1).await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("stale")),
    )?;

    assert_eq!(client.get_users_channels(&[user(1)]).await?.len(), 2);

    Ok(())
}

/// Test: Without a cached token the client authenticates before the first call
#[tokio::test]
async fn test_missing_token_authenticates_first() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "fresh", 200, 1).await;
    mount_login(&server, 1).await;
    mount_refresh(&server, 200, 1).await;

    let tokens = Arc::new(TokenCache::new());
    let client = IdentityClient::new(settings(&server), tokens.clone())?;

    client.get_users_channels(&[user(1)]).await?;
    assert_eq!(tokens.access_token().as_deref(), Some("fresh"));

    Ok(())
}

/// Test: A failed refresh surfaces as an authentication failure
#[tokio::test]
async fn test_refresh_failure_is_auth_failure() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "stale", 401, 1).await;
    mount_login(&server, 1).await;
    mount_refresh(&server, 401, 1).await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("stale")),
    )?;

    let result = client.get_users_channels(&[user(1)]).await;
    assert!(matches!(result, Err(DispatchError::UpstreamAuthFailure(_))));

    Ok(())
}

/// Test: A fresh token rejected again is not retried a second time
#[tokio::test]
async fn test_rejected_retry_is_auth_failure() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "stale", 401, 1).await;
    mount_channels(&server, "fresh", 401, 1).await;
    mount_login(&server, 1).await;
    mount_refresh(&server, 200, 1).await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("stale")),
    )?;

    let result = client.get_users_channels(&[user(1)]).await;
    assert!(matches!(result, Err(DispatchError::UpstreamAuthFailure(_))));

    Ok(())
}

/// Test: Server errors are reported as unavailability without refreshing
#[tokio::test]
async fn test_server_error_does_not_refresh() -> Result<()> {
    let server = MockServer::start().await;
    mount_channels(&server, "valid", 500, 1).await;
    mount_login(&server, 0).await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("valid")),
    )?;

    let result = client.get_users_channels(&[user(1)]).await;
    assert!(matches!(result, Err(DispatchError::UpstreamUnavailable(_))));

    Ok(())
}

/// Test: Malformed entries are skipped and valid ones kept
#[tokio::test]
async fn test_malformed_entries_are_skipped() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "not-a-uuid", "channels": []},
            {"id": user(2)},
            {"id": user(3), "channels": [{"type": "email", "value": "u3@example.com"}]}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("valid")),
    )?;

    let channels = client
        .get_users_channels(&[user(1), user(2), user(3)])
        .await?;

    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, user(3));

    Ok(())
}

/// Test: Profiles are fetched from the users endpoint
#[tokio::test]
async fn test_user_profiles_are_fetched() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .and(header("authorization", "Bearer valid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": user(1),
            "first_name": "Alice",
            "last_name": "Smith",
            "username": "alice",
            "is_active": true,
            "is_verified": true
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("valid")),
    )?;

    let profiles = client.get_user_profiles(&[user(1)]).await?;

    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].first_name, "Alice");
    assert_eq!(profiles[0].username, "alice");

    Ok(())
}

/// Test: Concurrent callers hitting an expired token share a single refresh
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_is_single_flight() -> Result<()> {
    const CALLERS: u64 = 8;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/channels"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1..=CALLERS)
        .mount(&server)
        .await;
    mount_channels(&server, "fresh", 200, CALLERS).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"refresh_token": "refresh-1"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh(&server, 200, 1).await;

    let client = Arc::new(IdentityClient::new(
        settings(&server),
        Arc::new(TokenCache::with_access_token("stale")),
    )?);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_users_channels(&[user(1), user(2)]).await })
        })
        .collect();

    for handle in handles {
        let channels = handle.await??;
        assert_eq!(channels.len(), 2);
    }

    server.verify().await;

    Ok(())
}
