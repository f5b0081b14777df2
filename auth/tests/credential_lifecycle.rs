//! Integration tests for the credential lifecycle over the resilient store.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use ledgerlink_auth::config::CredentialConfig;
use ledgerlink_auth::environment::{Clock, CredentialEnvironment};
use ledgerlink_auth::mocks::{
    InMemoryCredentialStore, MockAuthorizationServer, MockClock, StaticHealth, grant,
};
use ledgerlink_auth::providers::CredentialStore;
use ledgerlink_auth::{CredentialError, CredentialService, ResilientCredentialStore, UserId};
use std::sync::Arc;

type Store = ResilientCredentialStore<InMemoryCredentialStore, StaticHealth>;
type Service = CredentialService<Store, MockAuthorizationServer, MockClock>;

struct Harness {
    service: Service,
    durable: InMemoryCredentialStore,
    health: StaticHealth,
    auth: MockAuthorizationServer,
    clock: MockClock,
}

/// Service over a resilient store whose durable tier starts healthy.
fn harness(auth: MockAuthorizationServer) -> Harness {
    let durable = InMemoryCredentialStore::new();
    let health = StaticHealth::new(true);
    let clock = MockClock::new(Utc::now());
    let store = ResilientCredentialStore::new(durable.clone(), health.clone());
    let env = CredentialEnvironment::new(store, auth.clone()).with_clock(clock.clone());

    Harness {
        service: CredentialService::new(env, CredentialConfig::default()),
        durable,
        health,
        auth,
        clock,
    }
}

#[tokio::test]
async fn test_callback_binds_tenant_after_exchange() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");

    let exchanged = h.service.exchange_code("abc", &user).await.unwrap();
    assert_eq!(exchanged.tenant_id, "");

    h.service.bind_tenant(&user, "9991").await.unwrap();

    assert_eq!(h.durable.peek(&user).unwrap().tenant_id, "9991");
    assert_eq!(h.service.store().get(&user).await.unwrap().tenant_id, "9991");
}

#[tokio::test]
async fn test_disconnect_keeps_record_when_access_revocation_fails() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");
    let record = h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();
    h.auth.fail_revocation_of(&record.access_token);

    let err = h.service.disconnect(&user).await.unwrap_err();

    assert!(matches!(err, CredentialError::UpstreamError { .. }));
    assert!(h.auth.revoked().is_empty());
    assert_eq!(h.service.store().get(&user).await.unwrap(), record);
}

#[tokio::test]
async fn test_partial_revocation_is_retried_in_full() {
    let auth = MockAuthorizationServer::new();
    let h = harness(auth);
    let user = UserId::from("u1");
    let record = h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();

    // Access token revoked, refresh token revocation fails.
    let flaky = MockAuthorizationServer::new();
    flaky.fail_revocation_of(&record.refresh_token);
    let env = CredentialEnvironment::new(h.service.store().clone(), flaky.clone())
        .with_clock(h.clock.clone());
    let service = CredentialService::new(env, CredentialConfig::default());

    assert!(service.disconnect(&user).await.is_err());
    assert_eq!(flaky.revoked(), vec![record.access_token.clone()]);
    assert!(service.store().get(&user).await.is_ok());

    // A healthy retry revokes both again and deletes.
    h.service.disconnect(&user).await.unwrap();
    assert_eq!(h.auth.revoked(), vec![record.access_token, record.refresh_token]);
    assert_eq!(h.service.store().get(&user).await, Err(CredentialError::NotFound));
    assert!(h.durable.peek(&user).is_none());
}

#[tokio::test]
async fn test_disconnect_without_record_is_not_found() {
    let h = harness(MockAuthorizationServer::new());

    assert_eq!(
        h.service.disconnect(&UserId::from("ghost")).await,
        Err(CredentialError::NotFound)
    );
}

#[tokio::test]
async fn test_refresh_preserves_tenant_and_refresh_token() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");
    h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();

    h.auth.push_refresh(Ok(grant("a2", None, 3600)));
    let refreshed = h.service.refresh(&user).await.unwrap();
    assert_eq!(refreshed.access_token, "a2");
    assert_eq!(refreshed.refresh_token, "refresh-1");
    assert_eq!(refreshed.tenant_id, "9991");

    h.auth.push_refresh(Ok(grant("a3", Some("r3"), 3600)));
    let rotated = h.service.refresh(&user).await.unwrap();
    assert_eq!(rotated.refresh_token, "r3");
    assert_eq!(rotated.tenant_id, "9991");
    assert_eq!(h.durable.peek(&user).unwrap(), rotated);
}

#[tokio::test]
async fn test_get_valid_token_never_returns_token_inside_margin() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");
    h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();

    for _ in 0..12 {
        h.clock.advance(Duration::minutes(17));
        let record = h.service.get_valid_token(&user).await.unwrap();
        assert!(record.expires_at - h.clock.now() >= Duration::minutes(5));
        assert_eq!(record.tenant_id, "9991");
    }
    assert!(h.auth.refresh_calls() > 0);
}

#[tokio::test]
async fn test_refresh_margin_is_configurable() {
    let auth = MockAuthorizationServer::new();
    let clock = MockClock::new(Utc::now());
    let env = CredentialEnvironment::new(InMemoryCredentialStore::new(), auth.clone())
        .with_clock(clock.clone());
    let service = CredentialService::new(
        env,
        CredentialConfig::default().with_refresh_margin(std::time::Duration::from_secs(30 * 60)),
    );
    let user = UserId::from("u1");
    service.exchange_code("abc", &user).await.unwrap();

    clock.advance(Duration::minutes(31));
    service.get_valid_token(&user).await.unwrap();

    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test]
async fn test_durable_outage_keeps_credentials_usable() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");

    h.durable.set_unavailable(true);
    let record = h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();
    assert_eq!(h.service.get_valid_token(&user).await.unwrap(), record);

    h.health.set(false);
    h.clock.advance(Duration::hours(1));
    let refreshed = h.service.get_valid_token(&user).await.unwrap();
    assert_eq!(refreshed.tenant_id, "9991");
    assert_eq!(h.service.store().get(&user).await.unwrap(), refreshed);
}

#[tokio::test]
async fn test_save_while_durable_down_is_readable() {
    let h = harness(MockAuthorizationServer::new());
    let user = UserId::from("u1");
    let record = grant("a1", Some("r1"), 3600);
    let record = ledgerlink_auth::CredentialRecord::from_grant(record, Utc::now());

    h.health.set(false);
    h.durable.set_unavailable(true);

    h.service.store().save(&user, &record).await.unwrap();
    assert_eq!(h.service.store().get(&user).await.unwrap(), record);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_refresh() {
    let auth = MockAuthorizationServer::new().with_refresh_delay(std::time::Duration::from_millis(200));
    let h = harness(auth);
    let user = UserId::from("u1");
    h.service.complete_authorization("abc", &user, Some("9991")).await.unwrap();
    h.clock.advance(Duration::hours(2));

    let service = Arc::new(h.service);
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let user = user.clone();
        tasks.spawn(async move { service.get_valid_token(&user).await });
    }

    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap().access_token, "refreshed-1");
    }
    assert_eq!(h.auth.refresh_calls(), 1);
    assert_eq!(h.auth.refresh_tokens_seen(), vec!["refresh-1"]);
}
