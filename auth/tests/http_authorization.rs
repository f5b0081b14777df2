//! HTTP authorization server client against a mock upstream.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use ledgerlink_auth::config::{AuthorizationServerConfig, CredentialConfig};
use ledgerlink_auth::environment::CredentialEnvironment;
use ledgerlink_auth::mocks::InMemoryCredentialStore;
use ledgerlink_auth::providers::{AuthorizationServer, HttpAuthorizationServer};
use ledgerlink_auth::{CredentialError, CredentialService, UserId};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASIC_AUTH: &str = "Basic Y2xpZW50LTE6c2VjcmV0"; // client-1:secret

fn client(server: &MockServer) -> HttpAuthorizationServer {
    let config = AuthorizationServerConfig::new("client-1", "secret", "https://app.test/callback")
        .with_token_endpoint(format!("{}/oauth2/token", server.uri()))
        .with_revocation_endpoint(format!("{}/oauth2/revoke", server.uri()))
        .with_request_timeout(Duration::from_millis(500));
    HttpAuthorizationServer::new(config).unwrap()
}

#[tokio::test]
async fn exchange_code_posts_form_with_basic_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("authorization", BASIC_AUTH))
        .and(header("accept", "application/json"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("redirect_uri=https%3A%2F%2Fapp.test%2Fcallback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "x_refresh_token_expires_in": 8_726_400
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = client(&server).exchange_code("abc").await.unwrap();

    assert_eq!(grant.access_token, "at-1");
    assert_eq!(grant.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(grant.expires_in, 3600);
}

#[tokio::test]
async fn refresh_without_rotation_keeps_old_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = CredentialEnvironment::new(InMemoryCredentialStore::new(), client(&server));
    let service = CredentialService::new(env, CredentialConfig::default());
    let user = UserId::from("u1");
    service.complete_authorization("abc", &user, Some("9991")).await.unwrap();

    let before = Utc::now();
    let record = service.refresh(&user).await.unwrap();

    assert_eq!(record.access_token, "at-2");
    assert_eq!(record.refresh_token, "rt-1");
    assert_eq!(record.tenant_id, "9991");
    assert!(record.expires_at >= before + chrono::Duration::seconds(3600));
}

#[tokio::test]
async fn rejected_grant_surfaces_upstream_error_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token has expired"
        })))
        .mount(&server)
        .await;

    let err = client(&server).refresh("stale").await.unwrap_err();

    assert_eq!(
        err,
        CredentialError::upstream("invalid_grant", "Refresh token has expired")
    );
    assert!(err.requires_reauthorization());
}

#[tokio::test]
async fn non_json_rejection_uses_status_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream maintenance"))
        .mount(&server)
        .await;

    let err = client(&server).exchange_code("abc").await.unwrap_err();

    assert_eq!(err, CredentialError::upstream("http_503", "upstream maintenance"));
}

#[tokio::test]
async fn unparseable_success_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let err = client(&server).exchange_code("abc").await.unwrap_err();

    assert!(matches!(err, CredentialError::UpstreamError { code, .. } if code == "invalid_response"));
}

#[tokio::test]
async fn out_of_range_lifetime_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": i64::MAX
        })))
        .mount(&server)
        .await;

    let store = InMemoryCredentialStore::new();
    let env = CredentialEnvironment::new(store.clone(), client(&server));
    let service = CredentialService::new(env, CredentialConfig::default());
    let user = UserId::from("u1");

    let err = service.exchange_code("abc", &user).await.unwrap_err();

    assert!(matches!(err, CredentialError::UpstreamError { code, .. } if code == "invalid_response"));
    assert!(store.peek(&user).is_none());
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "late", "expires_in": 3600}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = client(&server).exchange_code("abc").await.unwrap_err();

    assert!(matches!(err, CredentialError::UpstreamError { code, .. } if code == "timeout"));
}

#[tokio::test]
async fn revoke_posts_token_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/revoke"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_string_contains("token=rt-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).revoke("rt-1").await.unwrap();
}

#[tokio::test]
async fn disconnect_keeps_record_when_revocation_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_request"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryCredentialStore::new();
    let env = CredentialEnvironment::new(store.clone(), client(&server));
    let service = CredentialService::new(env, CredentialConfig::default());
    let user = UserId::from("u1");
    service.complete_authorization("abc", &user, Some("9991")).await.unwrap();

    let err = service.disconnect(&user).await.unwrap_err();

    assert!(matches!(err, CredentialError::UpstreamError { code, .. } if code == "invalid_request"));
    assert!(store.peek(&user).is_some());
}
