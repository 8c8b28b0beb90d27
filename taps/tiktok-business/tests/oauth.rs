//! Token refresh behavior against a mock OAuth endpoint.

mod support;

use http::HeaderMap;
use http::header::USER_AGENT;
use jiff::Timestamp;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{AUTH_PATH, auth_endpoint, mount_token, token_manager};
use tap_tiktok_business::oauth::{ACCESS_TOKEN_HEADER, DEFAULT_EXPIRES_IN};
use tap_tiktok_business::{Credential, Error, TokenManager};
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn first_use_refreshes_exactly_once() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh", 1).await;
    let tokens = token_manager(&server);

    let headers = tokens.auth_headers(HeaderMap::new()).await.unwrap();
    assert_eq!(headers[ACCESS_TOKEN_HEADER], "fresh");
    assert_eq!(tokens.refresh_count(), 1);

    // still within expires_in: no further refresh
    let headers = tokens.auth_headers(HeaderMap::new()).await.unwrap();
    assert_eq!(headers[ACCESS_TOKEN_HEADER], "fresh");
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn refresh_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(query_param("business", "tt_user"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "client_id": "cid",
            "client_secret": "csecret",
            "grant_type": "refresh_token",
            "refresh_token": "rt-1",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = token_manager(&server);
    let before = Timestamp::now();
    tokens.refresh().await.unwrap();

    let credential = tokens.credential().await;
    assert_eq!(credential.access_token(), Some("fresh"));
    assert_eq!(credential.expires_in(), Some(Duration::from_secs(3600)));
    let refreshed_at = credential.last_refreshed_at().unwrap();
    assert!(refreshed_at >= before && refreshed_at <= Timestamp::now());
}

#[tokio::test]
async fn caller_headers_are_kept() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh", 1).await;
    let tokens = token_manager(&server);

    let mut base = HeaderMap::new();
    base.insert(USER_AGENT, "tap/1".parse().unwrap());
    let headers = tokens.auth_headers(base).await.unwrap();
    assert_eq!(headers[USER_AGENT], "tap/1");
    assert_eq!(headers[ACCESS_TOKEN_HEADER], "fresh");
}

#[tokio::test]
async fn expired_token_is_refreshed_again() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "short-lived", "expires_in": 0})),
        )
        .expect(2)
        .mount(&server)
        .await;
    let tokens = token_manager(&server);

    tokens.fresh_access_token().await.unwrap();
    tokens.fresh_access_token().await.unwrap();
    assert_eq!(tokens.refresh_count(), 2);
}

#[tokio::test]
async fn missing_expiry_assumes_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    let tokens = token_manager(&server);

    assert_eq!(tokens.fresh_access_token().await.unwrap(), "fresh");
    assert_eq!(
        tokens.credential().await.expires_in(),
        Some(DEFAULT_EXPIRES_IN)
    );
    // and the token is trusted for that long
    tokens.fresh_access_token().await.unwrap();
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn enveloped_response_and_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(body_partial_json(json!({"refresh_token": "rt-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "OK",
            "data": {"access_token": "a1", "expires_in": 3600, "refresh_token": "rt-2"},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(body_partial_json(json!({"refresh_token": "rt-2"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "a2", "expires": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let tokens = token_manager(&server);

    tokens.refresh().await.unwrap();
    assert_eq!(tokens.credential().await.refresh_token(), "rt-2");
    tokens.refresh().await.unwrap();

    let credential = tokens.credential().await;
    assert_eq!(credential.access_token(), Some("a2"));
    // no rotation in the second response: the previous refresh token is kept
    assert_eq!(credential.refresh_token(), "rt-2");
}

#[tokio::test]
async fn invalid_grant_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;
    let tokens = token_manager(&server);

    let err = tokens.auth_headers(HeaderMap::new()).await.unwrap_err();
    match err {
        Error::Auth { body } => assert!(body.contains("invalid_grant"), "{body}"),
        other => panic!("expected auth error, got {other:?}"),
    }
    // the failed refresh leaves the credential untouched
    assert!(tokens.credential().await.last_refreshed_at().is_none());
}

#[tokio::test]
async fn unparsable_body_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    let tokens = token_manager(&server);

    let err = tokens.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Auth { ref body } if body.contains("oops")), "{err:?}");
}

#[tokio::test]
async fn unreachable_endpoint_is_an_auth_error() {
    let tokens = TokenManager::new(
        Credential::new("cid", "csecret", "rt", None),
        // nothing listens on the discard port
        "http://127.0.0.1:9/token",
        reqwest::Client::new(),
    );
    assert!(matches!(
        tokens.fresh_access_token().await,
        Err(Error::Auth { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "shared", "expires_in": 3600}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let tokens: Arc<TokenManager> = Arc::new(TokenManager::new(
        support::credential(),
        auth_endpoint(&server),
        reqwest::Client::new(),
    ));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let tokens = Arc::clone(&tokens);
        tasks.push(tokio::spawn(async move {
            tokens.fresh_access_token().await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "shared");
    }
    assert_eq!(tokens.refresh_count(), 1);
}
