//! Shared helpers for tests that run against a wiremock server.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tap_tiktok_business::{Credential, Record, RetryPolicy, TikTokClient, TokenManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUTH_PATH: &str = "/open_api/oauth2/token/";
pub const API_PREFIX: &str = "/open_api/v1.2/business";

pub fn auth_endpoint(server: &MockServer) -> String {
    format!("{}{AUTH_PATH}?business=tt_user", server.uri())
}

pub fn api_url(server: &MockServer) -> String {
    format!("{}{API_PREFIX}", server.uri())
}

pub fn api_path(suffix: &str) -> String {
    format!("{API_PREFIX}{suffix}")
}

pub fn credential() -> Credential {
    Credential::new("cid", "csecret", "rt-1", Some("seed".to_string()))
}

pub fn token_manager(server: &MockServer) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        credential(),
        auth_endpoint(server),
        reqwest::Client::new(),
    ))
}

/// A client with instant retries, so failure tests stay fast.
pub fn client(server: &MockServer) -> TikTokClient {
    TikTokClient::new(token_manager(server), reqwest::Client::new(), api_url(server))
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, 2.0))
}

/// Mounts a token endpoint that hands out `access_token` and expects exactly `times` refreshes.
pub async fn mount_token(server: &MockServer, access_token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "expires_in": 86400,
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub fn videos_page(ids: &[&str], cursor: Option<i64>) -> Value {
    let videos: Vec<Value> = ids.iter().map(|id| json!({"item_id": id})).collect();
    json!({
        "code": 0,
        "data": {
            "videos": videos,
            "has_more": cursor.is_some(),
            "cursor": cursor.unwrap_or(0),
        }
    })
}

pub fn comments_page(ids: &[&str], cursor: Option<i64>) -> Value {
    let comments: Vec<Value> = ids.iter().map(|id| json!({"comment_id": id})).collect();
    json!({
        "code": 0,
        "data": {
            "comments": comments,
            "has_more": cursor.is_some(),
            "cursor": cursor.unwrap_or(0),
        }
    })
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record must be a JSON object")
}
