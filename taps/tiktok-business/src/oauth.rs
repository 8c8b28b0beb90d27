//! OAuth credential lifecycle for the TikTok Business API.
//!
//! All resource types share a single OAuth grant, so one [`TokenManager`] is constructed per
//! run and handed (behind an `Arc`) to every client. The credential lives behind an async
//! mutex that is held for the whole duration of a refresh: a caller that observes a stale
//! token while another refresh is in flight waits on the lock and then finds the token fresh,
//! so at most one refresh request is ever on the wire.

use crate::config::Config;
use crate::error::{Error, Result};
use http::{HeaderMap, HeaderValue};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Header carrying the access token on every resource request.
pub const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// Token lifetime assumed when the refresh response omits an expiry.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(86400);

/// OAuth client credentials plus the mutable access-token state.
#[derive(Clone)]
pub struct Credential {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    access_token: Option<String>,
    expires_in: Option<Duration>,
    last_refreshed_at: Option<Timestamp>,
}

impl Credential {
    /// Creates a credential that has never been refreshed.
    ///
    /// A seeded `access_token` is kept but not trusted: without a refresh timestamp its age is
    /// unknown, so the first use triggers a refresh.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            access_token,
            expires_in: None,
            last_refreshed_at: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.client_id,
            &config.client_secret,
            &config.refresh_token,
            Some(config.access_token.clone()),
        )
    }

    /// The access token is valid only if it was refreshed less than `expires_in` ago.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        let (Some(_), Some(last), Some(expires_in)) =
            (&self.access_token, self.last_refreshed_at, self.expires_in)
        else {
            return false;
        };
        let age_ms = now.as_millisecond() - last.as_millisecond();
        i128::from(age_ms) < expires_in.as_millis() as i128
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    pub fn last_refreshed_at(&self) -> Option<Timestamp> {
        self.last_refreshed_at
    }

    fn refresh_request(&self) -> RefreshRequest<'_> {
        RefreshRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            grant_type: "refresh_token",
            refresh_token: &self.refresh_token,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("last_refreshed_at", &self.last_refreshed_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default, alias = "expires")]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// The token endpoint answers either with the grant itself or wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Enveloped { data: TokenGrant },
    Bare(TokenGrant),
}

impl TokenResponse {
    fn into_grant(self) -> TokenGrant {
        match self {
            TokenResponse::Enveloped { data } => data,
            TokenResponse::Bare(grant) => grant,
        }
    }
}

/// Guarantees that every outbound request carries a currently-valid access token.
#[derive(Debug)]
pub struct TokenManager {
    credential: Mutex<Credential>,
    endpoint: String,
    http: reqwest::Client,
    refreshes: AtomicU64,
}

impl TokenManager {
    pub fn new(credential: Credential, endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            credential: Mutex::new(credential),
            endpoint: endpoint.into(),
            http,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Returns `headers` with the `Access-Token` header set, refreshing the token first if it
    /// is stale.
    pub async fn auth_headers(&self, mut headers: HeaderMap) -> Result<HeaderMap> {
        let token = self.fresh_access_token().await?;
        let value = HeaderValue::from_str(&token).map_err(|_| Error::InvalidHeader {
            name: ACCESS_TOKEN_HEADER,
        })?;
        headers.insert(ACCESS_TOKEN_HEADER, value);
        Ok(headers)
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    pub async fn fresh_access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;
        if !credential.is_valid_at(Timestamp::now()) {
            tracing::info!("access token is not valid, refreshing");
            self.refresh_locked(&mut credential).await?;
        }
        credential.access_token.clone().ok_or_else(|| Error::Auth {
            body: "no access token after refresh".to_string(),
        })
    }

    /// Unconditionally refreshes the access token.
    pub async fn refresh(&self) -> Result<()> {
        let mut credential = self.credential.lock().await;
        self.refresh_locked(&mut credential).await
    }

    /// Number of refresh requests issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// A snapshot of the current credential state.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    async fn refresh_locked(&self, credential: &mut Credential) -> Result<()> {
        // Stamp the request time rather than the response time so the token is considered
        // stale slightly early rather than slightly late.
        let requested_at = Timestamp::now();
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&credential.refresh_request())
            .send()
            .await
            .map_err(|e| Error::Auth {
                body: format!("send token refresh request: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Auth {
            body: format!("read token refresh response: {e}"),
        })?;
        if !status.is_success() {
            tracing::error!(%status, body = %body, "OAuth token refresh rejected");
            return Err(Error::Auth { body });
        }

        let grant = serde_json::from_str::<TokenResponse>(&body)
            .map_err(|_| Error::Auth { body: body.clone() })?
            .into_grant();

        let expires_in = match grant.expires_in {
            Some(secs) => Duration::from_secs(secs),
            None => {
                tracing::warn!(
                    default_secs = DEFAULT_EXPIRES_IN.as_secs(),
                    "no expiry in OAuth response, assuming default token lifetime"
                );
                DEFAULT_EXPIRES_IN
            }
        };

        credential.access_token = Some(grant.access_token);
        credential.expires_in = Some(expires_in);
        credential.last_refreshed_at = Some(requested_at);
        if let Some(rotated) = grant.refresh_token {
            tracing::debug!("OAuth response rotated the refresh token");
            credential.refresh_token = rotated;
        }

        tracing::info!(
            expires_in_secs = expires_in.as_secs(),
            "OAuth token refresh was successful"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refreshed(expires_in: Duration, at: Timestamp) -> Credential {
        let mut c = Credential::new("id", "secret", "rt", Some("tok".into()));
        c.expires_in = Some(expires_in);
        c.last_refreshed_at = Some(at);
        c
    }

    #[test]
    fn never_refreshed_is_stale() {
        let c = Credential::new("id", "secret", "rt", Some("seed".into()));
        assert!(!c.is_valid_at(Timestamp::now()));
    }

    #[test]
    fn validity_window() {
        let at: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let c = refreshed(Duration::from_secs(60), at);
        assert!(c.is_valid_at(at));
        assert!(c.is_valid_at("2024-01-01T00:00:59Z".parse().unwrap()));
        assert!(!c.is_valid_at("2024-01-01T00:01:00Z".parse().unwrap()));
        assert!(!c.is_valid_at("2024-01-02T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn refresh_body_shape() {
        let c = Credential::new("id", "secret", "rt", None);
        let body = serde_json::to_value(c.refresh_request()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "client_id": "id",
                "client_secret": "secret",
                "grant_type": "refresh_token",
                "refresh_token": "rt",
            })
        );
    }

    #[test]
    fn token_response_shapes() {
        let bare: TokenResponse =
            serde_json::from_str(r#"{"access_token": "a", "expires": 10}"#).unwrap();
        let bare = bare.into_grant();
        assert_eq!(bare.access_token, "a");
        assert_eq!(bare.expires_in, Some(10));

        let wrapped: TokenResponse = serde_json::from_str(
            r#"{"code": 0, "data": {"access_token": "b", "expires_in": 20, "refresh_token": "r2"}}"#
        )
        .unwrap();
        let wrapped = wrapped.into_grant();
        assert_eq!(wrapped.access_token, "b");
        assert_eq!(wrapped.expires_in, Some(20));
        assert_eq!(wrapped.refresh_token.as_deref(), Some("r2"));

        assert!(serde_json::from_str::<TokenResponse>(r#"{"error": "invalid_grant"}"#).is_err());
    }

    #[test]
    fn debug_hides_tokens() {
        let c = refreshed(Duration::from_secs(1), Timestamp::now());
        let debug = format!("{c:?}");
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("\"tok\""));
    }
}
