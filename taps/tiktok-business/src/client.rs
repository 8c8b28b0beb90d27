//! Authenticated, paginated access to the TikTok Business API resource endpoints.

use crate::config::Config;
use crate::context::{Context, Record};
use crate::error::{Error, Result};
use crate::oauth::{Credential, TokenManager};
use crate::pagination::{Page, PagedStream};
use crate::resource::{Cursor, Resource};
use crate::retry::{FailureKind, RetryPolicy};
use eyre::Context as _;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tracing::instrument;

/// A record together with the context it seeds for child resources, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub record: Record,
    pub child_context: Option<Context>,
}

/// Client for the TikTok Business API resource endpoints.
///
/// Every request obtains its `Access-Token` header from the shared [`TokenManager`], which
/// refreshes the token transparently when it has gone stale. Clones share the token manager
/// and the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct TikTokClient {
    tokens: Arc<TokenManager>,
    client: reqwest::Client,
    base_url: String,
    user_agent: Option<String>,
    retry: RetryPolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl TikTokClient {
    /// Creates a client for the API rooted at `base_url`, with the default retry policy.
    pub fn new(
        tokens: Arc<TokenManager>,
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            client,
            base_url: base_url.into(),
            user_agent: None,
            retry: RetryPolicy::default(),
            cancel: None,
        }
    }

    /// Builds the HTTP client, token manager and API client described by `config`.
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout())
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build HTTP client")?;
        let tokens = Arc::new(TokenManager::new(
            Credential::from_config(config),
            &config.auth_endpoint,
            http.clone(),
        ));
        Ok(Self::new(tokens, http, &config.api_url)
            .with_user_agent(config.user_agent.clone())
            .with_retry_policy(config.retry_policy()))
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stops every pagination sequence started through this client (and its clones) before
    /// its next page once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ua) = &self.user_agent {
            let ua = HeaderValue::from_str(ua).map_err(|_| Error::InvalidHeader {
                name: "User-Agent",
            })?;
            headers.insert(USER_AGENT, ua);
        }
        Ok(headers)
    }

    fn url(&self, resource: Resource) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), resource.path())
    }

    /// Makes an authenticated request and returns the parsed JSON body.
    ///
    /// Transport failures, 5xx and 429 are retried per the client's [`RetryPolicy`]; the
    /// access token is re-checked before every attempt. Token refresh failures are returned
    /// immediately and never retried.
    #[instrument(skip(self, query_params, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: &[(&str, &str)],
        json_body: &Value,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let headers = self.tokens.auth_headers(self.base_headers()?).await?;

            let mut request = self.client.request(method.clone(), url).headers(headers);
            if !query_params.is_empty() {
                request = request.query(query_params);
            }
            let outcome = request.json(json_body).send().await;

            let (kind, status, message) = match outcome {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(body) => return Ok(body),
                        Err(e) => (
                            FailureKind::from_transport(&e),
                            None,
                            format!("parse response body as JSON: {e}"),
                        ),
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "unknown error".to_string());
                    (FailureKind::from_status(status), Some(status), error_text)
                }
                Err(e) => (FailureKind::from_transport(&e), e.status(), e.to_string()),
            };

            match self.retry.next_delay(kind, attempt) {
                Some(delay) => {
                    tracing::warn!(
                        %method,
                        url,
                        attempt,
                        status = status.map(|s| s.as_u16()),
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(Error::Request {
                        url: url.to_string(),
                        status,
                        attempts: attempt,
                        message,
                    });
                }
            }
        }
    }

    /// Fetches one page of `resource` for `context`.
    ///
    /// A response whose envelope lacks the record list yields an empty page rather than an
    /// error.
    #[instrument(
        skip(self, resource, context),
        fields(stream = resource.name(), %context),
        level = tracing::Level::DEBUG
    )]
    pub async fn fetch_page(
        &self,
        resource: Resource,
        context: &Context,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Record, Cursor>> {
        let url = self.url(resource);
        let body = resource.payload(context, cursor);
        let response = self
            .make_authenticated_request(resource.method(), &url, &resource.query_params(), &body)
            .await?;

        let records = match resource.extract_records(&response, context) {
            Some(records) => records,
            None => {
                tracing::debug!(%response, "response has no record list, treating page as empty");
                Vec::new()
            }
        };
        let next_cursor = resource.next_cursor(&response);

        tracing::debug!(
            returned_items = records.len(),
            next_cursor = next_cursor.as_ref().map(tracing::field::display),
            "fetched page"
        );

        Ok(Page {
            items: records.into(),
            next_cursor,
        })
    }

    /// Returns every record of `resource` for `context`, walking pagination to exhaustion.
    ///
    /// Pages are requested lazily and strictly in sequence. The stream ends with an error if
    /// a request fails for good, if the API repeats a cursor, or if the client was cancelled.
    pub fn fetch_all(
        &self,
        resource: Resource,
        context: Context,
    ) -> impl Stream<Item = Result<Record>> + Send + use<'_> {
        let stream = PagedStream::new(move |cursor: Option<Cursor>| {
            let context = context.clone();
            async move { self.fetch_page(resource, &context, cursor.as_ref()).await }
        });
        match &self.cancel {
            Some(cancel) => stream.with_cancellation(cancel.clone()),
            None => stream,
        }
    }

    /// Like [`Self::fetch_all`], but pairs each record with the context it seeds for the
    /// child resource.
    pub fn records(
        &self,
        resource: Resource,
        context: Context,
    ) -> impl Stream<Item = Result<Emitted>> + Send + use<'_> {
        async_stream::stream! {
            let records = self.fetch_all(resource, context.clone());
            let mut records = std::pin::pin!(records);
            while let Some(record) = records.next().await {
                match record {
                    Ok(record) => {
                        yield Ok(Emitted {
                            child_context: resource.child_context(&record, &context),
                            record,
                        });
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    }
}
