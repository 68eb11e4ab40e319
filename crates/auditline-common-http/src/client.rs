//! Shared reqwest client for the HTTP-backed sinks.

use crate::request::HttpAuth;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Settings applied to every request a sink makes.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request deadline, from `audit.sink.timeout-ms`.
    pub request_timeout: Duration,
    pub user_agent: String,
    pub pool_max_idle_per_host: usize,
    pub auth: HttpAuth,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            user_agent: concat!("auditline/", env!("CARGO_PKG_VERSION")).to_string(),
            pool_max_idle_per_host: 10,
            auth: HttpAuth::None,
        }
    }
}

/// Transport and status failures, classified for retry decisions.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("cannot build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to backend failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("cannot encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot connect to backend: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("rate limited by backend (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend server error: {status}")]
    ServerError { status: u16, body: String },

    #[error("backend client error: {status}")]
    ClientError { status: u16, body: String },
}

impl HttpError {
    /// Whether a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect(_) | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        let status = status.as_u16();
        if (500..600).contains(&status) {
            Self::ServerError { status, body }
        } else {
            Self::ClientError { status, body }
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e)
        } else {
            Self::Request(e)
        }
    }
}

/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(HttpConfig::default())
    }

    pub fn with_config(config: HttpConfig) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .default_headers(config.auth.default_headers())
            .build()
            .map_err(HttpError::ClientBuild)?;
        Ok(Self { inner })
    }

    /// `PUT` a JSON document. Non-2xx statuses become errors.
    pub async fn put_json<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<Response, HttpError> {
        self.send("PUT", &url, self.inner.put(url.clone()).json(body)).await
    }

    /// `POST` a JSON body under a vendor content type such as
    /// `application/vnd.kafka.json.v2+json`.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        content_type: &str,
        body: &T,
    ) -> Result<Response, HttpError> {
        let payload = serde_json::to_vec(body).map_err(HttpError::Encode)?;
        let request = self
            .inner
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(payload);
        self.send("POST", &url, request).await
    }

    async fn send(&self, method: &str, url: &Url, request: RequestBuilder) -> Result<Response, HttpError> {
        let response = request.send().await?;
        debug!(%method, %url, status = response.status().as_u16(), "backend responded");
        Self::check_response(response).await
    }

    /// Pass 2xx responses through; map everything else to [`HttpError`].
    pub async fn check_response(response: Response) -> Result<Response, HttpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs);
            return Err(HttpError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(HttpError::from_status(status, body))
    }
}
