//! SPB service HTTP client
//!
//! Provides a typed HTTP client for the remote SPB service. Handles the
//! optional bearer token, the per-request timeout, JSON bodies and
//! endpoint construction.
//!
//! ## Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | adjust | `PUT {base}{adjust_path}` with an [`AdjustRequest`] body |
//! | processed check | `GET {base}/spb/{key}/processed` -> `{"processed": bool}` |
//! | SPB list | `GET {base}/spb?user={id}&vendor={code}` -> `{"data": [...]}` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spbsync_api::client::ApiClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ApiClient::new("https://spb.example.com/api")?.with_token("token");
//! let processed = client.is_processed("SPB-100").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use spbsync_core::config::ApiConfig;
use spbsync_core::domain::{FetchScope, SpbDocument};
use spbsync_core::ports::AdjustRequest;

use crate::ApiError;

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default adjust endpoint path
const DEFAULT_ADJUST_PATH: &str = "/spb/adjust";

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 200;

// ============================================================================
// Response types
// ============================================================================

/// Response of the processed-check endpoint
#[derive(Debug, Deserialize)]
struct ProcessedResponse {
    processed: bool,
}

/// Envelope of the SPB list endpoint
#[derive(Debug, Deserialize)]
struct SpbListResponse {
    #[serde(default)]
    data: Vec<SpbDocument>,
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client for the SPB service
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The underlying HTTP client (carries the timeout)
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
    /// Path of the adjust endpoint
    adjust_path: String,
    /// Optional bearer token
    token: Option<String>,
}

impl ApiClient {
    /// Creates a client with the default timeout and adjust path
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client whose requests time out after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            adjust_path: DEFAULT_ADJUST_PATH.to_string(),
            token: None,
        })
    }

    /// Builds a client from the `api` configuration section
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut client = Self::with_timeout(&config.base_url, config.request_timeout())?
            .with_adjust_path(&config.adjust_path);
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            client = client.with_token(token);
        }
        Ok(client)
    }

    /// Sets the bearer token sent with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the adjust endpoint path
    pub fn with_adjust_path(mut self, path: impl Into<String>) -> Self {
        self.adjust_path = path.into();
        self
    }

    /// Returns the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a request builder for the given method and path
    ///
    /// Prepends the base URL and adds the Authorization header when a
    /// token is configured.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, &url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Submits a form record; succeeds only on HTTP 200
    pub async fn adjust(&self, body: &AdjustRequest) -> Result<(), ApiError> {
        debug!(record_key = %body.record_key, "PUT {}", self.adjust_path);

        let response = self
            .request(Method::PUT, &self.adjust_path)
            .json(body)
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }
        Err(error_from_response(response).await)
    }

    /// Asks whether the server already processed `record_key`
    ///
    /// A 404 means the server has never seen the record.
    pub async fn is_processed(&self, record_key: &str) -> Result<bool, ApiError> {
        let path = format!("/spb/{}/processed", encode_segment(record_key));
        let response = self.request(Method::GET, &path).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: ProcessedResponse = response.json().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("processed check for {record_key}: {e}"))
                })?;
                Ok(body.processed)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }

    /// Fetches the SPB documents visible to a user and vendor
    pub async fn list_spb(&self, scope: &FetchScope) -> Result<Vec<SpbDocument>, ApiError> {
        let response = self
            .request(Method::GET, "/spb")
            .query(&[
                ("user", scope.user_id.as_str()),
                ("vendor", scope.vendor_code.as_str()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(error_from_response(response).await);
        }

        let body: SpbListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("SPB list: {e}")))?;

        debug!(count = body.data.len(), user = %scope.user_id, "Fetched SPB list");
        Ok(body.data)
    }
}

/// Maps a non-success response to an [`ApiError`], keeping a body excerpt
async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        body.trim().chars().take(MAX_ERROR_BODY).collect()
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
        _ => ApiError::ServerError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Percent-encodes a path segment (record keys may contain `/` or spaces)
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
