//! HTTP client for the upstream music API.
//!
//! Every collection endpoint answers `GET {base}/{endpoint}` with an envelope of
//! the form `{"items": [...]}`. The client hands back the raw records; typed
//! decoding happens per record so one malformed record cannot hide the rest.

pub mod errors;
pub mod json;

pub use errors::ApiError;

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const USERS_ENDPOINT: &str = "users";
pub const TRACKS_ENDPOINT: &str = "tracks";
pub const LISTEN_HISTORY_ENDPOINT: &str = "listen_history";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url).map_err(|source| ApiError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        // Treat the base path as a directory so joins append instead of replacing
        // the last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `{base}/{endpoint}`.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let segment = endpoint.trim_start_matches('/');
        self.base_url
            .join(segment)
            .map_err(|source| ApiError::InvalidUrl {
                url: format!("{}{segment}", self.base_url),
                source,
            })
    }

    /// Fetch the `items` of an endpoint, reporting every failure to the caller.
    pub async fn try_fetch(&self, endpoint: &str) -> Result<Vec<serde_json::Value>, ApiError> {
        let url = self.endpoint_url(endpoint)?;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;

        let envelope: Envelope =
            json::parse_json_with_context(&body).map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })?;

        debug!(endpoint, count = envelope.items.len(), "fetched records");
        Ok(envelope.items)
    }

    /// Fetch the `items` of an endpoint, degrading to an empty list on any failure.
    ///
    /// One unreachable endpoint must never abort the whole sync cycle, so the
    /// error is logged here and swallowed.
    pub async fn fetch(&self, endpoint: &str) -> Vec<serde_json::Value> {
        match self.try_fetch(endpoint).await {
            Ok(items) => items,
            Err(e) => {
                error!(endpoint, error = ?e, "API request failed");
                Vec::new()
            }
        }
    }
}
