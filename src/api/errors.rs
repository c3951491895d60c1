//! Error types for the music API client.

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned HTTP {status}")]
    Status { status: u16, url: String },
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}
