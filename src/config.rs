//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional `music-sync.toml`
//! in the working directory, then raw environment variables (`API_URL`,
//! `DB_URL`, `LOG_LEVEL`, ...). Environment keys are matched case-insensitively.

use chrono::NaiveTime;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Optional config file, read from the working directory.
pub const CONFIG_FILE: &str = "music-sync.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the remote music API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Store connection string.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Level applied to this crate's targets when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: TracingFormat,
    /// Timeout for a single API request.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    /// How often the scheduler checks whether the daily sync is due.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub poll_interval: Duration,
    /// Fixed daily sync time (`HH:MM`, local). When unset, the sync runs one
    /// minute after startup and then daily at that clock time.
    #[serde(default, deserialize_with = "deserialize_clock_time")]
    pub sync_at: Option<NaiveTime>,
}

impl Config {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw())
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_db_url() -> String {
    "sqlite://music_database.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> Duration {
    crate::api::DEFAULT_TIMEOUT
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

/// Accepts either a bare number of seconds or a human duration such as `90s`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => fundu::parse_duration(text.trim())
            .map_err(|e| serde::de::Error::custom(format!("invalid duration '{text}': {e}"))),
    }
}

fn deserialize_clock_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid clock time '{text}': {e}")))
}
