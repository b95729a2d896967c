use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::policy::RetryPolicy;

pub const DEFAULT_TIMEOUT_MESSAGE: &str = "The task timed out before a response was produced.";

/// Tunables shared by every task stream opened from one hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Debounce between `MessageStart` and the task being marked visible.
    #[serde(default = "default_display_delay", with = "millis")]
    pub display_delay: Duration,
    /// How long a user-message slide-in offset stays set.
    #[serde(default = "default_slide_in_window", with = "millis")]
    pub slide_in_window: Duration,
    #[serde(default)]
    pub artifact_retry: RetryPolicy,
    /// Shown when a `TaskTimeout` carries no message.
    #[serde(default = "default_timeout_message")]
    pub default_timeout_message: String,
}

fn default_display_delay() -> Duration {
    Duration::from_millis(150)
}

fn default_slide_in_window() -> Duration {
    Duration::from_millis(600)
}

fn default_timeout_message() -> String {
    DEFAULT_TIMEOUT_MESSAGE.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            display_delay: default_display_delay(),
            slide_in_window: default_slide_in_window(),
            artifact_retry: RetryPolicy::default(),
            default_timeout_message: default_timeout_message(),
        }
    }
}

impl EngineConfig {
    /// Builds a config from defaults overridden by environment variables.
    ///
    /// - `TASKSTREAM_DISPLAY_DELAY_MS`
    /// - `TASKSTREAM_ARTIFACT_MAX_ATTEMPTS`
    /// - `TASKSTREAM_ARTIFACT_BACKOFF_MS`
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Some(ms) = env_u64("TASKSTREAM_DISPLAY_DELAY_MS")? {
            config.display_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_u64("TASKSTREAM_ARTIFACT_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(EngineError::config_msg(
                    "TASKSTREAM_ARTIFACT_MAX_ATTEMPTS must be greater than 0",
                ));
            }
            config.artifact_retry.max_attempts = u32::try_from(attempts).map_err(|_| {
                EngineError::config_msg("TASKSTREAM_ARTIFACT_MAX_ATTEMPTS is too large")
            })?;
        }
        if let Some(ms) = env_u64("TASKSTREAM_ARTIFACT_BACKOFF_MS")? {
            config.artifact_retry.initial_backoff_ms = ms;
        }
        Ok(config)
    }

    pub fn display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = delay;
        self
    }

    pub fn artifact_retry(mut self, policy: RetryPolicy) -> Self {
        self.artifact_retry = policy;
        self
    }
}

/// Connection settings for the HTTP artifact lookup.
#[derive(Clone, Debug)]
pub struct HttpLookupConfig {
    /// Base URL of the console backend, without the `/api` suffix.
    pub base_url: String,
    /// Optional bearer token sent with each lookup.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpLookupConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Builds a config from `TASKSTREAM_API_BASE_URL`, `TASKSTREAM_API_TOKEN`
    /// and `TASKSTREAM_HTTP_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, EngineError> {
        let base_url = std::env::var("TASKSTREAM_API_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(EngineError::config_msg(
                "missing TASKSTREAM_API_BASE_URL for artifact lookup",
            ));
        }
        let mut config = Self::new(base_url.trim());
        if let Ok(token) = std::env::var("TASKSTREAM_API_TOKEN")
            && !token.trim().is_empty()
        {
            config.api_token = Some(token.trim().to_string());
        }
        if let Some(ms) = env_u64("TASKSTREAM_HTTP_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parses `base_url`; it must be able to carry path segments.
    pub(crate) fn parsed_base_url(&self) -> Result<Url, EngineError> {
        let url = Url::parse(self.base_url.trim()).map_err(|e| {
            EngineError::Config(format!("invalid artifact lookup base url {}: {e}", self.base_url))
        })?;
        if url.cannot_be_a_base() {
            return Err(EngineError::Config(format!(
                "artifact lookup base url {} cannot carry a path",
                self.base_url
            )));
        }
        Ok(url)
    }
}

/// `{base}/api/artifacts/{project}/{agent}/{task}`, each id one encoded segment.
pub(crate) fn artifacts_url(base: &Url, project: &str, agent: &str, task: &str) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["api", "artifacts", project, agent, task]);
    }
    url
}

fn env_u64(key: &str) -> Result<Option<u64>, EngineError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| EngineError::Config(format!("invalid {key}={raw}: {e}"))),
        _ => Ok(None),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.display_delay, Duration::from_millis(150));
        assert_eq!(config.artifact_retry.max_attempts, 3);
        assert_eq!(config.default_timeout_message, DEFAULT_TIMEOUT_MESSAGE);
    }

    #[test]
    fn durations_are_millisecond_integers_in_serde() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"display_delay":20,"slide_in_window":5}"#).expect("decode");
        assert_eq!(config.display_delay, Duration::from_millis(20));
        assert_eq!(config.slide_in_window, Duration::from_millis(5));
        let value = serde_json::to_value(&config).expect("encode");
        assert_eq!(value["display_delay"], 20);
    }

    fn base(raw: &str) -> Url {
        HttpLookupConfig::new(raw).parsed_base_url().expect("base url")
    }

    #[test]
    fn artifacts_url_trims_trailing_slash() {
        assert_eq!(
            artifacts_url(&base("http://localhost:8080/"), "p1", "a1", "t1").as_str(),
            "http://localhost:8080/api/artifacts/p1/a1/t1"
        );
    }

    #[test]
    fn artifacts_url_keeps_base_path_prefix() {
        assert_eq!(
            artifacts_url(&base("https://console.test/v2/"), "p1", "a1", "t1").as_str(),
            "https://console.test/v2/api/artifacts/p1/a1/t1"
        );
    }

    #[test]
    fn artifacts_url_encodes_each_id_as_one_segment() {
        let url = artifacts_url(&base("http://h"), "p 1", "a/b", "t?x#y");
        assert_eq!(url.as_str(), "http://h/api/artifacts/p%201/a%2Fb/t%3Fx%23y");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path_segments().map(|s| s.count()), Some(5));
    }

    #[test]
    fn unusable_base_urls_are_config_errors() {
        for raw in ["not a url", "mailto:ops@example.com"] {
            let result = HttpLookupConfig::new(raw).parsed_base_url();
            assert!(matches!(result, Err(EngineError::Config(_))), "{raw}");
        }
    }
}
