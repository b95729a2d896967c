//! Generated-file metadata and the bounded-retry retrieval loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{HttpLookupConfig, artifacts_url};
use crate::errors::{EngineError, LookupError};
use crate::model::ArtifactKey;
use crate::policy::RetryPolicy;

/// One generated file associated with a completed task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, alias = "last_modified")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(alias = "download_url")]
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactListResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

/// Source of artifact listings keyed by `(project, agent, task)`.
#[async_trait::async_trait]
pub trait ArtifactLookup: Send + Sync {
    async fn list(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, LookupError>;
}

/// `ArtifactLookup` backed by `GET /api/artifacts/{project}/{agent}/{task}`.
pub struct HttpArtifactLookup {
    config: HttpLookupConfig,
    base_url: reqwest::Url,
    http: reqwest::Client,
}

impl HttpArtifactLookup {
    pub fn new(config: HttpLookupConfig) -> Result<Self, EngineError> {
        let base_url = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("taskstream/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn from_env() -> Result<Self, EngineError> {
        Self::new(HttpLookupConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ArtifactLookup for HttpArtifactLookup {
    async fn list(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, LookupError> {
        let url = artifacts_url(
            &self.base_url,
            key.project_id.as_str(),
            key.agent_id.as_str(),
            key.task_id.as_str(),
        );
        let mut req = self.http.get(url);
        if let Some(token) = &self.config.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| LookupError::transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::status(status.as_u16(), body));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| LookupError::transport(e.to_string()))?;
        let parsed: ArtifactListResponse =
            serde_json::from_slice(&body).map_err(|e| LookupError::decode(e.to_string()))?;
        Ok(parsed.artifacts)
    }
}

/// In-memory lookup returning fixed listings; unknown keys yield no artifacts.
#[derive(Clone, Debug, Default)]
pub struct StaticArtifactLookup {
    listings: HashMap<ArtifactKey, Vec<Artifact>>,
}

impl StaticArtifactLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, key: ArtifactKey, artifacts: Vec<Artifact>) -> Self {
        self.listings.insert(key, artifacts);
        self
    }
}

#[async_trait::async_trait]
impl ArtifactLookup for StaticArtifactLookup {
    async fn list(&self, key: &ArtifactKey) -> Result<Vec<Artifact>, LookupError> {
        Ok(self.listings.get(key).cloned().unwrap_or_default())
    }
}

/// Result of one retrieval loop.
#[derive(Clone, Debug, PartialEq)]
pub enum RetrievalOutcome {
    /// A non-empty listing was returned.
    Found(Vec<Artifact>),
    /// Every attempt came back empty or failed.
    Exhausted { attempts: u32 },
    /// The loop was cancelled; nothing may be applied.
    Cancelled,
}

/// Fetches artifacts for `key`, retrying empty or failed responses per
/// `policy`.
///
/// Cancellation is observed while waiting between attempts, while a request is
/// in flight (the request future is dropped), and right after a response
/// arrives.
pub async fn retrieve_artifacts(
    lookup: &dyn ArtifactLookup,
    key: &ArtifactKey,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> RetrievalOutcome {
    let mut attempt = 1u32;
    while policy.can_attempt(attempt) {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            info!(
                event = "artifact.retry_scheduled",
                domain = "artifact",
                key = %key,
                next_attempt = attempt,
                backoff_ms = delay.as_millis() as u64
            );
            tokio::select! {
                _ = cancel.cancelled() => return cancelled(key, attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return cancelled(key, attempt);
        }

        debug!(
            event = "artifact.lookup_attempt",
            domain = "artifact",
            key = %key,
            attempt = attempt,
            max_attempts = policy.max_attempts
        );
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(key, attempt),
            result = lookup.list(key) => result,
        };
        if cancel.is_cancelled() {
            return cancelled(key, attempt);
        }

        match result {
            Ok(artifacts) if !artifacts.is_empty() => {
                debug!(
                    event = "artifact.lookup_succeeded",
                    domain = "artifact",
                    key = %key,
                    attempt = attempt,
                    count = artifacts.len() as u64
                );
                return RetrievalOutcome::Found(artifacts);
            }
            Ok(_) => {
                debug!(
                    event = "artifact.lookup_empty",
                    domain = "artifact",
                    key = %key,
                    attempt = attempt
                );
            }
            Err(err) if err.is_decode() => {
                warn!(
                    event = "artifact.lookup_malformed",
                    domain = "artifact",
                    key = %key,
                    attempt = attempt,
                    error = %err
                );
            }
            Err(err) => {
                debug!(
                    event = "artifact.lookup_failed",
                    domain = "artifact",
                    key = %key,
                    code = err.code(),
                    attempt = attempt,
                    error = %err
                );
            }
        }
        attempt += 1;
    }

    let attempts = attempt - 1;
    debug!(
        event = "artifact.retry_exhausted",
        domain = "artifact",
        key = %key,
        attempts = attempts
    );
    RetrievalOutcome::Exhausted { attempts }
}

fn cancelled(key: &ArtifactKey, attempt: u32) -> RetrievalOutcome {
    debug!(
        event = "artifact.retrieval_cancelled",
        domain = "artifact",
        key = %key,
        attempt = attempt
    );
    RetrievalOutcome::Cancelled
}
