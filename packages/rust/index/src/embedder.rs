//! Embedding clients.
//!
//! The index treats embedding as an opaque `text -> vector` function behind
//! the [`Embedder`] trait. Failures surface as [`Outcome::Unavailable`] and
//! are never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sitedesk_shared::{AppConfig, Outcome, Result, SiteDeskError, embedding_api_key};

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the model; snapshots built with another model are stale.
    fn model_id(&self) -> &str;

    /// Embed one text. An empty vector is never returned as `Available`.
    async fn embed(&self, text: &str) -> Outcome<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Build a client for `{base_url}/embeddings` authenticated with `api_key`.
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SiteDeskError::config("missing embedding API key"));
        }
        if model.trim().is_empty() {
            return Err(SiteDeskError::config("missing embedding model name"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| SiteDeskError::config("invalid embedding API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SiteDeskError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SiteDeskError::Embedding(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SiteDeskError::Embedding(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| SiteDeskError::Embedding(format!("malformed response: {e}")))?;

        parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| SiteDeskError::Embedding("response contained no embeddings".into()))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Outcome<Vec<f32>> {
        match self.request(text).await {
            Ok(vector) if !vector.is_empty() => {
                debug!(dimensions = vector.len(), "embedded text");
                Outcome::Available(vector)
            }
            Ok(_) => Outcome::unavailable("provider returned an empty vector"),
            Err(e) => {
                warn!(error = %e, "embedding request failed");
                Outcome::unavailable(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

// ---------------------------------------------------------------------------
// Disabled client
// ---------------------------------------------------------------------------

/// Stand-in used when no embedding credential is configured.
pub struct DisabledEmbedder {
    model: String,
    reason: String,
}

impl DisabledEmbedder {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, _text: &str) -> Outcome<Vec<f32>> {
        Outcome::unavailable(self.reason.clone())
    }
}

/// Build the embedder described by `[embeddings]`.
///
/// A missing API key yields a [`DisabledEmbedder`] rather than an error, so
/// retrieval reports itself unavailable while the rest keeps working.
pub fn embedder_from_config(config: &AppConfig) -> Result<Box<dyn Embedder>> {
    let settings = &config.embeddings;
    match embedding_api_key(config) {
        Some(key) => Ok(Box::new(OpenAiEmbedder::new(
            &key,
            &settings.base_url,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )?)),
        None => {
            warn!(
                env = %settings.api_key_env,
                "embedding API key not set, retrieval disabled"
            );
            Ok(Box::new(DisabledEmbedder::new(
                settings.model.clone(),
                format!("no embedding credential ({} is not set)", settings.api_key_env),
            )))
        }
    }
}
