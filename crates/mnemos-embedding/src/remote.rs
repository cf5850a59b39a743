// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for OpenAI-compatible embedding services.
//!
//! Inputs are split into batches of `batch_size` texts and sent to
//! `POST {base_url}/v1/embeddings` with at most `max_workers` requests in flight.
//! Results are reassembled in input order. A failed batch is retried up to
//! `max_retries` times, waiting `retry_delay * attempt` between tries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mnemos_config::model::RemoteEmbeddingConfig;
use mnemos_core::traits::embedding::validate_embeddings;
use mnemos_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, MnemosError,
    PluginAdapter, Vector,
};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// HTTP embedding backend.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
    batch_size: usize,
    max_workers: usize,
    /// Exact-text cache, present only when enabled.
    cache: Option<DashMap<String, Vector>>,
    /// 0 until the first successful response fixes it.
    dimension: AtomicUsize,
}

impl std::fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RemoteEmbedder {
    /// Builds the client without touching the network.
    pub fn new(config: &RemoteEmbeddingConfig) -> Result<Self, MnemosError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| MnemosError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MnemosError::backend("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model_name.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            batch_size: config.batch_size.max(1),
            max_workers: config.max_workers.max(1),
            cache: config.enable_cache.then(DashMap::new),
            dimension: AtomicUsize::new(config.dimension.unwrap_or(0)),
        })
    }

    /// Builds the client and checks that the service lists the configured model.
    ///
    /// Discovery failures are logged, not returned: some servers do not implement
    /// `/v1/models` but embed fine.
    pub async fn connect(config: &RemoteEmbeddingConfig) -> Result<Self, MnemosError> {
        let embedder = Self::new(config)?;
        match embedder.discover_models().await {
            Ok(models) if models.iter().any(|m| *m == embedder.model) => {
                info!(model = %embedder.model, base_url = %embedder.base_url, "remote embedding model found");
            }
            Ok(models) => {
                warn!(model = %embedder.model, available = ?models, "remote service does not list the configured model");
            }
            Err(e) => {
                warn!(error = %e, "remote model discovery failed");
            }
        }
        Ok(embedder)
    }

    /// Lists model ids via `GET {base_url}/v1/models`.
    pub async fn discover_models(&self) -> Result<Vec<String>, MnemosError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MnemosError::backend(format!("GET {url} failed"), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MnemosError::BackendUnavailable {
                message: format!("GET {url} returned {status}"),
                source: None,
            });
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| MnemosError::backend("malformed model list", e))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Number of cached vectors (0 when caching is disabled).
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, DashMap::len)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Sends one batch, retrying with linear backoff.
    async fn request_batch(&self, texts: Vec<String>) -> Result<Vec<Vector>, MnemosError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay * attempt;
                warn!(attempt, ?delay, error = %last_error, "retrying embedding batch");
                metrics::counter!("mnemos_embedding_retries_total").increment(1);
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&url, &texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(MnemosError::encoding(format!(
            "embedding batch of {} texts failed after {} attempts: {last_error}",
            texts.len(),
            self.max_retries + 1
        )))
    }

    async fn send_once(&self, url: &str, texts: &[String]) -> Result<Vec<Vector>, MnemosError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MnemosError::backend("embedding request failed", e))?;

        let status = response.status();
        debug!(status = %status, count = texts.len(), "embedding response received");
        metrics::counter!("mnemos_embedding_requests_total", "backend" => "remote").increment(1);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MnemosError::BackendUnavailable {
                message: format!("embedding service returned {status}: {body}"),
                source: None,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MnemosError::backend("malformed embedding response", e))?;
        // Servers may return data out of order; `index` is authoritative when present.
        if parsed.data.iter().all(|d| d.index.is_some()) {
            parsed.data.sort_by_key(|d| d.index);
        }
        let vectors: Vec<Vector> = parsed.data.into_iter().map(|d| d.embedding).collect();
        validate_embeddings(texts.len(), &vectors)?;
        Ok(vectors)
    }

    /// Fixes the dimension on first success and rejects later disagreement.
    fn check_dimension(&self, actual: usize) -> Result<(), MnemosError> {
        match self
            .dimension
            .compare_exchange(0, actual, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == actual => Ok(()),
            Err(expected) => Err(MnemosError::DimensionMismatch { expected, actual }),
        }
    }
}

#[async_trait]
impl PluginAdapter for RemoteEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemosError> {
        if self.probe().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(format!(
                "embedding service at {} did not answer a probe",
                self.base_url
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), MnemosError> {
        self.clear_cache();
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for RemoteEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemosError> {
        if input.texts.is_empty() {
            return Err(MnemosError::encoding("cannot embed an empty batch"));
        }

        // Unique uncached texts, in first-seen order.
        let mut seen = HashSet::new();
        let pending: Vec<String> = input
            .texts
            .iter()
            .filter(|t| match &self.cache {
                Some(cache) => !cache.contains_key(t.as_str()),
                None => true,
            })
            .filter(|t| self.cache.is_none() || seen.insert(t.as_str()))
            .cloned()
            .collect();
        if let Some(cache) = &self.cache {
            let hits = input.texts.len() - pending.len();
            metrics::counter!("mnemos_embedding_cache_hits_total").increment(hits as u64);
            debug!(hits, misses = pending.len(), cache_len = cache.len(), "embedding cache lookup");
        }

        let batches: Vec<Vec<String>> = pending
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let fetched: Vec<Vector> = futures::stream::iter(batches)
            .map(|batch| self.request_batch(batch))
            .buffered(self.max_workers)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        if !fetched.is_empty() {
            let dimensions = validate_embeddings(pending.len(), &fetched)?;
            self.check_dimension(dimensions)?;
        }

        let embeddings = match &self.cache {
            None => fetched,
            Some(cache) => {
                for (text, vector) in pending.iter().zip(fetched) {
                    cache.insert(text.clone(), vector);
                }
                input
                    .texts
                    .iter()
                    .map(|t| {
                        cache.get(t.as_str()).map(|v| v.clone()).ok_or_else(|| {
                            MnemosError::Internal(format!("cache entry for {t:?} vanished"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let dimensions = validate_embeddings(input.texts.len(), &embeddings)?;
        self.check_dimension(dimensions)?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Acquire)
    }
}
