// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process sentence embedding with ONNX Runtime.
//!
//! Runs a transformer encoder on CPU, mean-pools the token states under the
//! attention mask and L2-normalizes the result. The output dimension is read from
//! the model by encoding a probe sentence at load time.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info};

use mnemos_core::traits::embedding::validate_embeddings;
use mnemos_core::vector::l2_normalize;
use mnemos_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, MnemosError,
    PluginAdapter, Vector,
};

use crate::model_manager::ModelManager;

/// Text encoded once at load to discover the model's hidden size.
const DIMENSION_PROBE: &str = "dimension probe";

/// ONNX-backed [`EmbeddingAdapter`].
pub struct OnnxEmbedder {
    model_name: String,
    /// ONNX Runtime session; `run` needs `&mut`.
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    dimension: usize,
}

// Safety: the session is only reached through the Mutex, and the tokenizer is only
// used for `encode`, which takes `&self`.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Ensures the model is cached (downloading if needed) and loads it.
    pub async fn load(manager: &ModelManager, intra_threads: usize) -> Result<Self, MnemosError> {
        let model_path = manager.ensure_model().await?;
        Self::from_files(
            manager.model_name(),
            &model_path,
            &manager.tokenizer_path(),
            intra_threads,
        )
    }

    /// Loads a model and tokenizer from explicit paths.
    pub fn from_files(
        model_name: &str,
        model_path: &Path,
        tokenizer_path: &Path,
        intra_threads: usize,
    ) -> Result<Self, MnemosError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            MnemosError::Config(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| MnemosError::Internal(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MnemosError::Internal(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| MnemosError::Internal(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                MnemosError::Config(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        let mut embedder = Self {
            model_name: model_name.to_string(),
            session: Mutex::new(session),
            tokenizer,
            dimension: 0,
        };
        embedder.dimension = embedder.embed_text(DIMENSION_PROBE)?.len();
        info!(model = model_name, dimension = embedder.dimension, "local embedding model loaded");
        Ok(embedder)
    }

    /// Embeds one text.
    pub fn embed_text(&self, text: &str) -> Result<Vector, MnemosError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| MnemosError::encoding(format!("tokenization failed: {e}")))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = ids.len();

        let shaped = |name: &str, data: Vec<i64>| {
            Array2::from_shape_vec((1, seq_len), data)
                .map_err(|e| MnemosError::encoding(format!("bad {name} shape: {e}")))
        };
        let ids_array = shaped("input_ids", ids)?;
        let mask_array = shaped("attention_mask", mask.clone())?;
        let type_array = shaped("token_type_ids", type_ids)?;

        let ids_tensor = TensorRef::from_array_view(&ids_array)
            .map_err(|e| MnemosError::encoding(format!("input_ids tensor: {e}")))?;
        let mask_tensor = TensorRef::from_array_view(&mask_array)
            .map_err(|e| MnemosError::encoding(format!("attention_mask tensor: {e}")))?;
        let type_tensor = TensorRef::from_array_view(&type_array)
            .map_err(|e| MnemosError::encoding(format!("token_type_ids tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| MnemosError::Internal(format!("ONNX session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor
            ])
            .map_err(|e| MnemosError::encoding(format!("ONNX inference failed: {e}")))?;

        // [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MnemosError::encoding(format!("unexpected model output: {e}")))?;
        if shape.len() == 0 {
            return Err(MnemosError::encoding("model output has no dimensions"));
        }
        let hidden = shape[shape.len() - 1] as usize;

        Ok(l2_normalize(&mean_pool(data, &mask, seq_len, hidden)))
    }
}

/// Average token states, counting only positions the attention mask keeps.
fn mean_pool(states: &[f32], mask: &[i64], seq_len: usize, hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut kept = 0usize;

    for (pos, _) in mask.iter().take(seq_len).enumerate().filter(|(_, m)| **m > 0) {
        let row = &states[pos * hidden..(pos + 1) * hidden];
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
        kept += 1;
    }

    if kept > 0 {
        let n = kept as f32;
        sum.iter_mut().for_each(|v| *v /= n);
    }
    sum
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        &self.model_name
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
            Ok(HealthStatus::Unhealthy("probe encode failed".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), MnemosError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemosError> {
        if input.texts.is_empty() {
            return Err(MnemosError::encoding("cannot embed an empty batch"));
        }
        debug!(count = input.texts.len(), "encoding locally");

        let embeddings = input
            .texts
            .iter()
            .map(|t| self.embed_text(t))
            .collect::<Result<Vec<_>, _>>()?;
        let dimensions = validate_embeddings(input.texts.len(), &embeddings)?;
        if dimensions != self.dimension {
            return Err(MnemosError::DimensionMismatch {
                expected: self.dimension,
                actual: dimensions,
            });
        }
        metrics::counter!("mnemos_embedding_requests_total", "backend" => "local").increment(1);

        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
