// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves local embedding model files, downloading them on first use.

use std::path::{Path, PathBuf};

use mnemos_config::model::LocalEmbeddingConfig;
use mnemos_core::MnemosError;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Model shipped by default.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const DEFAULT_TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Where a model's files live and where to fetch them from.
pub struct ModelManager {
    model_name: String,
    cache_folder: PathBuf,
    model_url: Option<String>,
    tokenizer_url: Option<String>,
    /// Serializes the first download across concurrent callers.
    ready: OnceCell<PathBuf>,
}

impl ModelManager {
    pub fn new(config: &LocalEmbeddingConfig) -> Self {
        Self {
            model_name: config.model_name.clone(),
            cache_folder: PathBuf::from(&config.cache_folder),
            model_url: config.model_url.clone(),
            tokenizer_url: config.tokenizer_url.clone(),
            ready: OnceCell::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// `{cache_folder}/{model_name}` with `/` in hub names flattened to `--`.
    pub fn model_dir(&self) -> PathBuf {
        self.cache_folder.join(self.model_name.replace('/', "--"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Download sources for (model, tokenizer).
    ///
    /// Explicit URLs win. Hub-style names (`org/model`) resolve to the standard
    /// HuggingFace layout. The bundled default model has fixed URLs. Anything else
    /// must already be present in the cache.
    pub fn sources(&self) -> Result<(String, String), MnemosError> {
        let hub = |file: &str| {
            self.model_name.contains('/').then(|| {
                format!("https://huggingface.co/{}/resolve/main/{file}", self.model_name)
            })
        };
        let builtin = self.model_name == DEFAULT_MODEL;

        let model = self
            .model_url
            .clone()
            .or_else(|| hub("onnx/model.onnx"))
            .or_else(|| builtin.then(|| DEFAULT_MODEL_URL.to_string()));
        let tokenizer = self
            .tokenizer_url
            .clone()
            .or_else(|| hub("tokenizer.json"))
            .or_else(|| builtin.then(|| DEFAULT_TOKENIZER_URL.to_string()));

        match (model, tokenizer) {
            (Some(m), Some(t)) => Ok((m, t)),
            _ => Err(MnemosError::Config(format!(
                "model `{}` is not cached at {} and has no download URL",
                self.model_name,
                self.model_dir().display()
            ))),
        }
    }

    /// Returns the model path, downloading missing files first.
    pub async fn ensure_model(&self) -> Result<PathBuf, MnemosError> {
        self.ready
            .get_or_try_init(|| async {
                if self.is_model_available() {
                    return Ok(self.model_path());
                }

                let (model_url, tokenizer_url) = self.sources()?;
                info!(model = %self.model_name, "embedding model not cached, downloading");

                let dir = self.model_dir();
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(MnemosError::storage)?;

                for (dest, url) in [
                    (self.model_path(), model_url),
                    (self.tokenizer_path(), tokenizer_url),
                ] {
                    if dest.exists() {
                        continue;
                    }
                    let size = download_file(&url, &dest).await?;
                    info!(file = %dest.display(), size, "downloaded");
                }

                info!(dir = %dir.display(), "embedding model ready");
                Ok(self.model_path())
            })
            .await
            .cloned()
    }
}

/// Downloads `url` to `dest` via a `.part` sibling so an interrupted transfer never
/// leaves a truncated file under the final name.
async fn download_file(url: &str, dest: &Path) -> Result<usize, MnemosError> {
    let partial = dest.with_extension("part");

    let result = async {
        let response = reqwest::get(url)
            .await
            .map_err(|e| MnemosError::backend(format!("failed to download {url}"), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MnemosError::BackendUnavailable {
                message: format!("download of {url} returned {status}"),
                source: None,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MnemosError::backend(format!("failed to read body of {url}"), e))?;
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(MnemosError::storage)?;
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(MnemosError::storage)?;
        Ok(bytes.len())
    }
    .await;

    if result.is_err() && tokio::fs::remove_file(&partial).await.is_ok() {
        warn!(file = %partial.display(), "removed partial download");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(name: &str) -> ModelManager {
        ModelManager::new(&LocalEmbeddingConfig {
            model_name: name.to_string(),
            cache_folder: "/data/models".into(),
            ..LocalEmbeddingConfig::default()
        })
    }

    #[test]
    fn paths_live_under_cache_folder() {
        let mgr = manager(DEFAULT_MODEL);
        assert_eq!(
            mgr.model_path(),
            PathBuf::from("/data/models/all-MiniLM-L6-v2/model.onnx")
        );
        assert_eq!(
            mgr.tokenizer_path(),
            PathBuf::from("/data/models/all-MiniLM-L6-v2/tokenizer.json")
        );
    }

    #[test]
    fn hub_names_are_flattened() {
        let mgr = manager("BAAI/bge-small-en-v1.5");
        assert_eq!(
            mgr.model_dir(),
            PathBuf::from("/data/models/BAAI--bge-small-en-v1.5")
        );
        let (model, tokenizer) = mgr.sources().unwrap();
        assert!(model.ends_with("BAAI/bge-small-en-v1.5/resolve/main/onnx/model.onnx"));
        assert!(tokenizer.ends_with("/tokenizer.json"));
    }

    #[test]
    fn default_model_has_builtin_sources() {
        let (model, _) = manager(DEFAULT_MODEL).sources().unwrap();
        assert_eq!(model, DEFAULT_MODEL_URL);
    }

    #[test]
    fn unknown_bare_name_without_urls_is_a_config_error() {
        let err = manager("my-private-model").sources().unwrap_err();
        assert!(matches!(err, MnemosError::Config(_)));
    }

    #[test]
    fn model_not_available_when_missing() {
        assert!(!manager(DEFAULT_MODEL).is_model_available());
    }
}
