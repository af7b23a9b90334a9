//! Text embeddings.
//!
//! The pipeline embeds each new document twice: once for the whole text and
//! once for all of its section bodies as a single batch. An
//! [`EmbeddingProvider`] that reports itself disabled is never called and
//! documents are stored without vectors.
//!
//! | `embedding.provider` | Implementation |
//! |----------------------|----------------|
//! | `"disabled"` | [`DisabledProvider`] |
//! | `"openai"` | [`OpenAIProvider`] (`POST /embeddings`, see [`crate::openai`] for retries) |
//!
//! Vectors are persisted as little-endian `f32` BLOBs via [`vec_to_blob`]
//! and [`blob_to_vec`].

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::openai::OpenAIClient;

/// Maps texts to fixed-dimension vectors.
///
/// `embed` must return exactly one vector per input, in input order; an
/// empty input yields an empty output.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Whether vectors should be computed at all.
    fn is_enabled(&self) -> bool {
        true
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Disabled ============

/// Stand-in when no embedding backend is configured.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Embeds through an OpenAI-compatible `/embeddings` endpoint, sending at
/// most `batch_size` inputs per request. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    client: OpenAIClient,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OpenAIProvider {
    /// Fails if `model` or `dims` is unset, or `OPENAI_API_KEY` is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let Some(model) = config.model.clone() else {
            bail!("embedding.model is required for the openai provider");
        };
        let Some(dims) = config.dims else {
            bail!("embedding.dims is required for the openai provider");
        };
        let client =
            OpenAIClient::from_env(&config.base_url, config.timeout_secs, config.max_retries)?;

        Ok(Self {
            client,
            model,
            dims,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let reply = self.client.post_json("embeddings", &body).await?;
        let vectors = parse_embeddings(reply)?;
        if vectors.len() != texts.len() {
            bail!(
                "embeddings endpoint returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        debug!(model = %self.model, inputs = texts.len(), "embedded batch");
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// `data[].embedding`, reordered by `index` when the server provides one.
fn parse_embeddings(reply: serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let reply: EmbeddingsReply =
        serde_json::from_value(reply).context("unexpected embeddings response shape")?;
    let mut items: Vec<(usize, Vec<f32>)> = reply
        .data
        .into_iter()
        .enumerate()
        .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
        .collect();
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

/// Provider selected by `embedding.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Little-endian `f32` bytes of `vector`.
///
/// ```rust
/// use hiremind::embedding::{blob_to_vec, vec_to_blob};
///
/// let blob = vec_to_blob(&[0.5, -4.0]);
/// assert_eq!(blob.len(), 8);
/// assert_eq!(blob_to_vec(&blob), vec![0.5, -4.0]);
/// ```
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]; a trailing partial value is ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|bytes| bytes.try_into().ok().map(f32::from_le_bytes))
        .collect()
}
