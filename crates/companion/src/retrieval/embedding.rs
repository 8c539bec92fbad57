use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::configs::OpenAiEmbeddingConfig;

/// Turns documents and queries into vectors for similarity search
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text, returning one vector per input in the same order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeddings from an OpenAI-compatible `/v1/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbeddingConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&json!({
                "model": self.config.model,
                "input": texts,
            }))
            .send()
            .await?;

        let body: Value = match response.status() {
            StatusCode::OK => response.json().await?,
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Embedding request failed: {}\nResponse: {}", status, body));
            }
        };

        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow!("No data in embedding response"))?;

        let mut indexed = Vec::with_capacity(data.len());
        for (position, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(position);
            let vector = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Embedding entry {} has no vector", index))?
                .iter()
                .map(|x| x.as_f64().unwrap_or_default() as f32)
                .collect::<Vec<f32>>();
            indexed.push((index, vector));
        }
        indexed.sort_by_key(|(index, _)| *index);

        if indexed.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, got {}",
                texts.len(),
                indexed.len()
            ));
        }

        Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
    }
}

/// Offline embeddings from a local sentence-embedding model (all-MiniLM-L6-v2).
///
/// The model is downloaded into `cache_dir` on first use and loaded from there afterwards.
#[derive(Clone)]
pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
}

impl LocalEmbedder {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir.into())
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Failed to load local embedding model: {}", e))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }

    /// Load the model off the async runtime; the first load may download it
    pub async fn load(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        tokio::task::spawn_blocking(move || Self::new(cache_dir)).await?
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await?
            .map_err(|e| anyhow!("Failed to generate embeddings: {}", e))
    }
}
