//! Text embedding through an Ollama-compatible endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Turns text into a fixed-dimension vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;

    /// Dimension of the produced vectors, used when creating the vector
    /// collection.
    fn dimensions(&self) -> usize;
}

/// Embedding provider backed by Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: normalize_base_url(base_url),
            model: model.to_string(),
            dims,
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn embeddings_endpoint(base_url: &str) -> String {
    format!("{}/api/embeddings", normalize_base_url(base_url))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(embeddings_endpoint(&self.base_url))
            .json(&request)
            .send()
            .map_err(|e| Error::provider("embedding", e))?
            .error_for_status()
            .map_err(|e| Error::provider("embedding", e))?
            .json::<EmbeddingResponse>()
            .map_err(|e| Error::provider("embedding", e))?;

        if response.embedding.is_empty() {
            return Err(Error::provider("embedding", "empty embedding response"));
        }
        Ok(response.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
