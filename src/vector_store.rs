//! Vector storage and similarity search over the Qdrant REST API.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};

/// A vector plus payload, keyed by the node's numeric id.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A search hit, ranked by descending similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
}

/// Stores and searches vectors by similarity.
pub trait VectorStore: Send + Sync {
    /// Probe the backend and create the collection if missing. An
    /// unreachable backend is fatal to startup.
    fn ensure_ready(&self) -> Result<()>;

    fn upsert(&self, points: &[VectorPoint]) -> Result<()>;

    fn delete(&self, ids: &[u64]) -> Result<()>;

    /// Nearest neighbours of `vector`, best first.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>>;
}

/// Vector store backed by a Qdrant instance.
pub struct QdrantStore {
    client: reqwest::blocking::Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(base_url: String, collection: &str, vector_size: usize) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/collections/{}",
            self.base_url,
            utf8_percent_encode(&self.collection, NON_ALPHANUMERIC)
        )
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: u64,
    score: f32,
}

impl VectorStore for QdrantStore {
    fn ensure_ready(&self) -> Result<()> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(collection = %self.collection, "creating vector collection");
            self.client
                .put(self.collection_url())
                .json(&json!({
                    "vectors": {
                        "size": self.vector_size,
                        "distance": "Cosine",
                    }
                }))
                .send()
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?
                .error_for_status()
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
            return Ok(());
        }

        response
            .error_for_status()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    fn upsert(&self, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": p.payload,
                }))
                .collect::<Vec<_>>(),
        });

        self.client
            .put(format!("{}/points", self.collection_url()))
            .query(&[("wait", "true")])
            .json(&body)
            .send()
            .map_err(|e| Error::provider("vector store", e))?
            .error_for_status()
            .map_err(|e| Error::provider("vector store", e))?;
        Ok(())
    }

    fn delete(&self, ids: &[u64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .post(format!("{}/points/delete", self.collection_url()))
            .query(&[("wait", "true")])
            .json(&json!({ "points": ids }))
            .send()
            .map_err(|e| Error::provider("vector store", e))?
            .error_for_status()
            .map_err(|e| Error::provider("vector store", e))?;
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": false,
            }))
            .send()
            .map_err(|e| Error::provider("vector store", e))?
            .error_for_status()
            .map_err(|e| Error::provider("vector store", e))?
            .json::<SearchResponse>()
            .map_err(|e| Error::provider("vector store", e))?;

        Ok(response
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                id: hit.id,
                score: hit.score,
            })
            .collect())
    }
}
