//! Vector-index seam: cosine nearest-neighbour lookup over bill embeddings.

pub mod http;

pub use http::HttpVectorIndex;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// One nearest-neighbour match from the index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    /// Cosine similarity, in [-1, 1].
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Query the index with a dense vector, returning up to `top_k` matches
    /// ordered by the backend's similarity ranking.
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<IndexMatch>>;
}
