//! REST client for the bills vector index.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{IndexMatch, VectorIndex};

/// HTTP vector-index client. The backend exposes a single `/query` endpoint
/// taking a dense vector and returning scored matches with bill metadata.
pub struct HttpVectorIndex {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl HttpVectorIndex {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<IndexMatch>> {
        let endpoint = format!("{}/query", self.endpoint);
        let request = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Vector index query to {} timed out", endpoint)
                } else if e.is_connect() {
                    anyhow!("Failed to connect to vector index at {}: {}", endpoint, e)
                } else {
                    anyhow!("Vector index request to {} failed: {}", endpoint, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Vector index error ({}): {}", status, error));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse vector index response: {}", e))?;
        Ok(result.matches)
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}
