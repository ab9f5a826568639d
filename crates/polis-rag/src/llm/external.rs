//! OpenAI-compatible HTTP client for chat completions and embeddings.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChatModel, EmbeddingModel, GenerationOptions};

/// Client for any endpoint speaking the OpenAI chat/embeddings protocol.
pub struct OpenAiCompatibleClient {
    api_base: String,
    api_key: String,
    embedding_model: String,
    embedding_dimension: usize,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimension: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: embedding_model.into(),
            embedding_dimension,
            client,
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server
    /// returned HTML.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') || trimmed.starts_with("<!") {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}). Response: {}",
                endpoint,
                status,
                preview
            ));
        }
        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    fn send_error(e: reqwest::Error, endpoint: &str) -> anyhow::Error {
        if e.is_timeout() {
            anyhow!("Request to {} timed out", endpoint)
        } else if e.is_connect() {
            anyhow!("Failed to connect to {}: {}", endpoint, e)
        } else {
            anyhow!("Request to {} failed: {}", endpoint, e)
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.api_base);
        let request = json!({
            "model": options.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::send_error(e, &endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat API error ({}): {}", status, error));
        }

        let result: ChatResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("Chat API returned empty choices array"))
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatibleClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let endpoint = format!("{}/embeddings", self.api_base);
        let request = json!({
            "model": self.embedding_model,
            "input": text,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::send_error(e, &endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Embeddings API error ({}): {}", status, error));
        }

        let result: EmbeddingResponse = Self::parse_json_response(response, &endpoint).await?;
        let vector = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("Embeddings API returned empty data array"))?;

        if vector.len() != self.embedding_dimension {
            return Err(anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.embedding_dimension,
                vector.len()
            ));
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

/// Response structures
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
