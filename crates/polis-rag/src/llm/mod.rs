//! Language-model seams: chat completion and query embedding.
//!
//! The pipeline consumes both through narrow traits so that tests can swap in
//! deterministic fakes and the HTTP client stays an implementation detail.

pub mod external;

pub use external::OpenAiCompatibleClient;

use anyhow::Result;
use async_trait::async_trait;

/// Sampling options for one chat completion call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one chat completion with a system instruction and a user message,
    /// returning the assistant text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String>;
}

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query into a dense vector.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}
