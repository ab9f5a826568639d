//! Long-lived service connections, constructed once per process.
//!
//! The cache is the only state shared across requests. It is read-mostly
//! after warm-up: request handling never mutates it.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::index::{HttpVectorIndex, VectorIndex};
use crate::llm::{ChatModel, EmbeddingModel, OpenAiCompatibleClient};
use crate::store::{AnalyticsStore, SqliteStore};

/// Handles to the external collaborators, shared by every request.
pub struct Services {
    pub chat: Arc<dyn ChatModel>,
    pub embeddings: Arc<dyn EmbeddingModel>,
    pub index: Arc<dyn VectorIndex>,
    pub store: Arc<dyn AnalyticsStore>,
}

enum CacheState {
    Empty,
    Ready(Arc<Services>),
    Failed(String),
}

/// Initialize-once cache for service handles.
///
/// A failed construction latches: every later caller gets
/// `PipelineError::ServiceUnavailable` until [`ServiceCache::reset`] is
/// called explicitly. There is no silent per-request retry.
pub struct ServiceCache {
    state: RwLock<CacheState>,
    init_lock: Mutex<()>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::Empty),
            init_lock: Mutex::new(()),
        }
    }

    /// Get the cached handles, constructing them on first access. Safe under
    /// concurrent first access: exactly one caller builds, the rest wait.
    pub async fn get_or_init(
        &self,
        config: &PipelineConfig,
    ) -> Result<Arc<Services>, PipelineError> {
        if let Some(result) = self.resolve() {
            return result;
        }

        let _guard = self.init_lock.lock().await;
        // A concurrent caller may have finished while we waited for the lock.
        if let Some(result) = self.resolve() {
            return result;
        }

        match Self::build(config) {
            Ok(services) => {
                let services = Arc::new(services);
                *self.state.write() = CacheState::Ready(Arc::clone(&services));
                tracing::info!("Service connections initialized");
                Ok(services)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(error = %message, "Service initialization failed");
                *self.state.write() = CacheState::Failed(message.clone());
                Err(PipelineError::ServiceUnavailable(message))
            }
        }
    }

    /// Clear a latched failure (or a live cache) so the next caller rebuilds.
    pub fn reset(&self) {
        *self.state.write() = CacheState::Empty;
    }

    fn resolve(&self) -> Option<Result<Arc<Services>, PipelineError>> {
        match &*self.state.read() {
            CacheState::Empty => None,
            CacheState::Ready(services) => Some(Ok(Arc::clone(services))),
            CacheState::Failed(message) => {
                Some(Err(PipelineError::ServiceUnavailable(message.clone())))
            }
        }
    }

    fn build(config: &PipelineConfig) -> Result<Services> {
        let llm_key = std::env::var(&config.llm.api_key_env)
            .with_context(|| format!("Missing API key env var {}", config.llm.api_key_env))?;
        let index_key = std::env::var(&config.index.api_key_env)
            .with_context(|| format!("Missing API key env var {}", config.index.api_key_env))?;

        let llm = Arc::new(OpenAiCompatibleClient::new(
            config.llm.api_base.clone(),
            llm_key,
            config.llm.embedding_model.clone(),
            config.llm.embedding_dimension,
        )?);
        let index = Arc::new(HttpVectorIndex::new(
            config.index.endpoint.clone(),
            index_key,
        )?);
        let store = Arc::new(SqliteStore::open(&config.store.db_path)?);

        Ok(Services {
            chat: llm.clone(),
            embeddings: llm,
            index,
            store,
        })
    }
}

impl Default for ServiceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_missing_keys(llm_var: &str, index_var: &str) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.llm.api_key_env = llm_var.to_string();
        config.index.api_key_env = index_var.to_string();
        config
    }

    #[tokio::test]
    async fn failed_initialization_latches_until_reset() {
        let llm_var = "POLIS_RAG_TEST_LLM_KEY_LATCH";
        let index_var = "POLIS_RAG_TEST_INDEX_KEY_LATCH";
        std::env::remove_var(llm_var);
        std::env::remove_var(index_var);

        let cache = ServiceCache::new();
        let config = config_with_missing_keys(llm_var, index_var);

        let first = cache.get_or_init(&config).await;
        match first {
            Err(PipelineError::ServiceUnavailable(message)) => {
                assert!(message.contains(llm_var));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected ServiceUnavailable"),
        }

        // Even with the key now present, the failure stays latched: no
        // rebuild happens, so the original message is returned.
        std::env::set_var(llm_var, "test-key");
        let second = cache.get_or_init(&config).await;
        match second {
            Err(PipelineError::ServiceUnavailable(message)) => {
                assert!(message.contains(llm_var));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected latched failure"),
        }

        // Reset triggers a real rebuild, which now trips on the index key.
        cache.reset();
        let third = cache.get_or_init(&config).await;
        match third {
            Err(PipelineError::ServiceUnavailable(message)) => {
                assert!(message.contains(index_var));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected rebuild failure"),
        }
        std::env::remove_var(llm_var);
    }

    #[tokio::test]
    async fn concurrent_first_access_resolves_to_one_state() {
        let llm_var = "POLIS_RAG_TEST_LLM_KEY_CONCURRENT";
        std::env::remove_var(llm_var);

        let cache = Arc::new(ServiceCache::new());
        let config = Arc::new(config_with_missing_keys(
            llm_var,
            "POLIS_RAG_TEST_INDEX_KEY_CONCURRENT",
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let config = Arc::clone(&config);
                tokio::spawn(async move { cache.get_or_init(&config).await.err().is_some() })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap(), "every caller sees the latched failure");
        }
    }
}
