use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base, e.g. "https://api.openai.com/v1".
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub extraction_model: String,
    pub synthesis_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the bills vector index.
    pub endpoint: String,
    /// Environment variable holding the index API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the analytical SQLite database produced by the ETL jobs.
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest-neighbour count for the semantic branch.
    pub top_k: usize,
    /// Row cap applied to every analytical category.
    pub row_cap: usize,
    pub semantic_timeout_secs: u64,
    /// Per-category timeout for the analytical branch.
    pub analytical_timeout_secs: u64,
    pub extraction_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Budget on the rendered context passed to synthesis, in characters.
    pub max_context_chars: usize,
    /// Semantic documents never truncated below this count while any exist.
    pub min_semantic_docs: usize,
    /// Per-document summary snippet length in the rendered context.
    pub summary_snippet_chars: usize,
}

impl PipelineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.embedding_dimension == 0 {
            return Err("llm.embedding_dimension must be > 0".into());
        }
        if self.llm.api_base.is_empty() {
            return Err("llm.api_base must not be empty".into());
        }
        if self.index.endpoint.is_empty() {
            return Err("index.endpoint must not be empty".into());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be > 0".into());
        }
        if self.retrieval.row_cap == 0 {
            return Err("retrieval.row_cap must be > 0".into());
        }
        if self.context.min_semantic_docs == 0 {
            return Err("context.min_semantic_docs must be > 0".into());
        }
        if self.context.max_context_chars < 2_000 {
            return Err("context.max_context_chars must be >= 2000".into());
        }
        if self.context.summary_snippet_chars < 100 {
            return Err("context.summary_snippet_chars must be >= 100".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                extraction_model: "gpt-4o-mini".to_string(),
                synthesis_model: "gpt-4o".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                embedding_dimension: 1536,
            },
            index: IndexConfig {
                endpoint: "https://bills-index.svc.pinecone.io".to_string(),
                api_key_env: "PINECONE_API_KEY".to_string(),
            },
            store: StoreConfig {
                db_path: PathBuf::from("data/politician_analytics.db"),
            },
            retrieval: RetrievalConfig {
                top_k: 8,
                row_cap: 10,
                semantic_timeout_secs: 5,
                analytical_timeout_secs: 5,
                extraction_timeout_secs: 10,
                synthesis_timeout_secs: 30,
            },
            context: ContextConfig {
                max_context_chars: 12_000,
                min_semantic_docs: 3,
                summary_snippet_chars: 400,
            },
        }
    }
}
