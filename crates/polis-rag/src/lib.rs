//! polis-rag — hybrid retrieval and synthesis for legislative analytics.
//!
//! Answers natural-language questions about legislators by fanning a
//! structured query out to a semantic bill index and an analytical store,
//! merging the evidence into a bounded context bundle, and synthesizing a
//! citation-backed answer. Retrieval is best-effort under per-branch
//! timeouts; synthesis is grounded against the bundle's citation registry.

pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::QueryPipeline;
pub use services::{ServiceCache, Services};
pub use types::{
    AnalyticalCategory, AnalyticalRow, Answer, ContextBundle, QueryResponse, RetrievedDocument,
    SourceOrigin, SourceRef, StructuredQuery,
};
