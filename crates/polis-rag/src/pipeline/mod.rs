//! The hybrid query orchestration pipeline.
//!
//! One request flows: question → keyword extraction → concurrent semantic +
//! analytical retrieval (each branch under its own timeout) → aggregation
//! into a bounded ContextBundle → grounded synthesis. Only synthesis and
//! service initialization can fail the request; every other failure degrades
//! in place.

pub mod aggregate;
pub mod analytical;
pub mod extraction;
pub mod semantic;
pub mod synthesis;

pub use aggregate::ResultAggregator;
pub use analytical::{AnalyticalRetriever, AnalyticalRetrieval};
pub use extraction::{Extraction, KeywordExtractor};
pub use semantic::SemanticRetriever;
pub use synthesis::SynthesisEngine;

use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::services::Services;
use crate::types::{QueryResponse, RetrievedDocument, StructuredQuery};

pub struct QueryPipeline {
    extractor: KeywordExtractor,
    semantic: SemanticRetriever,
    analytical: AnalyticalRetriever,
    aggregator: ResultAggregator,
    synthesis: SynthesisEngine,
    semantic_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(services: &Services, config: &PipelineConfig) -> Self {
        let retrieval = &config.retrieval;
        let context = &config.context;
        Self {
            extractor: KeywordExtractor::new(
                Arc::clone(&services.chat),
                config.llm.extraction_model.clone(),
                Duration::from_secs(retrieval.extraction_timeout_secs),
            ),
            semantic: SemanticRetriever::new(
                Arc::clone(&services.embeddings),
                Arc::clone(&services.index),
                retrieval.top_k,
            ),
            analytical: AnalyticalRetriever::new(
                Arc::clone(&services.store),
                retrieval.row_cap,
                Duration::from_secs(retrieval.analytical_timeout_secs),
            ),
            aggregator: ResultAggregator::new(
                context.max_context_chars,
                context.min_semantic_docs,
                context.summary_snippet_chars,
            ),
            synthesis: SynthesisEngine::new(
                Arc::clone(&services.chat),
                config.llm.synthesis_model.clone(),
                Duration::from_secs(retrieval.synthesis_timeout_secs),
                context.summary_snippet_chars,
            ),
            semantic_timeout: Duration::from_secs(retrieval.semantic_timeout_secs),
        }
    }

    /// Answer one natural-language question.
    ///
    /// Every successful return carries either a grounded answer or an
    /// explicit insufficient-data statement. The only error returns are
    /// `SynthesisFailed` and (from service construction) `ServiceUnavailable`.
    pub async fn submit_query(&self, question: &str) -> Result<QueryResponse, PipelineError> {
        tracing::info!(chars = question.len(), "Query received");
        let query = self.extractor.extract(question).await;
        tracing::debug!(
            bill_terms = query.bill_search_terms.len(),
            politicians = query.politician_names.len(),
            donor_keywords = query.donor_keywords.len(),
            has_bill_number = query.bill_number.is_some(),
            "Structured query ready"
        );

        let (semantic_result, analytical_result) = tokio::join!(
            tokio::time::timeout(self.semantic_timeout, self.semantic.retrieve(&query)),
            self.analytical.retrieve(&query),
        );

        let semantic_docs = self.resolve_semantic(semantic_result);
        let bundle = self
            .aggregator
            .bundle(question, query, semantic_docs, analytical_result);

        let answer = self.synthesis.synthesize(&bundle).await?;
        tracing::info!(
            citations = answer.citations.len(),
            insufficient = answer.insufficient_data,
            degraded = bundle.partial_failures.len(),
            "Query answered"
        );

        Ok(QueryResponse {
            answer: answer.text,
            citations: answer.citations,
            insufficient_data: answer.insufficient_data,
            partial_failures: bundle.partial_failures,
        })
    }

    /// A semantic branch timeout or backend failure contributes zero
    /// documents, never a request error.
    fn resolve_semantic(
        &self,
        result: Result<Result<Vec<RetrievedDocument>, PipelineError>, tokio::time::error::Elapsed>,
    ) -> Vec<RetrievedDocument> {
        match result {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Semantic retrieval unavailable, continuing without documents");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.semantic_timeout.as_millis() as u64,
                    "Semantic retrieval timed out, continuing without documents"
                );
                Vec::new()
            }
        }
    }
}

// Deterministic fakes for the service seams, shared by the component tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::index::{IndexMatch, VectorIndex};
    use crate::llm::{ChatModel, EmbeddingModel, GenerationOptions};
    use crate::services::Services;
    use crate::store::{AnalyticsStore, BoundQuery, StoreRow};
    use crate::types::AnalyticalCategory;

    pub struct MockChat {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl MockChat {
        pub fn with_responses(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for MockChat {
        async fn complete(&self, _system: &str, _user: &str, _: &GenerationOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("mock chat exhausted")))
        }
    }

    pub struct MockEmbeddings {
        dimension: usize,
        calls: AtomicUsize,
    }

    impl MockEmbeddings {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingModel for MockEmbeddings {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.1; self.dimension])
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    pub struct MockIndex {
        matches: Vec<IndexMatch>,
        error: Option<String>,
        calls: AtomicUsize,
    }

    impl MockIndex {
        pub fn with_matches(matches: Vec<IndexMatch>) -> Self {
            Self {
                matches,
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                matches: Vec::new(),
                error: Some(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn query(&self, _vector: Vec<f32>, _top_k: usize) -> Result<Vec<IndexMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.error {
                Some(message) => Err(anyhow::anyhow!("{message}")),
                None => Ok(self.matches.clone()),
            }
        }
    }

    #[derive(Default)]
    pub struct MockStore {
        rows: HashMap<AnalyticalCategory, Vec<StoreRow>>,
        failures: HashSet<AnalyticalCategory>,
        delays: HashMap<AnalyticalCategory, Duration>,
        calls: AtomicUsize,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_rows(
            mut self,
            category: AnalyticalCategory,
            rows: Vec<serde_json::Value>,
        ) -> Self {
            let rows = rows
                .into_iter()
                .map(|v| {
                    v.as_object()
                        .expect("mock rows are JSON objects")
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<BTreeMap<_, _>>()
                })
                .collect();
            self.rows.insert(category, rows);
            self
        }

        pub fn failing(mut self, category: AnalyticalCategory) -> Self {
            self.failures.insert(category);
            self
        }

        pub fn delayed(mut self, category: AnalyticalCategory, delay: Duration) -> Self {
            self.delays.insert(category, delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalyticsStore for MockStore {
        async fn run(&self, query: BoundQuery) -> Result<Vec<StoreRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&query.category) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.contains(&query.category) {
                return Err(anyhow::anyhow!("mock failure for {}", query.category));
            }
            Ok(self.rows.get(&query.category).cloned().unwrap_or_default())
        }
    }

    /// A full service set backed by mocks, for pipeline-level tests.
    pub fn mock_services(
        chat: Arc<MockChat>,
        index: Arc<MockIndex>,
        store: Arc<MockStore>,
    ) -> Services {
        Services {
            chat,
            embeddings: Arc::new(MockEmbeddings::new(8)),
            index,
            store,
        }
    }
}
