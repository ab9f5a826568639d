//! Semantic retrieval: embed the query terms once, run one cosine
//! nearest-neighbour lookup, and map index matches to bill documents.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::index::{IndexMatch, VectorIndex};
use crate::llm::EmbeddingModel;
use crate::types::{RetrievedDocument, StructuredQuery};

pub struct SemanticRetriever {
    embeddings: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl SemanticRetriever {
    pub fn new(
        embeddings: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embeddings,
            index,
            top_k,
        }
    }

    /// Retrieve bill documents for the query's term union.
    ///
    /// An empty term union returns an empty list without any network call.
    /// Backend failures surface as `RetrievalUnavailable`; the caller treats
    /// that as zero documents, never as a fatal error.
    pub async fn retrieve(
        &self,
        query: &StructuredQuery,
    ) -> Result<Vec<RetrievedDocument>, PipelineError> {
        let terms = query.term_union();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let search_text = terms.join(" ");

        let vector = self
            .embeddings
            .embed_query(&search_text)
            .await
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("{:#}", e)))?;

        let matches = self
            .index
            .query(vector, self.top_k)
            .await
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("{:#}", e)))?;

        let docs = collate(matches, self.top_k);
        tracing::debug!(count = docs.len(), "Semantic retrieval complete");
        Ok(docs)
    }
}

/// Deduplicate by id keeping the highest score, then sort by descending
/// score with id as tiebreak so output order is total.
fn collate(matches: Vec<IndexMatch>, top_k: usize) -> Vec<RetrievedDocument> {
    let mut best: HashMap<String, RetrievedDocument> = HashMap::new();
    for m in matches {
        let doc = document_from_match(m);
        match best.get(&doc.id) {
            Some(existing) if existing.score >= doc.score => {}
            _ => {
                best.insert(doc.id.clone(), doc);
            }
        }
    }

    let mut docs: Vec<RetrievedDocument> = best.into_values().collect();
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    docs.truncate(top_k);
    docs
}

fn document_from_match(m: IndexMatch) -> RetrievedDocument {
    let text = |key: &str| -> Option<String> {
        m.metadata.get(key).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    RetrievedDocument {
        title: text("title").unwrap_or_else(|| "Untitled bill".to_string()),
        summary: text("summary").unwrap_or_default(),
        sponsor: text("sponsor_name").unwrap_or_else(|| "Unknown".to_string()),
        bill_number: text("bill_number"),
        congress: text("congress"),
        id: m.id,
        score: m.score,
    }
}
