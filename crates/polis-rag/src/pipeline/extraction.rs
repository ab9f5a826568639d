//! Keyword extraction: one LLM call converts a free-text question into a
//! StructuredQuery.
//!
//! Extraction never fails upward. Malformed output, schema violations,
//! timeouts, and transport errors all resolve to a fallback query that
//! carries the raw question as its only search term.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{ChatModel, GenerationOptions};
use crate::types::StructuredQuery;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a keyword extraction assistant for a legislative analytics system. Given a user question, output a single JSON object with exactly these fields:

{"bill_search_terms":["..."],"politician_names":["..."],"donor_keywords":["..."],"bill_number":null}

RULES:
- bill_search_terms: main topics/themes for searching bill text (e.g. "clean energy", "crypto regulation").
- politician_names: full names of any legislators the question mentions.
- donor_keywords: industries, companies, or organizations relevant to campaign-finance lookups.
- bill_number: the official bill number (e.g. "H.R. 2468") ONLY if the question names one, otherwise null.
- Be concise. Only include terms directly relevant to the question.

Output ONLY the JSON object, nothing else."#;

/// Outcome of one extraction attempt, resolved deterministically before
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Parsed(StructuredQuery),
    Fallback(String),
}

impl Extraction {
    pub fn into_query(self) -> StructuredQuery {
        match self {
            Extraction::Parsed(query) => query,
            Extraction::Fallback(question) => StructuredQuery::fallback(&question),
        }
    }
}

pub struct KeywordExtractor {
    chat: Arc<dyn ChatModel>,
    options: GenerationOptions,
    timeout: Duration,
}

impl KeywordExtractor {
    pub fn new(chat: Arc<dyn ChatModel>, model: String, timeout: Duration) -> Self {
        Self {
            chat,
            options: GenerationOptions {
                model,
                max_tokens: 300,
                temperature: 0.3,
            },
            timeout,
        }
    }

    /// Extract a StructuredQuery from a raw question. Infallible by contract:
    /// every failure mode degrades to the fallback query.
    pub async fn extract(&self, question: &str) -> StructuredQuery {
        self.extract_tagged(question).await.into_query()
    }

    async fn extract_tagged(&self, question: &str) -> Extraction {
        let user = format!("Question: \"{}\"\nJSON:", question.trim());
        let call = self.chat.complete(EXTRACTION_SYSTEM_PROMPT, &user, &self.options);

        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Keyword extraction call failed, using fallback query");
                return Extraction::Fallback(question.to_string());
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Keyword extraction timed out, using fallback query"
                );
                return Extraction::Fallback(question.to_string());
            }
        };

        match parse_extraction(&raw) {
            Some(query) if !query.is_empty() => Extraction::Parsed(query),
            Some(_) => {
                tracing::warn!("Extraction produced an empty query, using fallback query");
                Extraction::Fallback(question.to_string())
            }
            None => {
                tracing::warn!("Extraction returned malformed JSON, using fallback query");
                Extraction::Fallback(question.to_string())
            }
        }
    }
}

/// Parse the LLM's JSON response into a StructuredQuery.
/// Handles common LLM quirks: markdown fences and trailing prose.
fn parse_extraction(raw: &str) -> Option<StructuredQuery> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let parsed: StructuredQuery = serde_json::from_str(json_str).ok()?;
    Some(tidy(parsed))
}

/// Drop empty/whitespace terms and blank bill numbers left by sloppy model
/// output.
fn tidy(query: StructuredQuery) -> StructuredQuery {
    let clean = |set: std::collections::BTreeSet<String>| {
        set.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    };
    StructuredQuery {
        bill_search_terms: clean(query.bill_search_terms),
        politician_names: clean(query.politician_names),
        donor_keywords: clean(query.donor_keywords),
        bill_number: query
            .bill_number
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("null")),
    }
}
