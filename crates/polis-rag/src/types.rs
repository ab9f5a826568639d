use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized representation of a user's intent, extracted from free text.
///
/// Immutable once produced. The extraction fallback policy guarantees that at
/// least one field is populated before the query is dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    #[serde(default)]
    pub bill_search_terms: BTreeSet<String>,
    #[serde(default)]
    pub politician_names: BTreeSet<String>,
    #[serde(default)]
    pub donor_keywords: BTreeSet<String>,
    #[serde(default)]
    pub bill_number: Option<String>,
}

impl StructuredQuery {
    /// Degraded query used when extraction cannot produce a structured one:
    /// the raw question becomes the only search term.
    pub fn fallback(question: &str) -> Self {
        let mut terms = BTreeSet::new();
        terms.insert(question.trim().to_string());
        Self {
            bill_search_terms: terms,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bill_search_terms.is_empty()
            && self.politician_names.is_empty()
            && self.donor_keywords.is_empty()
            && self.bill_number.is_none()
    }

    /// Union of all term sets, in deterministic order. Used to build the
    /// single embedding request for semantic retrieval.
    pub fn term_union(&self) -> Vec<&str> {
        self.bill_search_terms
            .iter()
            .chain(self.politician_names.iter())
            .chain(self.donor_keywords.iter())
            .map(String::as_str)
            .collect()
    }
}

/// A bill document returned by the semantic retriever.
///
/// Sequences of these are strictly sorted by descending score and contain no
/// duplicate ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    /// Cosine similarity against the query embedding, in [-1, 1].
    pub score: f32,
    pub title: String,
    pub summary: String,
    pub sponsor: String,
    pub bill_number: Option<String>,
    pub congress: Option<String>,
}

/// The closed set of analytical query categories. Each category maps to
/// exactly one parameterized query template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyticalCategory {
    TopDonorsByKeyword,
    PoliticianVotes,
    BillSponsorDonors,
}

impl AnalyticalCategory {
    pub const ALL: [AnalyticalCategory; 3] = [
        AnalyticalCategory::TopDonorsByKeyword,
        AnalyticalCategory::PoliticianVotes,
        AnalyticalCategory::BillSponsorDonors,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AnalyticalCategory::TopDonorsByKeyword => "top-donors-by-keyword",
            AnalyticalCategory::PoliticianVotes => "politician-votes",
            AnalyticalCategory::BillSponsorDonors => "bill-sponsor-donors",
        }
    }
}

impl fmt::Display for AnalyticalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One aggregate row from the analytical store: column name to value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalRow {
    pub category: AnalyticalCategory,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Which retrieval branch contributed a citable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    Semantic,
    Analytical(AnalyticalCategory),
}

/// A canonical citation entry in the bundle. A bill that appears in both the
/// semantic documents and an analytical table yields a single entry tagged
/// with both origins, so synthesis does not double-cite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Reference id as it should appear in citations, e.g. "H.R. 2468" or a
    /// donor name. Deduplication happens on the normalized form.
    pub id: String,
    pub title: Option<String>,
    pub origins: BTreeSet<SourceOrigin>,
}

/// The bounded, deduplicated collection of evidence passed to synthesis.
/// Lives for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub semantic_docs: Vec<RetrievedDocument>,
    pub analytical_tables: BTreeMap<AnalyticalCategory, Vec<AnalyticalRow>>,
    pub sources: Vec<SourceRef>,
    pub query: StructuredQuery,
    pub original_question: String,
    pub partial_failures: BTreeSet<AnalyticalCategory>,
}

impl ContextBundle {
    /// True when neither retrieval branch contributed any evidence.
    pub fn is_empty(&self) -> bool {
        self.semantic_docs.is_empty() && self.analytical_tables.values().all(|t| t.is_empty())
    }

    /// Look up a source entry by raw citation text (normalized match).
    pub fn find_source(&self, reference: &str) -> Option<&SourceRef> {
        let wanted = normalize_reference(reference);
        if wanted.is_empty() {
            return None;
        }
        self.sources
            .iter()
            .find(|s| normalize_reference(&s.id) == wanted)
    }
}

/// A grounded answer produced by the synthesis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Every entry references a source present in the producing bundle.
    pub citations: Vec<String>,
    pub insufficient_data: bool,
}

impl Answer {
    /// The single terminal answer state used when both retrieval branches
    /// came back empty.
    pub fn insufficient() -> Self {
        Self {
            text: "Insufficient data: neither the bill index nor the analytical records \
                   returned evidence relevant to this question."
                .to_string(),
            citations: Vec::new(),
            insufficient_data: true,
        }
    }
}

/// Response surface of the core-facing API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<String>,
    pub insufficient_data: bool,
    pub partial_failures: BTreeSet<AnalyticalCategory>,
}

/// Canonical form for citation matching: uppercase alphanumerics only, so
/// "H.R. 2468", "HR 2468" and "hr2468" collide to "HR2468".
pub fn normalize_reference(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
