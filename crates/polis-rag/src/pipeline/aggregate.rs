//! Result aggregation: merge both retrieval branches into a size-bounded
//! ContextBundle with a deduplicated citation registry.

use std::collections::BTreeSet;

use crate::pipeline::analytical::AnalyticalRetrieval;
use crate::types::{
    normalize_reference, AnalyticalCategory, AnalyticalRow, ContextBundle, RetrievedDocument,
    SourceOrigin, SourceRef, StructuredQuery,
};

pub struct ResultAggregator {
    max_context_chars: usize,
    min_semantic_docs: usize,
    summary_snippet_chars: usize,
}

impl ResultAggregator {
    pub fn new(
        max_context_chars: usize,
        min_semantic_docs: usize,
        summary_snippet_chars: usize,
    ) -> Self {
        Self {
            max_context_chars,
            min_semantic_docs,
            summary_snippet_chars,
        }
    }

    /// Join both branch outputs and the query into a bundle, then enforce the
    /// context budget.
    pub fn bundle(
        &self,
        question: &str,
        query: StructuredQuery,
        semantic_docs: Vec<RetrievedDocument>,
        analytical: AnalyticalRetrieval,
    ) -> ContextBundle {
        let mut bundle = ContextBundle {
            semantic_docs,
            analytical_tables: analytical.tables,
            sources: Vec::new(),
            query,
            original_question: question.to_string(),
            partial_failures: analytical.partial_failures,
        };

        self.enforce_budget(&mut bundle);
        bundle.sources = build_sources(&bundle);

        tracing::debug!(
            docs = bundle.semantic_docs.len(),
            tables = bundle.analytical_tables.len(),
            sources = bundle.sources.len(),
            degraded = bundle.partial_failures.len(),
            "Context bundle assembled"
        );
        bundle
    }

    /// Shrink the bundle until its rendered form fits the budget: drop
    /// lowest-ranked semantic docs first (never below the guaranteed
    /// minimum while any exist), then trim analytical rows from the largest
    /// table.
    fn enforce_budget(&self, bundle: &mut ContextBundle) {
        while render_context(bundle, self.summary_snippet_chars).len() > self.max_context_chars
            && bundle.semantic_docs.len() > self.min_semantic_docs
        {
            // Docs are sorted by descending score, so the last is the
            // lowest-ranked.
            bundle.semantic_docs.pop();
        }

        while render_context(bundle, self.summary_snippet_chars).len() > self.max_context_chars {
            let Some(table) = bundle
                .analytical_tables
                .values_mut()
                .filter(|t| !t.is_empty())
                .max_by_key(|t| t.len())
            else {
                break;
            };
            table.pop();
        }
    }
}

/// Build the canonical citation registry. Bill numbers are the primary
/// reference keys: a bill present in both branches collapses to one entry
/// tagged with both origins. Donor names become citable entries for the
/// financial tables.
fn build_sources(bundle: &ContextBundle) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();

    let mut upsert = |id: String, title: Option<String>, origin: SourceOrigin| {
        let key = normalize_reference(&id);
        if key.is_empty() {
            return;
        }
        if let Some(existing) = sources
            .iter_mut()
            .find(|s| normalize_reference(&s.id) == key)
        {
            existing.origins.insert(origin);
            if existing.title.is_none() {
                existing.title = title;
            }
            return;
        }
        let mut origins = BTreeSet::new();
        origins.insert(origin);
        sources.push(SourceRef { id, title, origins });
    };

    for doc in &bundle.semantic_docs {
        let id = doc.bill_number.clone().unwrap_or_else(|| doc.id.clone());
        upsert(id, Some(doc.title.clone()), SourceOrigin::Semantic);
    }

    for (category, rows) in &bundle.analytical_tables {
        for row in rows {
            for id in row_reference_ids(*category, row, &bundle.query) {
                upsert(id, None, SourceOrigin::Analytical(*category));
            }
        }
    }

    sources
}

/// Reference ids contributed by one analytical row.
fn row_reference_ids(
    category: AnalyticalCategory,
    row: &AnalyticalRow,
    query: &StructuredQuery,
) -> Vec<String> {
    let field_text = |key: &str| -> Option<String> {
        row.fields.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };

    match category {
        AnalyticalCategory::PoliticianVotes => {
            field_text("bill_number").into_iter().collect()
        }
        AnalyticalCategory::TopDonorsByKeyword => {
            field_text("donor_name").into_iter().collect()
        }
        AnalyticalCategory::BillSponsorDonors => {
            let mut ids: Vec<String> = field_text("donor_name").into_iter().collect();
            // The rows answer "who funds the sponsor of this bill", so the
            // queried bill itself is citable evidence.
            if let Some(bill) = &query.bill_number {
                ids.push(bill.clone());
            }
            ids
        }
    }
}

/// Render the bundle into the sectioned evidence block consumed by
/// synthesis. This is also the serialized form the context budget measures.
pub fn render_context(bundle: &ContextBundle, summary_snippet_chars: usize) -> String {
    let mut out = String::new();

    out.push_str("=== LEGISLATIVE CONTEXT (semantic bill search) ===\n");
    if bundle.semantic_docs.is_empty() {
        out.push_str("No relevant bills found.\n");
    } else {
        for doc in &bundle.semantic_docs {
            let reference = doc.bill_number.as_deref().unwrap_or(doc.id.as_str());
            out.push_str(&format!("[{}] {}\n", reference, doc.title));
            if let Some(congress) = &doc.congress {
                out.push_str(&format!("Congress: {}\n", congress));
            }
            out.push_str(&format!("Sponsor: {}\n", doc.sponsor));
            out.push_str(&format!("Summary: {}\n\n", snippet(&doc.summary, summary_snippet_chars)));
        }
    }

    for (category, rows) in &bundle.analytical_tables {
        out.push_str(&format!("=== ANALYTICAL CONTEXT: {} ===\n", category));
        if rows.is_empty() {
            out.push_str("No matching records.\n");
            continue;
        }
        for row in rows {
            let line: Vec<String> = row
                .fields
                .iter()
                .map(|(k, v)| format!("{}: {}", k, render_value(v)))
                .collect();
            out.push_str(&format!("- {}\n", line.join("; ")));
        }
        out.push('\n');
    }

    if !bundle.partial_failures.is_empty() {
        out.push_str("=== DEGRADED SOURCES ===\n");
        for category in &bundle.partial_failures {
            out.push_str(&format!("{} (unavailable this request)\n", category));
        }
    }

    out
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn doc(id: &str, score: f32, bill_number: Option<&str>, summary_len: usize) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            score,
            title: format!("Bill {id}"),
            summary: "s".repeat(summary_len),
            sponsor: "Jane Reyes".to_string(),
            bill_number: bill_number.map(str::to_string),
            congress: Some("118".to_string()),
        }
    }

    fn vote_row(bill_number: &str) -> AnalyticalRow {
        let mut fields = BTreeMap::new();
        fields.insert("bill_number".to_string(), serde_json::json!(bill_number));
        fields.insert("vote_position".to_string(), serde_json::json!("Yea"));
        AnalyticalRow {
            category: AnalyticalCategory::PoliticianVotes,
            fields,
        }
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(12_000, 3, 400)
    }

    #[test]
    fn bill_in_both_branches_yields_one_source_with_both_origins() {
        let mut analytical = AnalyticalRetrieval::default();
        analytical.tables.insert(
            AnalyticalCategory::PoliticianVotes,
            vec![vote_row("HR 2468")],
        );

        let bundle = aggregator().bundle(
            "does she support it?",
            StructuredQuery::default(),
            vec![doc("doc-1", 0.9, Some("H.R. 2468"), 50)],
            analytical,
        );

        let matching: Vec<&SourceRef> = bundle
            .sources
            .iter()
            .filter(|s| normalize_reference(&s.id) == "HR2468")
            .collect();
        assert_eq!(matching.len(), 1);
        let origins = &matching[0].origins;
        assert!(origins.contains(&SourceOrigin::Semantic));
        assert!(origins.contains(&SourceOrigin::Analytical(
            AnalyticalCategory::PoliticianVotes
        )));
        // Display form comes from the first contributor (the semantic doc).
        assert_eq!(matching[0].id, "H.R. 2468");
    }

    #[test]
    fn budget_drops_lowest_ranked_docs_first() {
        let docs: Vec<RetrievedDocument> = (0..8)
            .map(|i| doc(&format!("d{i}"), 1.0 - i as f32 * 0.1, None, 800))
            .collect();

        let tight = ResultAggregator::new(3_000, 3, 400);
        let bundle = tight.bundle(
            "q",
            StructuredQuery::default(),
            docs,
            AnalyticalRetrieval::default(),
        );

        // Highest-ranked docs survive, lowest are gone.
        assert!(bundle.semantic_docs.len() < 8);
        assert_eq!(bundle.semantic_docs[0].id, "d0");
        let ids: Vec<&str> = bundle.semantic_docs.iter().map(|d| d.id.as_str()).collect();
        assert!(!ids.contains(&"d7"));
    }

    #[test]
    fn budget_never_drops_below_three_docs_while_any_exist() {
        let docs: Vec<RetrievedDocument> = (0..5)
            .map(|i| doc(&format!("d{i}"), 1.0 - i as f32 * 0.1, None, 3_000))
            .collect();

        // Budget far too small for even three huge docs.
        let tight = ResultAggregator::new(2_000, 3, 2_900);
        let bundle = tight.bundle(
            "q",
            StructuredQuery::default(),
            docs,
            AnalyticalRetrieval::default(),
        );
        assert_eq!(bundle.semantic_docs.len(), 3);
    }

    #[test]
    fn budget_trims_analytical_rows_after_docs() {
        let mut analytical = AnalyticalRetrieval::default();
        let rows: Vec<AnalyticalRow> = (0..10)
            .map(|i| vote_row(&format!("H.R. {}", 7000 + i)))
            .collect();
        analytical
            .tables
            .insert(AnalyticalCategory::PoliticianVotes, rows);

        let docs: Vec<RetrievedDocument> = (0..3)
            .map(|i| doc(&format!("d{i}"), 0.9, None, 700))
            .collect();

        let tight = ResultAggregator::new(2_400, 3, 650);
        let bundle = tight.bundle("q", StructuredQuery::default(), docs, analytical);

        assert_eq!(bundle.semantic_docs.len(), 3);
        let remaining = &bundle.analytical_tables[&AnalyticalCategory::PoliticianVotes];
        assert!(remaining.len() < 10);
        // Deterministic ordering means the head rows survive.
        assert_eq!(
            remaining[0].fields["bill_number"],
            serde_json::json!("H.R. 7000")
        );
    }

    #[test]
    fn degraded_categories_render_in_context() {
        let mut analytical = AnalyticalRetrieval::default();
        analytical
            .partial_failures
            .insert(AnalyticalCategory::TopDonorsByKeyword);

        let bundle = aggregator().bundle(
            "q",
            StructuredQuery::default(),
            vec![],
            analytical,
        );
        let rendered = render_context(&bundle, 400);
        assert!(rendered.contains("DEGRADED SOURCES"));
        assert!(rendered.contains("top-donors-by-keyword"));
    }

    #[test]
    fn empty_bundle_reports_empty() {
        let bundle = aggregator().bundle(
            "q",
            StructuredQuery::default(),
            vec![],
            AnalyticalRetrieval::default(),
        );
        assert!(bundle.is_empty());
        assert!(bundle.sources.is_empty());
    }
}
