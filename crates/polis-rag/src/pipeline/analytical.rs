//! Analytical retrieval: one parameterized aggregate query per populated
//! StructuredQuery category, executed concurrently with per-category
//! timeouts.
//!
//! Best-effort, partial-completion contract: a failing category is recorded
//! in `partial_failures` and never blocks the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::store::{bound_query_for, AnalyticsStore, BoundQuery};
use crate::types::{AnalyticalCategory, AnalyticalRow, StructuredQuery};

/// Output of the analytical branch: per-category tables plus the categories
/// that degraded this request.
#[derive(Debug, Clone, Default)]
pub struct AnalyticalRetrieval {
    pub tables: BTreeMap<AnalyticalCategory, Vec<AnalyticalRow>>,
    pub partial_failures: BTreeSet<AnalyticalCategory>,
}

pub struct AnalyticalRetriever {
    store: Arc<dyn AnalyticsStore>,
    row_cap: usize,
    timeout: Duration,
}

impl AnalyticalRetriever {
    pub fn new(store: Arc<dyn AnalyticsStore>, row_cap: usize, timeout: Duration) -> Self {
        Self {
            store,
            row_cap,
            timeout,
        }
    }

    pub async fn retrieve(&self, query: &StructuredQuery) -> AnalyticalRetrieval {
        let planned: Vec<BoundQuery> = AnalyticalCategory::ALL
            .iter()
            .filter_map(|category| bound_query_for(*category, query, self.row_cap))
            .collect();

        if planned.is_empty() {
            return AnalyticalRetrieval::default();
        }

        let outcomes = join_all(planned.into_iter().map(|bound| self.run_category(bound))).await;

        let mut retrieval = AnalyticalRetrieval::default();
        for (category, outcome) in outcomes {
            match outcome {
                Ok(rows) => {
                    retrieval.tables.insert(category, rows);
                }
                Err(()) => {
                    retrieval.partial_failures.insert(category);
                }
            }
        }
        retrieval
    }

    async fn run_category(
        &self,
        bound: BoundQuery,
    ) -> (AnalyticalCategory, Result<Vec<AnalyticalRow>, ()>) {
        let category = bound.category;
        match tokio::time::timeout(self.timeout, self.store.run(bound)).await {
            Ok(Ok(rows)) => {
                let mut rows: Vec<AnalyticalRow> = rows
                    .into_iter()
                    .map(|fields| AnalyticalRow { category, fields })
                    .collect();
                rows.truncate(self.row_cap);
                tracing::debug!(%category, rows = rows.len(), "Analytical category complete");
                (category, Ok(rows))
            }
            Ok(Err(e)) => {
                tracing::warn!(%category, error = %format!("{:#}", e), "Analytical category failed");
                (category, Err(()))
            }
            Err(_) => {
                tracing::warn!(
                    %category,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Analytical category timed out"
                );
                (category, Err(()))
            }
        }
    }
}
