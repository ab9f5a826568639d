//! Analytical store seam: parameterized aggregate queries over the
//! politicians/donors/donations/bills/votes database.
//!
//! The store is read-only from the pipeline's point of view; ingestion and
//! schema management happen in the ETL jobs.

pub mod queries;

pub use queries::{bound_query_for, BoundQuery, SqlParam};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// One result row: column name to JSON value.
pub type StoreRow = BTreeMap<String, serde_json::Value>;

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Execute one bound query and return its rows.
    async fn run(&self, query: BoundQuery) -> Result<Vec<StoreRow>>;
}

/// SQLite-backed analytical store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open an existing analytical database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open analytical store at {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests and local experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Direct access to the underlying connection, for loading fixtures.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

#[async_trait]
impl AnalyticsStore for SqliteStore {
    async fn run(&self, query: BoundQuery) -> Result<Vec<StoreRow>> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<Vec<StoreRow>> {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare(&query.sql)
                .with_context(|| format!("Failed to prepare {} query", query.category))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt
                .query(rusqlite::params_from_iter(query.params.iter()))
                .with_context(|| format!("Failed to execute {} query", query.category))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut fields = StoreRow::new();
                for (i, name) in columns.iter().enumerate() {
                    fields.insert(name.clone(), value_to_json(row.get_ref(i)?));
                }
                out.push(fields);
            }
            Ok(out)
        })
        .await
        .map_err(|e| anyhow!("Analytical query task panicked: {}", e))?
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => {
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}
