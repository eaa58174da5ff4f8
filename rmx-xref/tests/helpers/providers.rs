//! Mock providers
//!
//! Network-free providers answering from fixed data.

use async_trait::async_trait;
use rmx_xref::broker::SourceBroker;
use rmx_xref::types::{FetchError, Provider, RawFields};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers from a term → record map (case-insensitive)
pub struct MapProvider {
    id: String,
    records: HashMap<String, RawFields>,
}

impl MapProvider {
    pub fn new(id: &str, records: &[(&str, serde_json::Value)]) -> Self {
        let records = records
            .iter()
            .map(|(term, value)| {
                let fields: RawFields = serde_json::from_value(value.clone()).unwrap();
                (term.trim().to_lowercase(), fields)
            })
            .collect();
        Self {
            id: id.to_string(),
            records,
        }
    }
}

#[async_trait]
impl Provider for MapProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
        Ok(self.records.get(&term.trim().to_lowercase()).cloned())
    }
}

/// Always times out
pub struct FailingProvider {
    pub id: String,
}

#[async_trait]
impl Provider for FailingProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
        Err(FetchError::Timeout(format!("lookup of '{}' timed out", term)))
    }
}

/// Logs every lookup into `lookup_log` before answering from `inner`
///
/// The write fails when another connection holds the database write lock.
pub struct WritingProvider {
    pub pool: SqlitePool,
    pub inner: MapProvider,
}

#[async_trait]
impl Provider for WritingProvider {
    fn source_id(&self) -> &str {
        self.inner.source_id()
    }

    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
        sqlx::query("INSERT INTO lookup_log (term) VALUES (?)")
            .bind(term)
            .execute(&self.pool)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        self.inner.fetch(term).await
    }
}

/// Broker over the given providers, in order
pub fn broker_of(providers: Vec<Arc<dyn Provider>>) -> SourceBroker {
    SourceBroker::new(providers)
}
