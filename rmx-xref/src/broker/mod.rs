//! Source Broker
//!
//! Gathers raw per-term records from every configured provider. Providers
//! are independent and read-only, so the lookups for one term run
//! concurrently, and terms run through a bounded worker pool.
//!
//! A provider that errors, times out or has no record contributes nothing
//! for that term; no single provider failure aborts a gather.

mod extract_provider;
mod http_provider;

pub use extract_provider::ExtractProvider;
pub use http_provider::HttpProvider;

use crate::types::{Provider, RawFields};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rmx_common::config::{SourceConfig, SourceKind};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records gathered for one term, in provider precedence order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatherResult {
    pub term: String,
    /// (source id, raw fields)
    pub records: Vec<(String, RawFields)>,
}

impl GatherResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, source: &str) -> Option<&RawFields> {
        self.records
            .iter()
            .find(|(id, _)| id == source)
            .map(|(_, fields)| fields)
    }
}

/// Fan-out over providers in precedence order
pub struct SourceBroker {
    providers: Vec<Arc<dyn Provider>>,
}

impl SourceBroker {
    /// Broker over already-built providers (order = precedence)
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Build providers for every enabled `[[sources]]` entry
    ///
    /// A provider that cannot be built (missing extract, bad URL) is logged
    /// and left out; the run continues with the remaining sources.
    pub async fn from_config(sources: &[SourceConfig]) -> Self {
        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

        for source in sources.iter().filter(|s| s.enabled) {
            let id = source.id.trim().to_lowercase();
            let built: Result<Arc<dyn Provider>, _> = match source.kind {
                SourceKind::Http => HttpProvider::new(
                    &id,
                    source.url.as_deref().unwrap_or_default(),
                    source.timeout_secs,
                    source.min_interval_ms,
                )
                .map(|p| Arc::new(p) as Arc<dyn Provider>),
                SourceKind::Extract => match &source.path {
                    Some(path) => ExtractProvider::load(&id, path)
                        .await
                        .map(|p| Arc::new(p) as Arc<dyn Provider>),
                    None => continue,
                },
            };

            match built {
                Ok(provider) => {
                    info!(source = %id, "Provider ready");
                    providers.push(provider);
                }
                Err(e) => warn!(source = %id, error = %e, "Provider unavailable, skipping"),
            }
        }

        Self { providers }
    }

    /// Source ids in precedence order
    pub fn source_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.source_id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Query every provider for one term
    pub async fn gather(&self, term: &str) -> GatherResult {
        let lookups = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let source = provider.source_id().to_string();
                match provider.fetch(term).await {
                    Ok(Some(fields)) if !fields.is_empty() => Some((source, fields)),
                    Ok(_) => {
                        debug!(source = %source, term = %term, "No record");
                        None
                    }
                    Err(e) => {
                        warn!(source = %source, term = %term, error = %e, "Provider failed, skipping");
                        None
                    }
                }
            }
        });

        // join_all keeps provider order, so records stay in precedence order
        let records = join_all(lookups).await.into_iter().flatten().collect();

        GatherResult {
            term: term.to_string(),
            records,
        }
    }

    /// Gather many terms through at most `workers` concurrent lookups
    ///
    /// Results come back in input order.
    pub async fn gather_many(&self, terms: &[String], workers: usize) -> Vec<GatherResult> {
        stream::iter(terms.iter())
            .map(|term| self.gather(term))
            .buffered(workers.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        id: &'static str,
        value: Option<serde_json::Value>,
    }

    #[async_trait::async_trait]
    impl Provider for Fixed {
        fn source_id(&self) -> &str {
            self.id
        }

        async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
            Ok(self.value.as_ref().map(|v| {
                let mut fields: RawFields = serde_json::from_value(v.clone()).unwrap();
                fields.insert("term".into(), json!(term));
                fields
            }))
        }
    }

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for Failing {
        fn source_id(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _term: &str) -> Result<Option<RawFields>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Timeout("simulated".into()))
        }
    }

    #[tokio::test]
    async fn test_gather_skips_failures_and_keeps_precedence() {
        let failing = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let broker = SourceBroker::new(vec![
            Arc::new(Fixed {
                id: "cosing",
                value: Some(json!({"inci_name": "Butyrospermum Parkii Butter"})),
            }),
            failing.clone(),
            Arc::new(Fixed { id: "empty", value: None }),
            Arc::new(Fixed {
                id: "shop",
                value: Some(json!({"price": 9})),
            }),
        ]);

        let result = broker.gather("Shea Butter").await;
        let order: Vec<_> = result.records.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["cosing", "shop"]);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.get("shop").unwrap()["term"], json!("Shea Butter"));
    }

    #[tokio::test]
    async fn test_gather_many_preserves_input_order() {
        let broker = SourceBroker::new(vec![Arc::new(Fixed {
            id: "cosing",
            value: Some(json!({})),
        })]);
        let terms: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let results = broker.gather_many(&terms, 2).await;
        let returned: Vec<_> = results.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(returned, vec!["a", "b", "c", "d"]);
        assert!(results.iter().all(|r| !r.is_empty()), "term field keeps records non-empty");
    }

    #[tokio::test]
    async fn test_from_config_skips_unavailable_sources() {
        let sources = vec![SourceConfig {
            id: "cosing".into(),
            kind: SourceKind::Extract,
            url: None,
            path: Some("/nonexistent/extract.json".into()),
            timeout_secs: 10,
            min_interval_ms: 0,
            enabled: true,
        }];
        let broker = SourceBroker::from_config(&sources).await;
        assert!(broker.is_empty());
        assert!(broker.gather("Shea Butter").await.is_empty());
    }
}
