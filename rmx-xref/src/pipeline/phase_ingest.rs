//! Stage 1: INGEST
//!
//! Gathers raw records for every term from the Source Broker and upserts
//! them as SourceItems. Curated seeds are ingested as records of the `seed`
//! source so each one yields a cluster even when no provider knows it.
//! Content-hash change detection makes a re-ingest of identical data a no-op.

use super::{Pipeline, Stage, StageSummary};
use crate::broker::SourceBroker;
use crate::seeds::Seed;
use crate::store::{UpsertOutcome, XrefStore};
use crate::types::RawFields;
use chrono::Utc;
use rmx_common::config::SEED_SOURCE_ID;
use rmx_common::Result;
use tracing::{debug, info, warn};

/// Name a gathered record is stored under
fn record_name(term: &str, fields: &RawFields) -> String {
    fields
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(term)
        .to_string()
}

fn count(summary: &mut StageSummary, outcome: UpsertOutcome) {
    match outcome {
        UpsertOutcome::Inserted | UpsertOutcome::Updated => {
            summary.matched += 1;
            summary.changed += 1;
        }
        UpsertOutcome::Unchanged => summary.skipped += 1,
    }
}

impl<S: XrefStore> Pipeline<S> {
    /// Ingest provider records for `terms` plus the curated `seeds`
    ///
    /// With `refresh`, every source being ingested is purged once the
    /// lookups are done, before the upserts.
    pub async fn ingest(
        &mut self,
        broker: &SourceBroker,
        terms: &[String],
        seeds: &[Seed],
        refresh: bool,
    ) -> Result<StageSummary> {
        let started_at = Utc::now();
        let mut summary = StageSummary::new(Stage::Ingest, self.dry_run);
        let mut batch = self.batch();

        info!(
            terms = terms.len(),
            seeds = seeds.len(),
            providers = broker.len(),
            "Stage INGEST"
        );

        // Lookups run before the first write opens the batch transaction
        let results = broker.gather_many(terms, self.settings.workers).await;

        if refresh {
            let mut sources = broker.source_ids();
            if !seeds.is_empty() {
                sources.push(SEED_SOURCE_ID.to_string());
            }
            for source in sources {
                let purged = self.store.purge_source(&source).await?;
                info!(source = %source, purged = purged, "Purged source before refresh");
            }
        }

        for result in results {
            if result.is_empty() {
                warn!(term = %result.term, "No provider returned data");
                summary.orphaned += 1;
                continue;
            }
            for (source, fields) in &result.records {
                summary.processed += 1;
                let name = record_name(&result.term, fields);
                let outcome = self.store.upsert_source_item(source, &name, fields).await?;
                debug!(source = %source, name = %name, outcome = ?outcome, "Source record");
                count(&mut summary, outcome);
                batch.tick(&mut self.store).await?;
            }
        }

        for seed in seeds {
            summary.processed += 1;
            let outcome = self
                .store
                .upsert_source_item_with_id(
                    &seed.source_item_id(),
                    SEED_SOURCE_ID,
                    seed.name(),
                    &seed.raw_fields(),
                )
                .await?;
            count(&mut summary, outcome);
            batch.tick(&mut self.store).await?;
        }

        self.complete(batch, summary, started_at).await
    }
}

/// Read a terms file: one term per line, blanks and `#` comments ignored
pub fn read_terms(content: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for line in content.lines() {
        let term = line.trim();
        if term.is_empty() || term.starts_with('#') {
            continue;
        }
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
            terms.push(term.to_string());
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_terms_skips_comments_and_duplicates() {
        let terms = read_terms("# butters\nShea Butter\n\n  cocoa butter \nSHEA BUTTER\n");
        assert_eq!(terms, vec!["Shea Butter", "cocoa butter"]);
    }

    #[test]
    fn test_record_name_prefers_name_field() {
        let fields: RawFields = serde_json::from_value(json!({"name": "Shea Butter, Refined"})).unwrap();
        assert_eq!(record_name("shea", &fields), "Shea Butter, Refined");
        assert_eq!(record_name("shea", &RawFields::new()), "shea");
    }
}
