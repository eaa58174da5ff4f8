//! Stage 5: LINK-SEEDS
//!
//! Attaches curated seed specs to merged forms as overrides. Orphan seeds
//! are persisted for follow-up.

use super::{Pipeline, Stage, StageSummary};
use crate::seed_linker::SeedLinker;
use crate::seeds::Seed;
use crate::store::XrefStore;
use chrono::Utc;
use rmx_common::Result;
use tracing::info;

impl<S: XrefStore> Pipeline<S> {
    pub async fn link_seeds(&mut self, seeds: &[Seed]) -> Result<StageSummary> {
        let started_at = Utc::now();
        let mut summary = StageSummary::new(Stage::LinkSeeds, self.dry_run);
        let mut batch = self.batch();
        info!(seeds = seeds.len(), "Stage LINK-SEEDS");

        SeedLinker::new(self.settings.seed_substring_slack)
            .run(&mut self.store, seeds, &mut batch, &mut summary)
            .await?;

        self.complete(batch, summary, started_at).await
    }

    /// Every stage in order
    pub async fn run_all(
        &mut self,
        broker: &crate::broker::SourceBroker,
        terms: &[String],
        seeds: &[Seed],
        refresh: bool,
    ) -> Result<Vec<StageSummary>> {
        Ok(vec![
            self.ingest(broker, terms, seeds, refresh).await?,
            self.reconcile().await?,
            self.split_conflicts().await?,
            self.rebuild_specs().await?,
            self.link_seeds(seeds).await?,
        ])
    }
}
