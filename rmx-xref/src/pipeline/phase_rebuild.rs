//! Stage 4: REBUILD-SPECS
//!
//! Recomputes every MergedItemForm from source rows. Seed override columns
//! are left as they are.

use super::{Pipeline, Stage, StageSummary};
use crate::merger::SpecMerger;
use crate::store::XrefStore;
use chrono::Utc;
use rmx_common::Result;
use tracing::info;

impl<S: XrefStore> Pipeline<S> {
    pub async fn rebuild_specs(&mut self) -> Result<StageSummary> {
        let started_at = Utc::now();
        let mut summary = StageSummary::new(Stage::RebuildSpecs, self.dry_run);
        let mut batch = self.batch();
        info!("Stage REBUILD-SPECS");

        SpecMerger::new(self.settings.precedence.clone())
            .run(&mut self.store, &mut batch, &mut summary)
            .await?;

        self.complete(batch, summary, started_at).await
    }
}
