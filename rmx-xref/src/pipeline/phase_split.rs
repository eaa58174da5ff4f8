//! Stage 3: SPLIT-CONFLICTS

use super::{Pipeline, Stage, StageSummary};
use crate::splitter::ConflictSplitter;
use crate::store::XrefStore;
use chrono::Utc;
use rmx_common::Result;
use tracing::info;

impl<S: XrefStore> Pipeline<S> {
    /// Re-home minority-named clusters until every definition agrees
    pub async fn split_conflicts(&mut self) -> Result<StageSummary> {
        let started_at = Utc::now();
        let mut summary = StageSummary::new(Stage::SplitConflicts, self.dry_run);
        let mut batch = self.batch();
        info!("Stage SPLIT-CONFLICTS");

        ConflictSplitter::new()
            .run(&mut self.store, &mut batch, &mut summary)
            .await?;

        self.complete(batch, summary, started_at).await
    }
}
