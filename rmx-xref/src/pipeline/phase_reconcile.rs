//! Stage 2: RECONCILE
//!
//! Re-derives SourceItems, builds Clusters/Definitions and links derivatives.

use super::{Pipeline, Stage, StageSummary};
use crate::reconciler::Reconciler;
use crate::store::XrefStore;
use chrono::Utc;
use rmx_common::Result;
use tracing::info;

impl<S: XrefStore> Pipeline<S> {
    pub async fn reconcile(&mut self) -> Result<StageSummary> {
        let started_at = Utc::now();
        let mut summary = StageSummary::new(Stage::Reconcile, self.dry_run);
        let mut batch = self.batch();
        info!("Stage RECONCILE");

        Reconciler::new(self.settings.reconcile_settings())
            .run(&mut self.store, &mut batch, &mut summary)
            .await?;

        self.complete(batch, summary, started_at).await
    }
}
