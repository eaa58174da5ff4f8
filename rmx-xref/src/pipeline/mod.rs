//! Reconciliation pipeline
//!
//! # Stage Progression
//! INGEST → RECONCILE → SPLIT-CONFLICTS → REBUILD-SPECS → LINK-SEEDS
//!
//! Each stage is handled by a dedicated `phase_*` module, is independently
//! re-runnable and idempotent, and reports a [`StageSummary`]. Writes are
//! committed every `batch_size` records so a crash leaves earlier batches
//! intact; in a dry run nothing is committed and [`Pipeline::finish`] rolls
//! the open batch back.

use crate::reconciler::{self, ForestReport, ReconcileSettings};
use crate::splitter::{self, DefinitionConflict};
use crate::store::{SourceItemRecord, SeedRecord, XrefStore};
use crate::types::ItemStatus;
use chrono::{DateTime, Utc};
use rmx_common::config::TomlConfig;
use rmx_common::Result;
use serde::Serialize;
use tracing::{debug, info};

mod phase_ingest;
mod phase_link_seeds;
mod phase_rebuild;
mod phase_reconcile;
mod phase_split;
pub mod statistics;

pub use phase_ingest::read_terms;
pub use statistics::{Stage, StageSummary};

/// Commits the store every `batch_size` processed records
#[derive(Debug)]
pub struct BatchCommitter {
    batch_size: usize,
    pending: usize,
    committed: usize,
    dry_run: bool,
}

impl BatchCommitter {
    pub fn new(batch_size: usize, dry_run: bool) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: 0,
            committed: 0,
            dry_run,
        }
    }

    /// Count one processed record; commit when the batch is full
    pub async fn tick<S: XrefStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush(store).await?;
        }
        Ok(())
    }

    /// Commit whatever is pending
    pub async fn finish<S: XrefStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        self.flush(store).await
    }

    /// Batches committed so far
    pub fn committed(&self) -> usize {
        self.committed
    }

    async fn flush<S: XrefStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        if self.dry_run {
            self.pending = 0;
            return Ok(());
        }
        store.commit_batch().await?;
        if self.pending > 0 {
            self.committed += 1;
            debug!(records = self.pending, batch = self.committed, "Batch committed");
        }
        self.pending = 0;
        Ok(())
    }
}

/// Tunables shared by the stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Source ids in merge precedence order
    pub precedence: Vec<String>,
    pub batch_size: usize,
    pub workers: usize,
    pub synthetic_confidence: f64,
    pub substring_max_len: usize,
    pub seed_substring_slack: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            precedence: config.source_precedence(),
            batch_size: config.pipeline.batch_size,
            workers: config.pipeline.workers,
            synthetic_confidence: config.pipeline.synthetic_confidence,
            substring_max_len: config.pipeline.substring_max_len,
            seed_substring_slack: config.pipeline.seed_substring_slack,
        }
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            precedence: self.precedence.clone(),
            synthetic_confidence: self.synthetic_confidence,
            substring_max_len: self.substring_max_len,
        }
    }
}

/// Output of the `verify` command
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub forest: ForestReport,
    pub conflicts: Vec<DefinitionConflict>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.forest.is_valid() && self.conflicts.is_empty()
    }
}

/// One orphan SourceItem as listed by the `orphans` command
#[derive(Debug, Clone, Serialize)]
pub struct OrphanItem {
    pub id: String,
    pub source: String,
    pub raw_name: String,
}

impl From<SourceItemRecord> for OrphanItem {
    fn from(item: SourceItemRecord) -> Self {
        Self {
            id: item.id,
            source: item.source,
            raw_name: item.raw_name,
        }
    }
}

/// Output of the `orphans` command
#[derive(Debug, Clone, Serialize)]
pub struct OrphanReport {
    pub items: Vec<OrphanItem>,
    pub seeds: Vec<SeedRecord>,
}

/// Stage runner over one store
pub struct Pipeline<S: XrefStore> {
    store: S,
    settings: PipelineSettings,
    dry_run: bool,
}

impl<S: XrefStore> Pipeline<S> {
    pub fn new(store: S, settings: PipelineSettings, dry_run: bool) -> Self {
        Self {
            store,
            settings,
            dry_run,
        }
    }

    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    fn batch(&self) -> BatchCommitter {
        BatchCommitter::new(self.settings.batch_size, self.dry_run)
    }

    /// Commit the last batch, record the run and log the summary
    async fn complete(
        &mut self,
        mut batch: BatchCommitter,
        summary: StageSummary,
        started_at: DateTime<Utc>,
    ) -> Result<StageSummary> {
        batch.finish(&mut self.store).await?;
        if !self.dry_run {
            self.store.record_run(&summary, started_at).await?;
            self.store.commit_batch().await?;
        }
        info!(
            batches = batch.committed(),
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "{}",
            summary.display_string()
        );
        Ok(summary)
    }

    /// Forest invariant and definition common-name agreement
    pub async fn verify(&mut self) -> Result<VerifyReport> {
        let forest = reconciler::verify_forest(&mut self.store).await?;
        let conflicts = splitter::find_conflicts(&mut self.store).await?;
        Ok(VerifyReport { forest, conflicts })
    }

    /// Orphan SourceItems and orphan seeds for manual follow-up
    pub async fn orphans(&mut self) -> Result<OrphanReport> {
        let items = self
            .store
            .list_orphan_items()
            .await?
            .into_iter()
            .map(OrphanItem::from)
            .collect();
        let seeds = self.store.list_seeds(Some(ItemStatus::Orphan)).await?;
        Ok(OrphanReport { items, seeds })
    }

    /// End the run: roll back in a dry run, otherwise commit
    pub async fn finish(mut self) -> Result<S> {
        if self.dry_run {
            self.store.rollback_batch().await?;
            info!("Dry run: all changes rolled back");
        } else {
            self.store.commit_batch().await?;
        }
        Ok(self.store)
    }
}
