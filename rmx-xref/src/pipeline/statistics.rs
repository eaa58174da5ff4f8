//! Per-stage summary counters
//!
//! Expected-rate outcomes (garbage, ambiguous parses, no-match) are counted
//! here instead of being raised as errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Ingest,
    Reconcile,
    SplitConflicts,
    RebuildSpecs,
    LinkSeeds,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Reconcile => "reconcile",
            Stage::SplitConflicts => "split-conflicts",
            Stage::RebuildSpecs => "rebuild-specs",
            Stage::LinkSeeds => "link-seeds",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters reported by every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    /// Records examined
    pub processed: u64,
    /// Records linked/attached/split/matched
    pub matched: u64,
    /// Records left unmatched
    pub orphaned: u64,
    /// Records whose stored state changed
    pub changed: u64,
    /// Records skipped (already linked, unchanged, no data)
    pub skipped: u64,
    /// True when nothing was committed
    pub dry_run: bool,
}

impl StageSummary {
    pub fn new(stage: Stage, dry_run: bool) -> Self {
        Self {
            stage,
            processed: 0,
            matched: 0,
            orphaned: 0,
            changed: 0,
            skipped: 0,
            dry_run,
        }
    }

    /// One-line summary for logs
    pub fn display_string(&self) -> String {
        format!(
            "{}: processed={} matched={} orphaned={} changed={} skipped={}{}",
            self.stage,
            self.processed,
            self.matched,
            self.orphaned,
            self.changed,
            self.skipped,
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}
