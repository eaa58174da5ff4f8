//! Cluster Store
//!
//! Repository seam over the persistent SourceItem → Cluster → Definition
//! graph, the merged output forms and the seed records. Reconciliation code
//! only talks to [`XrefStore`], so the algorithms stay storage-agnostic.
//!
//! Writes accumulate in the current batch until [`XrefStore::commit_batch`];
//! [`XrefStore::rollback_batch`] discards them (dry runs).

mod sqlite;

pub use sqlite::SqliteStore;

use crate::name_parser::ParsedName;
use crate::pipeline::statistics::StageSummary;
use crate::types::{ExtractedSpecs, ItemStatus, RawFields, SpecMap};
use chrono::{DateTime, Utc};
use rmx_common::hash::stable_key;
use rmx_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Case-insensitive term query modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermMatch {
    /// Whole term equal
    Exact,
    /// Stored term starts with the query
    Prefix,
    /// Stored term contains the query
    Substring,
}

impl TermMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermMatch::Exact => "exact",
            TermMatch::Prefix => "prefix",
            TermMatch::Substring => "substring",
        }
    }
}

/// Result of a SourceItem upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Content hash matched; nothing written
    Unchanged,
}

/// One raw provider record for one raw name
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItemRecord {
    /// `stable_key([source, raw_name])`; seeds add their category
    pub id: String,
    pub source: String,
    pub raw_name: String,
    pub content_hash: String,
    pub raw_fields: RawFields,
    /// Parser output; absent until the first reconcile pass
    pub derived: Option<ParsedName>,
    pub derived_specs: ExtractedSpecs,
    pub cluster_id: Option<String>,
    pub definition_id: Option<String>,
    pub status: ItemStatus,
}

/// A group of SourceItems denoting one physical form of a substance
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRecord {
    pub id: String,
    /// `lower(stem)|lower(variation)`
    pub cluster_key: String,
    pub definition_id: Option<String>,
    pub canonical_term: String,
    /// Shown term; differs from `canonical_term` after a collision rename
    pub display_term: String,
    pub variation: String,
    pub physical_form: String,
    /// Empty when no member carries one
    pub common_name: String,
    pub reconciled_term: Option<String>,
    pub reconciled_variation: Option<String>,
    /// Absent ⇒ root
    pub parent_cluster_id: Option<String>,
    pub confidence: f64,
    pub item_count: i64,
    pub sample_item_keys: Vec<String>,
    /// Placeholder base created by derivative linking
    pub synthetic: bool,
}

/// Canonical ingredient identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub id: String,
    pub definition_term: String,
    pub common_name: String,
}

/// Which field families a source contributed to a merged form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub specs: bool,
    pub descriptors: bool,
    pub identifiers: bool,
}

/// Merged output record for one Cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedItemForm {
    pub cluster_id: String,
    pub derived_term: String,
    pub derived_variation: String,
    pub derived_physical_form: String,
    pub merged_specs: SpecMap,
    pub merged_descriptors: SpecMap,
    pub merged_identifiers: SpecMap,
    /// source id → completeness flags
    pub source_coverage: BTreeMap<String, SourceCoverage>,
    /// Curated seed matched to this form, if any
    pub seed_key: Option<String>,
    /// Curated override specs, kept apart from the scraped baseline
    pub seed_specs: Option<SpecMap>,
}

impl MergedItemForm {
    /// Scraped content equality, ignoring the seed override columns
    pub fn same_content(&self, other: &MergedItemForm) -> bool {
        self.derived_term == other.derived_term
            && self.derived_variation == other.derived_variation
            && self.derived_physical_form == other.derived_physical_form
            && self.merged_specs == other.merged_specs
            && self.merged_descriptors == other.merged_descriptors
            && self.merged_identifiers == other.merged_identifiers
            && self.source_coverage == other.source_coverage
    }
}

/// Linkage state of one curated seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub key: String,
    pub category: String,
    pub name: String,
    pub status: ItemStatus,
    pub cluster_id: Option<String>,
    /// Tier that produced the match (`exact`, `prefix`, `substring`)
    pub match_tier: Option<String>,
}

/// Repository interface used by every pipeline stage
#[async_trait::async_trait]
pub trait XrefStore: Send {
    // ---- SourceItems ------------------------------------------------------

    /// Insert or replace a SourceItem under an explicit id
    ///
    /// A record whose content hash is unchanged is left untouched.
    async fn upsert_source_item_with_id(
        &mut self,
        item_id: &str,
        source: &str,
        raw_name: &str,
        fields: &RawFields,
    ) -> Result<UpsertOutcome>;

    /// Insert or replace a SourceItem keyed by `(source, raw_name)`
    async fn upsert_source_item(
        &mut self,
        source: &str,
        raw_name: &str,
        fields: &RawFields,
    ) -> Result<UpsertOutcome> {
        let id = stable_key(&[source, raw_name]);
        self.upsert_source_item_with_id(&id, source, raw_name, fields).await
    }

    /// Delete every SourceItem of a source; returns the number removed
    async fn purge_source(&mut self, source: &str) -> Result<u64>;

    /// All SourceItems in insertion order
    async fn list_source_items(&mut self) -> Result<Vec<SourceItemRecord>>;

    async fn list_items_for_cluster(&mut self, cluster_id: &str) -> Result<Vec<SourceItemRecord>>;

    async fn list_orphan_items(&mut self) -> Result<Vec<SourceItemRecord>>;

    /// Store parser and extractor output; returns true when it changed
    async fn update_item_derivation(
        &mut self,
        item_id: &str,
        parsed: &ParsedName,
        specs: &ExtractedSpecs,
    ) -> Result<bool>;

    /// Set an item's linkage and status
    async fn link_item(
        &mut self,
        item_id: &str,
        cluster_id: Option<&str>,
        definition_id: Option<&str>,
        status: ItemStatus,
    ) -> Result<()>;

    /// Point every item of a cluster at a definition; returns rows touched
    async fn set_items_definition(&mut self, cluster_id: &str, definition_id: &str) -> Result<u64>;

    // ---- Clusters ---------------------------------------------------------

    async fn get_cluster(&mut self, cluster_id: &str) -> Result<Option<ClusterRecord>>;

    async fn find_cluster_by_key(&mut self, cluster_key: &str) -> Result<Option<ClusterRecord>>;

    async fn insert_cluster(&mut self, cluster: &ClusterRecord) -> Result<()>;

    /// Update member-derived columns (form, common name, confidence, counts)
    async fn update_cluster_stats(&mut self, cluster: &ClusterRecord) -> Result<()>;

    /// All clusters in creation order
    async fn list_clusters(&mut self) -> Result<Vec<ClusterRecord>>;

    async fn list_clusters_for_definition(&mut self, definition_id: &str) -> Result<Vec<ClusterRecord>>;

    /// Root clusters whose canonical term matches `term` in the given mode
    async fn find_root_clusters(&mut self, term: &str, mode: TermMatch) -> Result<Vec<ClusterRecord>>;

    /// Set a parent only when none is set yet; returns true when attached
    async fn attach_parent(
        &mut self,
        cluster_id: &str,
        parent_id: &str,
        reconciled_term: &str,
        reconciled_variation: &str,
    ) -> Result<bool>;

    /// Re-home a cluster to a definition with a (possibly renamed) display term
    async fn set_cluster_definition(
        &mut self,
        cluster_id: &str,
        definition_id: &str,
        display_term: &str,
    ) -> Result<()>;

    // ---- Definitions ------------------------------------------------------

    async fn get_definition(&mut self, definition_id: &str) -> Result<Option<DefinitionRecord>>;

    /// Case-insensitive exact lookup on the definition term
    async fn find_definition_by_term(&mut self, term: &str) -> Result<Option<DefinitionRecord>>;

    /// Definitions whose term or common name equals `name` (case-insensitive)
    async fn find_definitions_by_name(&mut self, name: &str) -> Result<Vec<DefinitionRecord>>;

    async fn insert_definition(&mut self, definition: &DefinitionRecord) -> Result<()>;

    async fn set_definition_common_name(&mut self, definition_id: &str, common_name: &str) -> Result<()>;

    /// All definitions in creation order
    async fn list_definitions(&mut self) -> Result<Vec<DefinitionRecord>>;

    // ---- Merged forms -----------------------------------------------------

    async fn get_merged_form(&mut self, cluster_id: &str) -> Result<Option<MergedItemForm>>;

    /// Write the scraped merge columns; seed override columns are preserved
    async fn upsert_merged_form(&mut self, form: &MergedItemForm) -> Result<()>;

    /// Drop the form of a cluster left without members; returns true when one existed
    async fn delete_merged_form(&mut self, cluster_id: &str) -> Result<bool>;

    /// Merged forms whose derived term matches `term` in the given mode
    async fn find_merged_forms(&mut self, term: &str, mode: TermMatch) -> Result<Vec<MergedItemForm>>;

    /// Attach a seed's specs as the override of one merged form
    async fn set_seed_override(&mut self, cluster_id: &str, seed_key: &str, specs: &SpecMap) -> Result<()>;

    /// Remove a seed's override from every form it was attached to
    async fn clear_seed_override(&mut self, seed_key: &str) -> Result<u64>;

    // ---- Seeds ------------------------------------------------------------

    async fn upsert_seed(&mut self, seed: &SeedRecord) -> Result<()>;

    async fn list_seeds(&mut self, status: Option<ItemStatus>) -> Result<Vec<SeedRecord>>;

    // ---- Batches and runs -------------------------------------------------

    /// Persist one stage run's counters
    async fn record_run(&mut self, summary: &StageSummary, started_at: DateTime<Utc>) -> Result<()>;

    /// Commit the writes of the current batch
    async fn commit_batch(&mut self) -> Result<()>;

    /// Discard the writes of the current batch
    async fn rollback_batch(&mut self) -> Result<()>;
}
