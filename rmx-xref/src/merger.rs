//! Spec Merger
//!
//! Rebuilds one MergedItemForm per Cluster from its member SourceItems.
//! Members are visited in source precedence order; a field keeps the first
//! non-empty, non-garbage value, so lower-precedence sources only fill gaps.
//! Forms are recomputed from the source rows on every run; a cluster left
//! without members loses its form.
//!
//! Seed rows only report coverage here. Their values reach a form as the
//! separate override written by the Seed Linker.

use crate::garbage;
use crate::pipeline::statistics::StageSummary;
use crate::pipeline::BatchCommitter;
use crate::reconciler::precedence_rank;
use crate::store::{ClusterRecord, MergedItemForm, SourceCoverage, SourceItemRecord, XrefStore};
use crate::types::SpecMap;
use rmx_common::config::SEED_SOURCE_ID;
use rmx_common::Result;
use tracing::{debug, info};

/// Fill gaps in `merged` from `incoming`
///
/// An existing value survives unless it is empty or garbage; incoming values
/// that are themselves empty or garbage never enter.
pub fn merge_family(merged: &mut SpecMap, incoming: &SpecMap) {
    for (field, value) in incoming {
        if value.is_empty() || garbage::is_garbage(field, value) {
            continue;
        }
        let replace = match merged.get(field) {
            None => true,
            Some(existing) => existing.is_empty() || garbage::is_garbage(field, existing),
        };
        if replace {
            merged.insert(field.clone(), value.clone());
        }
    }
}

/// Merge a cluster's members into a fresh form
pub fn merge_cluster(
    cluster: &ClusterRecord,
    members: &[SourceItemRecord],
    precedence: &[String],
) -> MergedItemForm {
    let mut ordered: Vec<&SourceItemRecord> = members.iter().collect();
    ordered.sort_by(|a, b| {
        precedence_rank(precedence, &a.source)
            .cmp(&precedence_rank(precedence, &b.source))
            .then_with(|| a.raw_name.cmp(&b.raw_name))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut form = MergedItemForm {
        cluster_id: cluster.id.clone(),
        derived_term: cluster.canonical_term.clone(),
        derived_variation: cluster.variation.clone(),
        derived_physical_form: cluster.physical_form.clone(),
        ..Default::default()
    };

    for item in ordered {
        let specs = &item.derived_specs;
        if !item.source.eq_ignore_ascii_case(SEED_SOURCE_ID) {
            merge_family(&mut form.merged_specs, &specs.specs);
            merge_family(&mut form.merged_descriptors, &specs.descriptors);
            merge_family(&mut form.merged_identifiers, &specs.identifiers);
        }

        let coverage = form.source_coverage.entry(item.source.clone()).or_default();
        *coverage = SourceCoverage {
            specs: coverage.specs || !specs.specs.is_empty(),
            descriptors: coverage.descriptors || !specs.descriptors.is_empty(),
            identifiers: coverage.identifiers || !specs.identifiers.is_empty(),
        };
    }

    form
}

pub struct SpecMerger {
    precedence: Vec<String>,
}

impl SpecMerger {
    pub fn new(precedence: Vec<String>) -> Self {
        Self { precedence }
    }

    pub async fn run<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        let clusters = store.list_clusters().await?;
        info!(clusters = clusters.len(), "Rebuilding merged forms");

        for cluster in clusters {
            summary.processed += 1;
            let members = store.list_items_for_cluster(&cluster.id).await?;
            if members.is_empty() {
                summary.skipped += 1;
                if store.delete_merged_form(&cluster.id).await? {
                    info!(cluster = %cluster.canonical_term, "Cluster lost its members, merged form removed");
                    summary.changed += 1;
                    batch.tick(store).await?;
                } else {
                    debug!(cluster = %cluster.canonical_term, synthetic = cluster.synthetic, "No members, skipped");
                }
                continue;
            }

            let form = merge_cluster(&cluster, &members, &self.precedence);
            summary.matched += 1;

            let unchanged = store
                .get_merged_form(&cluster.id)
                .await?
                .map(|existing| existing.same_content(&form))
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            store.upsert_merged_form(&form).await?;
            summary.changed += 1;
            debug!(
                cluster = %cluster.canonical_term,
                specs = form.merged_specs.len(),
                sources = form.source_coverage.len(),
                "Merged form written"
            );
            batch.tick(store).await?;
        }

        Ok(())
    }
}
