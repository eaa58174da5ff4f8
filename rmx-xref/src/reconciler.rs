//! Cluster Reconciler
//!
//! Two passes over the store:
//!
//! 1. **Clustering**: re-derive every SourceItem from its raw fields (parser,
//!    extractor, garbage filter), group items by cluster key, create missing
//!    Clusters/Definitions and link the items.
//! 2. **Derivative linking**: resolve each unlinked root Cluster with the
//!    Derivative Resolver and attach it to an existing root parent, or to a
//!    synthetic base Cluster created for the purpose.
//!
//! A cluster whose key received no items in pass 1 keeps its identity but
//! has its member statistics cleared.
//!
//! Both passes are idempotent: an existing Cluster keeps its Definition and a
//! parent pointer is only ever set on a cluster that has none.

use crate::derivative::{self, Derivation};
use crate::lexicon::COMPOUND_SUFFIXES;
use crate::name_parser::{self, cluster_key, ParsedName};
use crate::pipeline::statistics::StageSummary;
use crate::pipeline::BatchCommitter;
use crate::spec_extractor;
use crate::store::{ClusterRecord, DefinitionRecord, SourceItemRecord, TermMatch, XrefStore};
use crate::types::{ExtractedSpecs, ItemStatus};
use rmx_common::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confidence multiplier when any member parse was ambiguous
const AMBIGUITY_PENALTY: f64 = 0.7;

/// Member ids kept on a cluster for inspection
const SAMPLE_KEYS: usize = 5;

/// Minimum base length for a substring parent match
const MIN_SUBSTRING_BASE: usize = 4;

/// Reconciler tunables
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Source ids in merge precedence order
    pub precedence: Vec<String>,
    pub synthetic_confidence: f64,
    /// Longest canonical term eligible for a substring parent match
    pub substring_max_len: usize,
}

/// One SourceItem with its fresh derivation
struct Member {
    item: SourceItemRecord,
    parsed: ParsedName,
    specs: ExtractedSpecs,
}

/// Position of a source in the precedence list; unknown sources sort last
pub fn precedence_rank(precedence: &[String], source: &str) -> usize {
    precedence
        .iter()
        .position(|s| s.eq_ignore_ascii_case(source))
        .unwrap_or(precedence.len())
}

/// Name a raw record was gathered under
pub fn item_name(item: &SourceItemRecord) -> String {
    item.raw_fields
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&item.raw_name)
        .to_string()
}

fn explicit_form(item: &SourceItemRecord) -> Option<&str> {
    item.raw_fields
        .get("physical_form")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

pub struct Reconciler {
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(settings: ReconcileSettings) -> Self {
        Self { settings }
    }

    /// Run both passes
    pub async fn run<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        self.cluster_items(store, batch, summary).await?;
        self.link_derivatives(store, batch, summary).await?;
        Ok(())
    }

    /// Pass 1: derive, group, create clusters and link items
    pub async fn cluster_items<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        let items = store.list_source_items().await?;
        info!(items = items.len(), "Reconciling source items");

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Member>> = HashMap::new();

        for item in items {
            summary.processed += 1;
            let name = item_name(&item);
            let parsed = name_parser::parse(&name, explicit_form(&item));
            let specs = spec_extractor::extract(&item.raw_fields);

            if store.update_item_derivation(&item.id, &parsed, &specs).await? {
                summary.changed += 1;
            }

            if parsed.stem.trim().is_empty() {
                warn!(item = %item.id, source = %item.source, "Item has no usable name, left orphan");
                store.link_item(&item.id, None, None, ItemStatus::Orphan).await?;
                summary.orphaned += 1;
                batch.tick(store).await?;
                continue;
            }

            if parsed.ambiguous {
                debug!(raw_name = %name, term = %parsed.term, "Ambiguous parse recorded");
            }

            let key = parsed.cluster_key();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(Member { item, parsed, specs });
            batch.tick(store).await?;
        }

        let seen: HashSet<String> = order.iter().cloned().collect();
        for key in order {
            let Some(mut members) = groups.remove(&key) else {
                continue;
            };
            members.sort_by(|a, b| {
                precedence_rank(&self.settings.precedence, &a.item.source)
                    .cmp(&precedence_rank(&self.settings.precedence, &b.item.source))
                    .then_with(|| a.item.raw_name.cmp(&b.item.raw_name))
            });

            let cluster = self.ensure_cluster(store, &key, &members, summary).await?;

            for member in &members {
                store
                    .link_item(
                        &member.item.id,
                        Some(&cluster.id),
                        cluster.definition_id.as_deref(),
                        ItemStatus::Linked,
                    )
                    .await?;
                summary.matched += 1;
            }
            batch.tick(store).await?;
        }

        self.clear_emptied(store, &seen, batch, summary).await
    }

    /// Zero the statistics of clusters that no longer receive any item
    async fn clear_emptied<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        seen: &HashSet<String>,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        for mut cluster in store.list_clusters().await? {
            if cluster.synthetic || seen.contains(&cluster.cluster_key) {
                continue;
            }
            if cluster.item_count == 0
                && cluster.common_name.is_empty()
                && cluster.sample_item_keys.is_empty()
            {
                continue;
            }
            info!(cluster = %cluster.canonical_term, "Cluster lost its members");
            cluster.item_count = 0;
            cluster.common_name.clear();
            cluster.sample_item_keys.clear();
            cluster.confidence = 0.0;
            store.update_cluster_stats(&cluster).await?;
            summary.changed += 1;
            batch.tick(store).await?;
        }
        Ok(())
    }

    /// Find or create the cluster for a key and refresh its member statistics
    async fn ensure_cluster<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        key: &str,
        members: &[Member],
        summary: &mut StageSummary,
    ) -> Result<ClusterRecord> {
        let lead = &members[0].parsed;
        let (physical_form, confidence) = form_consensus(members);
        let common_name = members
            .iter()
            .find_map(|m| m.specs.common_name())
            .unwrap_or_default()
            .to_string();
        let sample_item_keys: Vec<String> = members
            .iter()
            .take(SAMPLE_KEYS)
            .map(|m| m.item.id.clone())
            .collect();

        match store.find_cluster_by_key(key).await? {
            Some(mut cluster) => {
                if cluster.definition_id.is_none() {
                    let definition = ensure_definition(store, &lead.term).await?;
                    store
                        .set_cluster_definition(&cluster.id, &definition.id, &cluster.display_term)
                        .await?;
                    cluster.definition_id = Some(definition.id);
                }
                cluster.physical_form = physical_form;
                cluster.common_name = common_name;
                cluster.confidence = confidence;
                cluster.item_count = members.len() as i64;
                cluster.sample_item_keys = sample_item_keys;
                cluster.synthetic = false;
                store.update_cluster_stats(&cluster).await?;
                Ok(cluster)
            }
            None => {
                let definition = ensure_definition(store, &lead.term).await?;
                let cluster = ClusterRecord {
                    id: Uuid::new_v4().to_string(),
                    cluster_key: key.to_string(),
                    definition_id: Some(definition.id),
                    canonical_term: lead.stem.clone(),
                    display_term: lead.stem.clone(),
                    variation: lead.variation.clone(),
                    physical_form,
                    common_name,
                    reconciled_term: None,
                    reconciled_variation: None,
                    parent_cluster_id: None,
                    confidence,
                    item_count: members.len() as i64,
                    sample_item_keys,
                    synthetic: false,
                };
                store.insert_cluster(&cluster).await?;
                summary.changed += 1;
                debug!(cluster = %cluster.canonical_term, key = %key, "Created cluster");
                Ok(cluster)
            }
        }
    }

    /// Pass 2: attach derivative root clusters to their base
    pub async fn link_derivatives<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        let clusters = store.list_clusters().await?;
        let bound = clusters.len() + 1;

        for cluster in clusters {
            if cluster.synthetic {
                continue;
            }
            // Re-read: an earlier attachment in this run may have linked it
            let Some(current) = store.get_cluster(&cluster.id).await? else {
                continue;
            };
            if current.parent_cluster_id.is_some() {
                summary.skipped += 1;
                continue;
            }

            let Some(derivation) = derivative::resolve(&current.canonical_term) else {
                continue;
            };

            let parent = match self.find_parent(store, &derivation.base_term, &current.id).await? {
                Some(parent) => parent,
                None => self.ensure_synthetic_base(store, &derivation, summary).await?,
            };

            if would_cycle(store, &current.id, &parent.id, bound).await? {
                warn!(
                    cluster = %current.canonical_term,
                    parent = %parent.canonical_term,
                    "Attachment would create a cycle, skipped"
                );
                summary.skipped += 1;
                continue;
            }

            if store
                .attach_parent(&current.id, &parent.id, &derivation.base_term, &derivation.variation)
                .await?
            {
                info!(
                    cluster = %current.canonical_term,
                    parent = %parent.canonical_term,
                    variation = %derivation.variation,
                    "Attached derivative"
                );
                summary.changed += 1;
            }
            batch.tick(store).await?;
        }

        Ok(())
    }

    /// Existing root parent for a base term
    ///
    /// Exact match first, then "base + form" compounds, then a bounded
    /// substring match on short canonical terms. Derivative-looking terms
    /// are never chosen as parents.
    pub async fn find_parent<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        base: &str,
        exclude_id: &str,
    ) -> Result<Option<ClusterRecord>> {
        let eligible =
            |c: &ClusterRecord| c.id != exclude_id && !derivative::is_candidate(&c.canonical_term);

        if let Some(hit) = store
            .find_root_clusters(base, TermMatch::Exact)
            .await?
            .into_iter()
            .find(|c| eligible(c))
        {
            return Ok(Some(hit));
        }

        for suffix in COMPOUND_SUFFIXES {
            let compound = format!("{} {}", base, suffix);
            if let Some(hit) = store
                .find_root_clusters(&compound, TermMatch::Exact)
                .await?
                .into_iter()
                .find(|c| eligible(c))
            {
                return Ok(Some(hit));
            }
        }

        if base.chars().count() < MIN_SUBSTRING_BASE {
            return Ok(None);
        }

        let hit = store
            .find_root_clusters(base, TermMatch::Substring)
            .await?
            .into_iter()
            .filter(|c| c.canonical_term.chars().count() <= self.settings.substring_max_len)
            .find(|c| eligible(c));
        Ok(hit)
    }

    /// Synthetic placeholder cluster for a base no source describes directly
    async fn ensure_synthetic_base<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        derivation: &Derivation,
        summary: &mut StageSummary,
    ) -> Result<ClusterRecord> {
        let key = cluster_key(&derivation.base_term, "");
        if let Some(existing) = store.find_cluster_by_key(&key).await? {
            return Ok(existing);
        }

        let definition = ensure_definition(store, &derivation.base_term).await?;
        let cluster = ClusterRecord {
            id: Uuid::new_v4().to_string(),
            cluster_key: key,
            definition_id: Some(definition.id),
            canonical_term: derivation.base_term.clone(),
            display_term: derivation.base_term.clone(),
            variation: String::new(),
            physical_form: String::new(),
            common_name: String::new(),
            reconciled_term: None,
            reconciled_variation: None,
            parent_cluster_id: None,
            confidence: self.settings.synthetic_confidence,
            item_count: 0,
            sample_item_keys: Vec::new(),
            synthetic: true,
        };
        store.insert_cluster(&cluster).await?;
        summary.changed += 1;
        info!(base = %cluster.canonical_term, "Created synthetic base cluster");
        Ok(cluster)
    }
}

/// Definition for a term, created when missing
pub async fn ensure_definition<S: XrefStore + ?Sized>(
    store: &mut S,
    term: &str,
) -> Result<DefinitionRecord> {
    if let Some(existing) = store.find_definition_by_term(term).await? {
        return Ok(existing);
    }
    let definition = DefinitionRecord {
        id: Uuid::new_v4().to_string(),
        definition_term: term.to_string(),
        common_name: String::new(),
    };
    store.insert_definition(&definition).await?;
    Ok(definition)
}

/// Majority physical form (first-seen tie-break) and its confidence
fn form_consensus(members: &[Member]) -> (String, f64) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for member in members {
        let form = member.parsed.physical_form.clone();
        match counts.iter_mut().find(|(f, _)| f.eq_ignore_ascii_case(&form)) {
            Some((_, n)) => *n += 1,
            None => counts.push((form, 1)),
        }
    }

    let mut best: Option<&(String, usize)> = None;
    for entry in &counts {
        if best.map(|b| entry.1 > b.1).unwrap_or(true) {
            best = Some(entry);
        }
    }

    let (form, agreeing) = best.cloned().unwrap_or_default();
    let mut confidence = if members.is_empty() {
        0.0
    } else {
        agreeing as f64 / members.len() as f64
    };
    if members.iter().any(|m| m.parsed.ambiguous) {
        confidence *= AMBIGUITY_PENALTY;
    }
    (form, confidence)
}

/// Whether making `parent_id` the parent of `cluster_id` closes a loop
async fn would_cycle<S: XrefStore + ?Sized>(
    store: &mut S,
    cluster_id: &str,
    parent_id: &str,
    bound: usize,
) -> Result<bool> {
    let mut cursor = Some(parent_id.to_string());
    let mut steps = 0;
    while let Some(id) = cursor {
        if id == cluster_id {
            return Ok(true);
        }
        steps += 1;
        if steps > bound {
            return Ok(true);
        }
        cursor = store.get_cluster(&id).await?.and_then(|c| c.parent_cluster_id);
    }
    Ok(false)
}

/// Result of a forest invariant check
#[derive(Debug, Clone, Default, Serialize)]
pub struct ForestReport {
    pub clusters: usize,
    pub roots: usize,
    pub max_depth: usize,
    /// One message per violating cluster
    pub violations: Vec<String>,
}

impl ForestReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check that parent links form a forest
///
/// Following parent links from any cluster must terminate within the total
/// cluster count and never reach a missing cluster.
pub async fn verify_forest<S: XrefStore + ?Sized>(store: &mut S) -> Result<ForestReport> {
    let clusters = store.list_clusters().await?;
    let parents: HashMap<&str, Option<&str>> = clusters
        .iter()
        .map(|c| (c.id.as_str(), c.parent_cluster_id.as_deref()))
        .collect();

    let mut report = ForestReport {
        clusters: clusters.len(),
        ..Default::default()
    };

    for cluster in &clusters {
        if cluster.parent_cluster_id.is_none() {
            report.roots += 1;
        }

        let mut depth = 0;
        let mut cursor = cluster.parent_cluster_id.as_deref();
        while let Some(id) = cursor {
            depth += 1;
            if depth > clusters.len() {
                report
                    .violations
                    .push(format!("cycle through cluster {} ({})", cluster.id, cluster.canonical_term));
                break;
            }
            match parents.get(id) {
                Some(next) => cursor = *next,
                None => {
                    report.violations.push(format!(
                        "cluster {} ({}) has missing parent {}",
                        cluster.id, cluster.canonical_term, id
                    ));
                    break;
                }
            }
        }
        report.max_depth = report.max_depth.max(depth);
    }

    Ok(report)
}
