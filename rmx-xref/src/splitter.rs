//! Conflict Splitter
//!
//! Clusters under one Definition should agree on a common name. For every
//! Definition whose Clusters carry more than one distinct non-empty common
//! name, the majority name (first-seen tie-break) stays and each
//! minority-named Cluster is re-homed to a consistent existing Definition or
//! a new one. A re-run with no remaining conflicts performs zero splits.

use crate::pipeline::statistics::StageSummary;
use crate::pipeline::BatchCommitter;
use crate::store::{ClusterRecord, DefinitionRecord, XrefStore};
use rmx_common::Result;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Distinct non-empty common names in first-seen order with their counts
pub fn name_tally(clusters: &[ClusterRecord]) -> Vec<(String, usize)> {
    let mut tally: Vec<(String, usize)> = Vec::new();
    for cluster in clusters {
        let name = cluster.common_name.trim();
        if name.is_empty() {
            continue;
        }
        match tally.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, count)) => *count += 1,
            None => tally.push((name.to_string(), 1)),
        }
    }
    tally
}

/// Most frequent name; ties go to the name seen first
pub fn majority_name(tally: &[(String, usize)]) -> Option<&str> {
    let mut best: Option<&(String, usize)> = None;
    for entry in tally {
        if best.map(|b| entry.1 > b.1).unwrap_or(true) {
            best = Some(entry);
        }
    }
    best.map(|(name, _)| name.as_str())
}

/// A Definition whose Clusters disagree on common name
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionConflict {
    pub definition_id: String,
    pub definition_term: String,
    pub names: Vec<String>,
}

/// Definitions currently violating common-name agreement
pub async fn find_conflicts<S: XrefStore + ?Sized>(store: &mut S) -> Result<Vec<DefinitionConflict>> {
    let mut conflicts = Vec::new();
    for definition in store.list_definitions().await? {
        let clusters = store.list_clusters_for_definition(&definition.id).await?;
        let tally = name_tally(&clusters);
        if tally.len() > 1 {
            conflicts.push(DefinitionConflict {
                definition_id: definition.id,
                definition_term: definition.definition_term,
                names: tally.into_iter().map(|(n, _)| n).collect(),
            });
        }
    }
    Ok(conflicts)
}

#[derive(Debug, Default)]
pub struct ConflictSplitter;

impl ConflictSplitter {
    pub fn new() -> Self {
        Self
    }

    pub async fn run<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        let definitions = store.list_definitions().await?;
        info!(definitions = definitions.len(), "Scanning definitions for name conflicts");

        for definition in definitions {
            summary.processed += 1;
            let clusters = store.list_clusters_for_definition(&definition.id).await?;
            let tally = name_tally(&clusters);

            let Some(majority) = majority_name(&tally).map(str::to_string) else {
                summary.skipped += 1;
                continue;
            };

            if definition.common_name != majority {
                store.set_definition_common_name(&definition.id, &majority).await?;
                summary.changed += 1;
            }

            if tally.len() == 1 {
                summary.skipped += 1;
                batch.tick(store).await?;
                continue;
            }

            info!(
                definition = %definition.definition_term,
                majority = %majority,
                names = tally.len(),
                "Splitting conflicting definition"
            );

            for cluster in &clusters {
                let name = cluster.common_name.trim();
                if name.is_empty() || name.eq_ignore_ascii_case(&majority) {
                    continue;
                }
                self.rehome(store, cluster, name, &definition.id).await?;
                summary.matched += 1;
                summary.changed += 1;
            }
            batch.tick(store).await?;
        }

        Ok(())
    }

    /// Move one minority-named cluster out of `from_definition`
    async fn rehome<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        cluster: &ClusterRecord,
        name: &str,
        from_definition: &str,
    ) -> Result<()> {
        let target = match self.consistent_definition(store, name, from_definition).await? {
            Some(existing) => existing,
            None => {
                let definition = DefinitionRecord {
                    id: Uuid::new_v4().to_string(),
                    definition_term: name.to_string(),
                    common_name: name.to_string(),
                };
                store.insert_definition(&definition).await?;
                definition
            }
        };

        let collides = store
            .list_clusters_for_definition(&target.id)
            .await?
            .iter()
            .any(|c| {
                c.id != cluster.id
                    && c.canonical_term.eq_ignore_ascii_case(&cluster.canonical_term)
                    && c.variation.eq_ignore_ascii_case(&cluster.variation)
            });
        let display_term = if collides {
            format!("{} ({})", cluster.canonical_term, name)
        } else {
            cluster.display_term.clone()
        };

        store
            .set_cluster_definition(&cluster.id, &target.id, &display_term)
            .await?;
        let items = store.set_items_definition(&cluster.id, &target.id).await?;

        debug!(
            cluster = %cluster.canonical_term,
            target = %target.definition_term,
            display = %display_term,
            items = items,
            "Re-homed cluster"
        );
        Ok(())
    }

    /// Existing definition named `name` whose clusters all agree on it
    async fn consistent_definition<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        name: &str,
        exclude_id: &str,
    ) -> Result<Option<DefinitionRecord>> {
        for candidate in store.find_definitions_by_name(name).await? {
            if candidate.id == exclude_id {
                continue;
            }
            let clusters = store.list_clusters_for_definition(&candidate.id).await?;
            let agrees = clusters.iter().all(|c| {
                let n = c.common_name.trim();
                n.is_empty() || n.eq_ignore_ascii_case(name)
            });
            if agrees {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::statistics::Stage;
    use crate::store::SqliteStore;
    use rmx_common::db::init_memory_database;

    fn cluster(id: &str, term: &str, definition: &str, common_name: &str) -> ClusterRecord {
        ClusterRecord {
            id: id.to_string(),
            cluster_key: format!("{}|{}", term.to_lowercase(), id),
            definition_id: Some(definition.to_string()),
            canonical_term: term.to_string(),
            display_term: term.to_string(),
            variation: String::new(),
            physical_form: String::new(),
            common_name: common_name.to_string(),
            reconciled_term: None,
            reconciled_variation: None,
            parent_cluster_id: None,
            confidence: 1.0,
            item_count: 1,
            sample_item_keys: vec![],
            synthetic: false,
        }
    }

    fn definition(id: &str, term: &str) -> DefinitionRecord {
        DefinitionRecord {
            id: id.to_string(),
            definition_term: term.to_string(),
            common_name: String::new(),
        }
    }

    async fn split(store: &mut SqliteStore) -> StageSummary {
        let mut summary = StageSummary::new(Stage::SplitConflicts, false);
        let mut batch = BatchCommitter::new(50, false);
        ConflictSplitter::new()
            .run(store, &mut batch, &mut summary)
            .await
            .unwrap();
        batch.finish(store).await.unwrap();
        summary
    }

    #[test]
    fn test_majority_first_seen_tie_break() {
        let tally = vec![("Cocoa Butter".to_string(), 2), ("Cacao".to_string(), 2)];
        assert_eq!(majority_name(&tally), Some("Cocoa Butter"));
        let tally = vec![("A".to_string(), 1), ("B".to_string(), 3)];
        assert_eq!(majority_name(&tally), Some("B"));
        assert_eq!(majority_name(&[]), None);
    }

    #[test]
    fn test_tally_ignores_blank_and_case() {
        let clusters = vec![
            cluster("a", "x", "d", "Shea Butter"),
            cluster("b", "x", "d", ""),
            cluster("c", "x", "d", "shea butter"),
        ];
        assert_eq!(name_tally(&clusters), vec![("Shea Butter".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_split_converges_and_is_idempotent() {
        let mut store = SqliteStore::new(init_memory_database().await.unwrap());
        store.insert_definition(&definition("d1", "Cocoa")).await.unwrap();
        store.insert_cluster(&cluster("c1", "Cocoa Butter", "d1", "Cocoa Butter")).await.unwrap();
        store.insert_cluster(&cluster("c2", "Cocoa Butter Wafers", "d1", "Cocoa Butter")).await.unwrap();
        store.insert_cluster(&cluster("c3", "Cocoa Powder", "d1", "Cacao Powder")).await.unwrap();
        store.insert_cluster(&cluster("c4", "Cocoa Nibs", "d1", "")).await.unwrap();

        let first = split(&mut store).await;
        assert_eq!(first.matched, 1, "one minority cluster re-homed");

        assert!(find_conflicts(&mut store).await.unwrap().is_empty());
        let moved = store.get_cluster("c3").await.unwrap().unwrap();
        assert_ne!(moved.definition_id.as_deref(), Some("d1"));
        let target = store
            .get_definition(moved.definition_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.common_name, "Cacao Powder");
        assert_eq!(
            store.get_definition("d1").await.unwrap().unwrap().common_name,
            "Cocoa Butter"
        );
        assert_eq!(
            store.get_cluster("c4").await.unwrap().unwrap().definition_id.as_deref(),
            Some("d1"),
            "unnamed clusters stay"
        );

        let second = split(&mut store).await;
        assert_eq!(second.matched, 0, "second run performs zero splits");
        assert_eq!(second.changed, 0);
    }

    #[tokio::test]
    async fn test_rehome_to_existing_definition_with_rename() {
        let mut store = SqliteStore::new(init_memory_database().await.unwrap());
        store.insert_definition(&definition("d1", "Cocoa")).await.unwrap();
        store.insert_definition(&definition("d2", "Cacao Powder")).await.unwrap();
        store.insert_cluster(&cluster("c1", "Cocoa Butter", "d1", "Cocoa Butter")).await.unwrap();
        store.insert_cluster(&cluster("c2", "Cocoa Butter", "d1", "Cocoa Butter")).await.unwrap();
        store.insert_cluster(&cluster("c3", "Cocoa Powder", "d1", "Cacao Powder")).await.unwrap();
        store.insert_cluster(&cluster("c9", "Cocoa Powder", "d2", "Cacao Powder")).await.unwrap();

        split(&mut store).await;

        let moved = store.get_cluster("c3").await.unwrap().unwrap();
        assert_eq!(moved.definition_id.as_deref(), Some("d2"), "consistent definition reused");
        assert_eq!(moved.display_term, "Cocoa Powder (Cacao Powder)");
        assert_eq!(moved.canonical_term, "Cocoa Powder");
        assert_eq!(store.list_definitions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_items_follow_rehomed_cluster() {
        let mut store = SqliteStore::new(init_memory_database().await.unwrap());
        store.insert_definition(&definition("d1", "Cocoa")).await.unwrap();
        store.insert_cluster(&cluster("c1", "Cocoa Butter", "d1", "Cocoa Butter")).await.unwrap();
        store.insert_cluster(&cluster("c2", "Cocoa Powder", "d1", "Cacao Powder")).await.unwrap();

        let fields: crate::types::RawFields =
            serde_json::from_value(serde_json::json!({"name": "Cocoa Powder"})).unwrap();
        store.upsert_source_item("shop", "Cocoa Powder", &fields).await.unwrap();
        let item_id = store.list_source_items().await.unwrap()[0].id.clone();
        store
            .link_item(&item_id, Some("c2"), Some("d1"), crate::types::ItemStatus::Linked)
            .await
            .unwrap();

        split(&mut store).await;

        let cluster = store.get_cluster("c2").await.unwrap().unwrap();
        let item = store.list_items_for_cluster("c2").await.unwrap().remove(0);
        assert_eq!(item.definition_id, cluster.definition_id);
        assert_ne!(item.definition_id.as_deref(), Some("d1"));
    }
}
