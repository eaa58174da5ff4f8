//! SQLite implementation of [`XrefStore`]
//!
//! Every call runs inside one lazily opened transaction, so a batch becomes
//! visible only when committed and a crash mid-batch leaves earlier batches
//! intact. JSON-valued columns are (de)serialized with serde_json.

use super::{
    ClusterRecord, DefinitionRecord, MergedItemForm, SeedRecord, SourceCoverage, SourceItemRecord,
    TermMatch, UpsertOutcome, XrefStore,
};
use crate::name_parser::ParsedName;
use crate::pipeline::statistics::StageSummary;
use crate::text::escape_like;
use crate::types::{ExtractedSpecs, ItemStatus, RawFields, SpecMap};
use chrono::{DateTime, Utc};
use rmx_common::hash::content_hash;
use rmx_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

const CLUSTER_COLUMNS: &str = "id, cluster_key, definition_id, canonical_term, display_term, \
     variation, physical_form, common_name, reconciled_term, reconciled_variation, \
     parent_cluster_id, confidence, item_count, sample_item_keys, synthetic";

const ITEM_COLUMNS: &str = "id, source, raw_name, content_hash, raw_fields, derived_term, \
     derived_variation, derived_physical_form, derived_stem, parse_ambiguous, derived_specs, \
     cluster_id, definition_id, status";

const FORM_COLUMNS: &str = "cluster_id, derived_term, derived_variation, derived_physical_form, \
     merged_specs, merged_descriptors, merged_identifiers, source_coverage, seed_key, seed_specs";

/// Transactional SQLite store
pub struct SqliteStore {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }

    /// Current batch transaction, opened on first use
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| Error::Internal("batch transaction not open".to_string()))
    }
}

/// LIKE pattern and SQL operator for a term query
fn term_clause(column: &str, term: &str, mode: TermMatch) -> (String, String) {
    match mode {
        TermMatch::Exact => (format!("{} = ? COLLATE NOCASE", column), term.to_string()),
        TermMatch::Prefix => (
            format!("{} LIKE ? ESCAPE '\\'", column),
            format!("{}%", escape_like(term)),
        ),
        TermMatch::Substring => (
            format!("{} LIKE ? ESCAPE '\\'", column),
            format!("%{}%", escape_like(term)),
        ),
    }
}

fn cluster_from_row(row: &SqliteRow) -> Result<ClusterRecord> {
    let samples: String = row.try_get("sample_item_keys")?;
    let synthetic: i64 = row.try_get("synthetic")?;
    Ok(ClusterRecord {
        id: row.try_get("id")?,
        cluster_key: row.try_get("cluster_key")?,
        definition_id: row.try_get("definition_id")?,
        canonical_term: row.try_get("canonical_term")?,
        display_term: row.try_get("display_term")?,
        variation: row.try_get("variation")?,
        physical_form: row.try_get("physical_form")?,
        common_name: row.try_get("common_name")?,
        reconciled_term: row.try_get("reconciled_term")?,
        reconciled_variation: row.try_get("reconciled_variation")?,
        parent_cluster_id: row.try_get("parent_cluster_id")?,
        confidence: row.try_get("confidence")?,
        item_count: row.try_get("item_count")?,
        sample_item_keys: serde_json::from_str(&samples)?,
        synthetic: synthetic != 0,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<SourceItemRecord> {
    let raw_fields: String = row.try_get("raw_fields")?;
    let derived_specs: String = row.try_get("derived_specs")?;
    let status: String = row.try_get("status")?;
    let derived_term: Option<String> = row.try_get("derived_term")?;
    let ambiguous: i64 = row.try_get("parse_ambiguous")?;

    let derived = match derived_term {
        Some(term) => Some(ParsedName {
            term,
            variation: row.try_get::<Option<String>, _>("derived_variation")?.unwrap_or_default(),
            physical_form: row
                .try_get::<Option<String>, _>("derived_physical_form")?
                .unwrap_or_default(),
            stem: row.try_get::<Option<String>, _>("derived_stem")?.unwrap_or_default(),
            ambiguous: ambiguous != 0,
        }),
        None => None,
    };

    Ok(SourceItemRecord {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        raw_name: row.try_get("raw_name")?,
        content_hash: row.try_get("content_hash")?,
        raw_fields: serde_json::from_str(&raw_fields)?,
        derived,
        derived_specs: serde_json::from_str(&derived_specs)?,
        cluster_id: row.try_get("cluster_id")?,
        definition_id: row.try_get("definition_id")?,
        status: ItemStatus::parse(&status),
    })
}

fn definition_from_row(row: &SqliteRow) -> Result<DefinitionRecord> {
    Ok(DefinitionRecord {
        id: row.try_get("id")?,
        definition_term: row.try_get("definition_term")?,
        common_name: row.try_get("common_name")?,
    })
}

fn form_from_row(row: &SqliteRow) -> Result<MergedItemForm> {
    let specs: String = row.try_get("merged_specs")?;
    let descriptors: String = row.try_get("merged_descriptors")?;
    let identifiers: String = row.try_get("merged_identifiers")?;
    let coverage: String = row.try_get("source_coverage")?;
    let seed_specs: Option<String> = row.try_get("seed_specs")?;

    let source_coverage: BTreeMap<String, SourceCoverage> = serde_json::from_str(&coverage)?;
    let seed_specs: Option<SpecMap> = match seed_specs {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(MergedItemForm {
        cluster_id: row.try_get("cluster_id")?,
        derived_term: row.try_get("derived_term")?,
        derived_variation: row.try_get("derived_variation")?,
        derived_physical_form: row.try_get("derived_physical_form")?,
        merged_specs: serde_json::from_str(&specs)?,
        merged_descriptors: serde_json::from_str(&descriptors)?,
        merged_identifiers: serde_json::from_str(&identifiers)?,
        source_coverage,
        seed_key: row.try_get("seed_key")?,
        seed_specs,
    })
}

fn seed_from_row(row: &SqliteRow) -> Result<SeedRecord> {
    let status: String = row.try_get("status")?;
    Ok(SeedRecord {
        key: row.try_get("key")?,
        category: row.try_get("category")?,
        name: row.try_get("name")?,
        status: ItemStatus::parse(&status),
        cluster_id: row.try_get("cluster_id")?,
        match_tier: row.try_get("match_tier")?,
    })
}

#[async_trait::async_trait]
impl XrefStore for SqliteStore {
    async fn upsert_source_item_with_id(
        &mut self,
        id: &str,
        source: &str,
        raw_name: &str,
        fields: &RawFields,
    ) -> Result<UpsertOutcome> {
        let raw_json = serde_json::to_string(fields)?;
        let hash = content_hash(raw_json.as_bytes());
        let tx = self.tx().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM source_items WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;

        match existing {
            Some(stored) if stored == hash => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE source_items
                    SET raw_name = ?, content_hash = ?, raw_fields = ?,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(raw_name)
                .bind(&hash)
                .bind(&raw_json)
                .bind(id)
                .execute(&mut **tx)
                .await?;
                debug!(source = source, raw_name = %raw_name, "Source item content changed");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO source_items (id, source, raw_name, content_hash, raw_fields, status)
                    VALUES (?, ?, ?, ?, ?, 'orphan')
                    "#,
                )
                .bind(id)
                .bind(source)
                .bind(raw_name)
                .bind(&hash)
                .bind(&raw_json)
                .execute(&mut **tx)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn purge_source(&mut self, source: &str) -> Result<u64> {
        let tx = self.tx().await?;
        let result = sqlx::query("DELETE FROM source_items WHERE source = ?")
            .bind(source)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_source_items(&mut self) -> Result<Vec<SourceItemRecord>> {
        let tx = self.tx().await?;
        let sql = format!("SELECT {} FROM source_items ORDER BY rowid", ITEM_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&mut **tx).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn list_items_for_cluster(&mut self, cluster_id: &str) -> Result<Vec<SourceItemRecord>> {
        let tx = self.tx().await?;
        let sql = format!(
            "SELECT {} FROM source_items WHERE cluster_id = ? ORDER BY rowid",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(cluster_id).fetch_all(&mut **tx).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn list_orphan_items(&mut self) -> Result<Vec<SourceItemRecord>> {
        let tx = self.tx().await?;
        let sql = format!(
            "SELECT {} FROM source_items WHERE status = 'orphan' ORDER BY rowid",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&mut **tx).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn update_item_derivation(
        &mut self,
        item_id: &str,
        parsed: &ParsedName,
        specs: &ExtractedSpecs,
    ) -> Result<bool> {
        let specs_json = serde_json::to_string(specs)?;
        let tx = self.tx().await?;
        let result = sqlx::query(
            r#"
            UPDATE source_items
            SET derived_term = ?, derived_variation = ?, derived_physical_form = ?,
                derived_stem = ?, parse_ambiguous = ?, derived_specs = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
              AND NOT (derived_term IS ? AND derived_variation IS ?
                       AND derived_physical_form IS ? AND derived_stem IS ?
                       AND parse_ambiguous = ? AND derived_specs = ?)
            "#,
        )
        .bind(&parsed.term)
        .bind(&parsed.variation)
        .bind(&parsed.physical_form)
        .bind(&parsed.stem)
        .bind(parsed.ambiguous)
        .bind(&specs_json)
        .bind(item_id)
        .bind(&parsed.term)
        .bind(&parsed.variation)
        .bind(&parsed.physical_form)
        .bind(&parsed.stem)
        .bind(parsed.ambiguous)
        .bind(&specs_json)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn link_item(
        &mut self,
        item_id: &str,
        cluster_id: Option<&str>,
        definition_id: Option<&str>,
        status: ItemStatus,
    ) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            UPDATE source_items
            SET cluster_id = ?, definition_id = ?, status = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(cluster_id)
        .bind(definition_id)
        .bind(status.as_str())
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_items_definition(&mut self, cluster_id: &str, definition_id: &str) -> Result<u64> {
        let tx = self.tx().await?;
        let result = sqlx::query(
            "UPDATE source_items SET definition_id = ?, updated_at = CURRENT_TIMESTAMP WHERE cluster_id = ?",
        )
        .bind(definition_id)
        .bind(cluster_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_cluster(&mut self, cluster_id: &str) -> Result<Option<ClusterRecord>> {
        let tx = self.tx().await?;
        let sql = format!("SELECT {} FROM clusters WHERE id = ?", CLUSTER_COLUMNS);
        let row = sqlx::query(&sql).bind(cluster_id).fetch_optional(&mut **tx).await?;
        row.as_ref().map(cluster_from_row).transpose()
    }

    async fn find_cluster_by_key(&mut self, cluster_key: &str) -> Result<Option<ClusterRecord>> {
        let tx = self.tx().await?;
        let sql = format!("SELECT {} FROM clusters WHERE cluster_key = ?", CLUSTER_COLUMNS);
        let row = sqlx::query(&sql).bind(cluster_key).fetch_optional(&mut **tx).await?;
        row.as_ref().map(cluster_from_row).transpose()
    }

    async fn insert_cluster(&mut self, cluster: &ClusterRecord) -> Result<()> {
        let samples = serde_json::to_string(&cluster.sample_item_keys)?;
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            INSERT INTO clusters (
                id, cluster_key, definition_id, canonical_term, display_term,
                variation, physical_form, common_name, reconciled_term, reconciled_variation,
                parent_cluster_id, confidence, item_count, sample_item_keys, synthetic
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cluster.id)
        .bind(&cluster.cluster_key)
        .bind(&cluster.definition_id)
        .bind(&cluster.canonical_term)
        .bind(&cluster.display_term)
        .bind(&cluster.variation)
        .bind(&cluster.physical_form)
        .bind(&cluster.common_name)
        .bind(&cluster.reconciled_term)
        .bind(&cluster.reconciled_variation)
        .bind(&cluster.parent_cluster_id)
        .bind(cluster.confidence)
        .bind(cluster.item_count)
        .bind(&samples)
        .bind(cluster.synthetic)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_cluster_stats(&mut self, cluster: &ClusterRecord) -> Result<()> {
        let samples = serde_json::to_string(&cluster.sample_item_keys)?;
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            UPDATE clusters
            SET physical_form = ?, common_name = ?, confidence = ?, item_count = ?,
                sample_item_keys = ?, synthetic = ?
            WHERE id = ?
            "#,
        )
        .bind(&cluster.physical_form)
        .bind(&cluster.common_name)
        .bind(cluster.confidence)
        .bind(cluster.item_count)
        .bind(&samples)
        .bind(cluster.synthetic)
        .bind(&cluster.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn list_clusters(&mut self) -> Result<Vec<ClusterRecord>> {
        let tx = self.tx().await?;
        let sql = format!("SELECT {} FROM clusters ORDER BY rowid", CLUSTER_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&mut **tx).await?;
        rows.iter().map(cluster_from_row).collect()
    }

    async fn list_clusters_for_definition(&mut self, definition_id: &str) -> Result<Vec<ClusterRecord>> {
        let tx = self.tx().await?;
        let sql = format!(
            "SELECT {} FROM clusters WHERE definition_id = ? ORDER BY rowid",
            CLUSTER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(definition_id).fetch_all(&mut **tx).await?;
        rows.iter().map(cluster_from_row).collect()
    }

    async fn find_root_clusters(&mut self, term: &str, mode: TermMatch) -> Result<Vec<ClusterRecord>> {
        let (clause, pattern) = term_clause("canonical_term", term, mode);
        let tx = self.tx().await?;
        let sql = format!(
            "SELECT {} FROM clusters WHERE parent_cluster_id IS NULL AND {} \
             ORDER BY length(canonical_term), rowid",
            CLUSTER_COLUMNS, clause
        );
        let rows = sqlx::query(&sql).bind(pattern).fetch_all(&mut **tx).await?;
        rows.iter().map(cluster_from_row).collect()
    }

    async fn attach_parent(
        &mut self,
        cluster_id: &str,
        parent_id: &str,
        reconciled_term: &str,
        reconciled_variation: &str,
    ) -> Result<bool> {
        let tx = self.tx().await?;
        let result = sqlx::query(
            r#"
            UPDATE clusters
            SET parent_cluster_id = ?, reconciled_term = ?, reconciled_variation = ?
            WHERE id = ? AND parent_cluster_id IS NULL AND id <> ?
            "#,
        )
        .bind(parent_id)
        .bind(reconciled_term)
        .bind(reconciled_variation)
        .bind(cluster_id)
        .bind(parent_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_cluster_definition(
        &mut self,
        cluster_id: &str,
        definition_id: &str,
        display_term: &str,
    ) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query("UPDATE clusters SET definition_id = ?, display_term = ? WHERE id = ?")
            .bind(definition_id)
            .bind(display_term)
            .bind(cluster_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn get_definition(&mut self, definition_id: &str) -> Result<Option<DefinitionRecord>> {
        let tx = self.tx().await?;
        let row = sqlx::query("SELECT id, definition_term, common_name FROM definitions WHERE id = ?")
            .bind(definition_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn find_definition_by_term(&mut self, term: &str) -> Result<Option<DefinitionRecord>> {
        let tx = self.tx().await?;
        let row = sqlx::query(
            r#"
            SELECT id, definition_term, common_name FROM definitions
            WHERE definition_term = ? COLLATE NOCASE
            ORDER BY rowid LIMIT 1
            "#,
        )
        .bind(term)
        .fetch_optional(&mut **tx)
        .await?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn find_definitions_by_name(&mut self, name: &str) -> Result<Vec<DefinitionRecord>> {
        let tx = self.tx().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, definition_term, common_name FROM definitions
            WHERE definition_term = ?1 COLLATE NOCASE OR common_name = ?1 COLLATE NOCASE
            ORDER BY rowid
            "#,
        )
        .bind(name)
        .fetch_all(&mut **tx)
        .await?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn insert_definition(&mut self, definition: &DefinitionRecord) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query("INSERT INTO definitions (id, definition_term, common_name) VALUES (?, ?, ?)")
            .bind(&definition.id)
            .bind(&definition.definition_term)
            .bind(&definition.common_name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn set_definition_common_name(&mut self, definition_id: &str, common_name: &str) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query("UPDATE definitions SET common_name = ? WHERE id = ?")
            .bind(common_name)
            .bind(definition_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list_definitions(&mut self) -> Result<Vec<DefinitionRecord>> {
        let tx = self.tx().await?;
        let rows = sqlx::query("SELECT id, definition_term, common_name FROM definitions ORDER BY rowid")
            .fetch_all(&mut **tx)
            .await?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn get_merged_form(&mut self, cluster_id: &str) -> Result<Option<MergedItemForm>> {
        let tx = self.tx().await?;
        let sql = format!("SELECT {} FROM merged_item_forms WHERE cluster_id = ?", FORM_COLUMNS);
        let row = sqlx::query(&sql).bind(cluster_id).fetch_optional(&mut **tx).await?;
        row.as_ref().map(form_from_row).transpose()
    }

    async fn upsert_merged_form(&mut self, form: &MergedItemForm) -> Result<()> {
        let specs = serde_json::to_string(&form.merged_specs)?;
        let descriptors = serde_json::to_string(&form.merged_descriptors)?;
        let identifiers = serde_json::to_string(&form.merged_identifiers)?;
        let coverage = serde_json::to_string(&form.source_coverage)?;
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            INSERT INTO merged_item_forms (
                cluster_id, derived_term, derived_variation, derived_physical_form,
                merged_specs, merged_descriptors, merged_identifiers, source_coverage
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cluster_id) DO UPDATE SET
                derived_term = excluded.derived_term,
                derived_variation = excluded.derived_variation,
                derived_physical_form = excluded.derived_physical_form,
                merged_specs = excluded.merged_specs,
                merged_descriptors = excluded.merged_descriptors,
                merged_identifiers = excluded.merged_identifiers,
                source_coverage = excluded.source_coverage,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&form.cluster_id)
        .bind(&form.derived_term)
        .bind(&form.derived_variation)
        .bind(&form.derived_physical_form)
        .bind(&specs)
        .bind(&descriptors)
        .bind(&identifiers)
        .bind(&coverage)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_merged_form(&mut self, cluster_id: &str) -> Result<bool> {
        let tx = self.tx().await?;
        let result = sqlx::query("DELETE FROM merged_item_forms WHERE cluster_id = ?")
            .bind(cluster_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_merged_forms(&mut self, term: &str, mode: TermMatch) -> Result<Vec<MergedItemForm>> {
        let (clause, pattern) = term_clause("derived_term", term, mode);
        let tx = self.tx().await?;
        let sql = format!(
            "SELECT {} FROM merged_item_forms WHERE {} ORDER BY length(derived_term), rowid",
            FORM_COLUMNS, clause
        );
        let rows = sqlx::query(&sql).bind(pattern).fetch_all(&mut **tx).await?;
        rows.iter().map(form_from_row).collect()
    }

    async fn set_seed_override(&mut self, cluster_id: &str, seed_key: &str, specs: &SpecMap) -> Result<()> {
        let specs_json = serde_json::to_string(specs)?;
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            UPDATE merged_item_forms
            SET seed_key = ?, seed_specs = ?, updated_at = CURRENT_TIMESTAMP
            WHERE cluster_id = ?
            "#,
        )
        .bind(seed_key)
        .bind(&specs_json)
        .bind(cluster_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn clear_seed_override(&mut self, seed_key: &str) -> Result<u64> {
        let tx = self.tx().await?;
        let result = sqlx::query(
            "UPDATE merged_item_forms SET seed_key = NULL, seed_specs = NULL WHERE seed_key = ?",
        )
        .bind(seed_key)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_seed(&mut self, seed: &SeedRecord) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            INSERT INTO seed_items (key, category, name, status, cluster_id, match_tier)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                category = excluded.category,
                name = excluded.name,
                status = excluded.status,
                cluster_id = excluded.cluster_id,
                match_tier = excluded.match_tier,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&seed.key)
        .bind(&seed.category)
        .bind(&seed.name)
        .bind(seed.status.as_str())
        .bind(&seed.cluster_id)
        .bind(&seed.match_tier)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn list_seeds(&mut self, status: Option<ItemStatus>) -> Result<Vec<SeedRecord>> {
        let tx = self.tx().await?;
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT key, category, name, status, cluster_id, match_tier FROM seed_items \
                     WHERE status = ? ORDER BY rowid",
                )
                .bind(status.as_str())
                .fetch_all(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT key, category, name, status, cluster_id, match_tier FROM seed_items ORDER BY rowid",
                )
                .fetch_all(&mut **tx)
                .await?
            }
        };
        rows.iter().map(seed_from_row).collect()
    }

    async fn record_run(&mut self, summary: &StageSummary, started_at: DateTime<Utc>) -> Result<()> {
        let tx = self.tx().await?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                id, stage, processed, matched, orphaned, changed, skipped, started_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(summary.stage.as_str())
        .bind(summary.processed as i64)
        .bind(summary.matched as i64)
        .bind(summary.orphaned as i64)
        .bind(summary.changed as i64)
        .bind(summary.skipped as i64)
        .bind(started_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit_batch(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("Batch committed");
        }
        Ok(())
    }

    async fn rollback_batch(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Batch rolled back");
        }
        Ok(())
    }
}
