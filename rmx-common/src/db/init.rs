//! Database initialization
//!
//! Creates the pipeline schema idempotently. Every statement is
//! `CREATE ... IF NOT EXISTS`, so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the pipeline database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Stages run sequentially and exclusively per run; a small pool suffices
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the schema applied
///
/// One connection keeps every query on the same in-memory database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all pipeline tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_source_items_table(pool).await?;
    create_definitions_table(pool).await?;
    create_clusters_table(pool).await?;
    create_merged_item_forms_table(pool).await?;
    create_seed_items_table(pool).await?;
    create_pipeline_runs_table(pool).await?;
    Ok(())
}

async fn create_source_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_items (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            raw_name TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            raw_fields TEXT NOT NULL,
            derived_term TEXT,
            derived_variation TEXT,
            derived_physical_form TEXT,
            derived_stem TEXT,
            parse_ambiguous INTEGER NOT NULL DEFAULT 0,
            derived_specs TEXT NOT NULL DEFAULT '{}',
            cluster_id TEXT,
            definition_id TEXT,
            status TEXT NOT NULL DEFAULT 'orphan',
            ingested_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_source_items_cluster ON source_items(cluster_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_source_items_source ON source_items(source)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_definitions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS definitions (
            id TEXT PRIMARY KEY,
            definition_term TEXT NOT NULL,
            common_name TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_definitions_term ON definitions(definition_term COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_clusters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            cluster_key TEXT NOT NULL UNIQUE,
            definition_id TEXT,
            canonical_term TEXT NOT NULL,
            display_term TEXT NOT NULL,
            variation TEXT NOT NULL DEFAULT '',
            physical_form TEXT NOT NULL DEFAULT '',
            common_name TEXT NOT NULL DEFAULT '',
            reconciled_term TEXT,
            reconciled_variation TEXT,
            parent_cluster_id TEXT,
            confidence REAL NOT NULL DEFAULT 1.0,
            item_count INTEGER NOT NULL DEFAULT 0,
            sample_item_keys TEXT NOT NULL DEFAULT '[]',
            synthetic INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_clusters_term ON clusters(canonical_term COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_clusters_definition ON clusters(definition_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_merged_item_forms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merged_item_forms (
            cluster_id TEXT PRIMARY KEY,
            derived_term TEXT NOT NULL,
            derived_variation TEXT NOT NULL DEFAULT '',
            derived_physical_form TEXT NOT NULL DEFAULT '',
            merged_specs TEXT NOT NULL DEFAULT '{}',
            merged_descriptors TEXT NOT NULL DEFAULT '{}',
            merged_identifiers TEXT NOT NULL DEFAULT '{}',
            source_coverage TEXT NOT NULL DEFAULT '{}',
            seed_key TEXT,
            seed_specs TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_merged_forms_term ON merged_item_forms(derived_term COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_seed_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seed_items (
            key TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            cluster_id TEXT,
            match_tier TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pipeline_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id TEXT PRIMARY KEY,
            stage TEXT NOT NULL,
            processed INTEGER NOT NULL,
            matched INTEGER NOT NULL,
            orphaned INTEGER NOT NULL,
            changed INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
