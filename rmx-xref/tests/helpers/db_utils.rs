//! Store Test Utilities

use rmx_common::db::{init_database, init_memory_database};
use rmx_xref::{PipelineSettings, SqliteStore};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Store over a fresh in-memory database
pub async fn create_memory_store() -> SqliteStore {
    SqliteStore::new(init_memory_database().await.unwrap())
}

/// Store over a database file in a temporary folder
///
/// Returns (TempDir, pool, store) - TempDir must be kept alive for the test
pub async fn create_file_store() -> (TempDir, SqlitePool, SqliteStore) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("rmx.db")).await.unwrap();
    let store = SqliteStore::new(pool.clone());
    (temp_dir, pool, store)
}

/// Settings with small batches and a fixed precedence
pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        precedence: vec!["cosing".into(), "pubchem".into(), "shop".into(), "seed".into()],
        batch_size: 2,
        workers: 2,
        synthetic_confidence: 0.5,
        substring_max_len: 32,
        seed_substring_slack: 12,
    }
}
