// End-to-end pipeline tests
//
// Runs every stage over mock providers and curated seeds, then checks the
// merged output, idempotence of a second run and dry-run behavior.

mod helpers;

use helpers::{
    broker_of, create_file_store, create_memory_store, test_settings, FailingProvider, MapProvider,
    WritingProvider,
};
use rmx_xref::seeds::{Seed, SeedItem};
use rmx_xref::store::XrefStore;
use rmx_xref::types::{ItemStatus, Provider, SpecValue};
use rmx_xref::{Pipeline, SqliteStore};
use serde_json::json;
use std::sync::Arc;

fn seed(category: &str, value: serde_json::Value) -> Seed {
    let item: SeedItem = serde_json::from_value(value).unwrap();
    Seed::new(category, item)
}

fn providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(MapProvider::new(
            "cosing",
            &[
                (
                    "Shea Butter (Refined)",
                    json!({
                        "name": "Shea Butter",
                        "inci_name": "Butyrospermum Parkii Butter",
                        "common_name": "Shea Butter",
                        "cas_number": "91080-23-8"
                    }),
                ),
                ("Olive Oil", json!({"name": "Olive Oil", "iodine_value": "84"})),
            ],
        )),
        Arc::new(FailingProvider { id: "pubchem".into() }),
        Arc::new(MapProvider::new(
            "shop",
            &[
                (
                    "Shea Butter (Refined)",
                    json!({
                        "name": "Shea Butter (Refined)",
                        "description": "Creamy ivory butter. Safety Information: keep cool",
                        "price": 12.5
                    }),
                ),
                ("PEG-7 Olive Oil Esters", json!({"name": "PEG-7 Olive Oil Esters"})),
            ],
        )),
    ]
}

fn terms() -> Vec<String> {
    ["Shea Butter (Refined)", "Olive Oil", "PEG-7 Olive Oil Esters", "Unobtainium"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn seeds() -> Vec<Seed> {
    vec![seed(
        "butters",
        json!({"name": "Shea Butter (Refined)", "saponification_value": 181}),
    )]
}

#[tokio::test]
async fn test_seed_yields_form_with_override() {
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);

    let summaries = pipeline
        .run_all(&broker, &terms(), &seeds(), false)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 5);
    assert_eq!(summaries[0].orphaned, 1, "Unobtainium has no data");

    let store = pipeline.store();
    let forms = store
        .find_merged_forms("Shea Butter", rmx_xref::store::TermMatch::Exact)
        .await
        .unwrap();
    let refined = forms
        .iter()
        .find(|f| f.derived_variation == "Refined")
        .expect("refined form exists");

    assert_eq!(refined.derived_term, "Shea Butter");
    assert_eq!(refined.derived_physical_form, "Butter");
    let overrides = refined.seed_specs.as_ref().expect("seed override attached");
    assert_eq!(overrides["saponification_value"], SpecValue::Number(181.0));

    // Scraped baseline stays separate from the override
    assert!(!refined.merged_specs.contains_key("saponification_value"));
    assert_eq!(
        refined.merged_descriptors["description"],
        SpecValue::Text("Creamy ivory butter.".into())
    );
    assert!(refined.source_coverage.contains_key("shop"));
    assert!(refined.source_coverage.contains_key("seed"));

    let linked = store.list_seeds(Some(ItemStatus::Linked)).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].match_tier.as_deref(), Some("exact"));

    let report = pipeline.verify().await.unwrap();
    assert!(report.is_valid(), "{:?}", report);
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);

    pipeline.run_all(&broker, &terms(), &seeds(), false).await.unwrap();
    let second = pipeline.run_all(&broker, &terms(), &seeds(), false).await.unwrap();

    for summary in &second {
        assert_eq!(summary.changed, 0, "{}", summary.display_string());
    }
}

#[tokio::test]
async fn test_derivative_linked_across_sources() {
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);
    pipeline.run_all(&broker, &terms(), &seeds(), false).await.unwrap();

    let clusters = pipeline.store().list_clusters().await.unwrap();
    let olive = clusters.iter().find(|c| c.canonical_term == "Olive Oil").unwrap();
    let peg = clusters
        .iter()
        .find(|c| c.canonical_term == "PEG-7 Olive Oil Esters")
        .unwrap();
    assert_eq!(peg.parent_cluster_id.as_deref(), Some(olive.id.as_str()));
}

#[tokio::test]
async fn test_dry_run_commits_nothing() {
    let (_dir, pool, store) = create_file_store().await;
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(store, test_settings(), true);

    let summaries = pipeline
        .run_all(&broker, &terms(), &seeds(), false)
        .await
        .unwrap();
    assert!(summaries.iter().all(|s| s.dry_run));
    assert!(summaries[0].changed > 0, "intended changes are reported");
    pipeline.finish().await.unwrap();

    let mut fresh = SqliteStore::new(pool);
    assert!(fresh.list_source_items().await.unwrap().is_empty());
    assert!(fresh.list_clusters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_committed_batches_survive_on_disk() {
    let (_dir, pool, store) = create_file_store().await;
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(store, test_settings(), false);

    pipeline.ingest(&broker, &terms(), &seeds(), false).await.unwrap();
    pipeline.reconcile().await.unwrap();
    pipeline.finish().await.unwrap();

    let mut fresh = SqliteStore::new(pool.clone());
    assert_eq!(fresh.list_source_items().await.unwrap().len(), 5);
    assert!(!fresh.list_clusters().await.unwrap().is_empty());
    fresh.commit_batch().await.unwrap();

    let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_runs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(runs, 2);
}

#[tokio::test]
async fn test_refresh_purges_before_reingest() {
    let broker = broker_of(providers());
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);

    pipeline.ingest(&broker, &terms(), &seeds(), false).await.unwrap();
    let refreshed = pipeline.ingest(&broker, &terms(), &seeds(), true).await.unwrap();
    assert_eq!(refreshed.skipped, 0, "purged rows are inserted again");
    assert_eq!(refreshed.changed, 5);
}

#[tokio::test]
async fn test_orphan_seed_reported() {
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);
    let seeds = vec![seed("oils", json!({"name": "Tamanu Oil", "iodine_value": 90}))];

    let summary = pipeline.link_seeds(&seeds).await.unwrap();
    assert_eq!(summary.orphaned, 1);

    let report = pipeline.orphans().await.unwrap();
    assert_eq!(report.seeds.len(), 1);
    assert_eq!(report.seeds[0].name, "Tamanu Oil");
    assert!(report.items.is_empty());
}

#[tokio::test]
async fn test_vanished_record_leaves_no_stale_form() {
    let terms = vec!["Jojoba Oil".to_string()];
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);

    let before = broker_of(vec![Arc::new(MapProvider::new(
        "shop",
        &[("Jojoba Oil", json!({"name": "Jojoba Oil", "iodine_value": 82}))],
    ))]);
    pipeline.run_all(&before, &terms, &[], false).await.unwrap();
    assert_eq!(
        pipeline
            .store()
            .find_merged_forms("Jojoba Oil", rmx_xref::store::TermMatch::Exact)
            .await
            .unwrap()
            .len(),
        1
    );

    let after = broker_of(vec![Arc::new(MapProvider::new("shop", &[]))]);
    pipeline.run_all(&after, &terms, &[], true).await.unwrap();

    let store = pipeline.store();
    assert!(store.list_source_items().await.unwrap().is_empty());
    assert!(store
        .find_merged_forms("Jojoba Oil", rmx_xref::store::TermMatch::Exact)
        .await
        .unwrap()
        .is_empty());
    let clusters = store.list_clusters().await.unwrap();
    assert!(clusters.iter().all(|c| c.item_count == 0));
}

#[tokio::test]
async fn test_refresh_lookups_run_outside_the_batch() {
    let (_dir, pool, store) = create_file_store().await;
    sqlx::query("CREATE TABLE lookup_log (term TEXT NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    let broker = broker_of(vec![Arc::new(WritingProvider {
        pool: pool.clone(),
        inner: MapProvider::new("shop", &[("Olive Oil", json!({"name": "Olive Oil"}))]),
    })]);
    let terms = vec!["Olive Oil".to_string()];
    let mut pipeline = Pipeline::new(store, test_settings(), false);

    pipeline.ingest(&broker, &terms, &[], false).await.unwrap();
    let refreshed = pipeline.ingest(&broker, &terms, &[], true).await.unwrap();
    assert_eq!(refreshed.orphaned, 0, "lookup never waits on the purge");
    assert_eq!(refreshed.changed, 1);

    let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lookup_log")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logged, 2);
}

#[tokio::test]
async fn test_same_seed_name_in_two_categories_kept_apart() {
    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);
    let seeds = vec![
        seed("oils", json!({"name": "Olive Oil", "iodine_value": 84})),
        seed("carriers", json!({"name": "Olive Oil", "iodine_value": 86})),
    ];

    let summary = pipeline
        .ingest(&broker_of(Vec::new()), &[], &seeds, false)
        .await
        .unwrap();
    assert_eq!(summary.changed, 2);

    let items = pipeline.store().list_source_items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].raw_fields["iodine_value"], json!(84));
    assert_eq!(items[1].raw_fields["iodine_value"], json!(86));
}
