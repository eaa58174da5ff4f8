// Seed linking integration tests
//
// Seeds are linked against forms built from provider data only, so tier
// selection and orphan handling can be observed directly.

mod helpers;

use helpers::{broker_of, create_memory_store, test_settings, MapProvider};
use rmx_xref::seeds::{load_seed_dir, Seed};
use rmx_xref::store::{SqliteStore, TermMatch, XrefStore};
use rmx_xref::types::{ItemStatus, SpecValue};
use rmx_xref::Pipeline;
use serde_json::json;
use std::sync::Arc;

async fn built_forms() -> Pipeline<SqliteStore> {
    let records = [
        ("Mango Butter", json!({"name": "Mango Butter", "melting_point": 34})),
        ("Raw Mango Butter Flakes", json!({"name": "Raw Mango Butter Flakes"})),
        ("Kokum Butter Blend", json!({"name": "Kokum Butter Blend"})),
    ];
    let terms: Vec<String> = records.iter().map(|(t, _)| t.to_string()).collect();
    let broker = broker_of(vec![Arc::new(MapProvider::new("shop", &records))]);

    let mut pipeline = Pipeline::new(create_memory_store().await, test_settings(), false);
    pipeline.ingest(&broker, &terms, &[], false).await.unwrap();
    pipeline.reconcile().await.unwrap();
    pipeline.rebuild_specs().await.unwrap();
    pipeline
}

fn seeds_from_dir() -> Vec<Seed> {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("butters.json"),
        json!({
            "category": "butters",
            "items": [
                {"name": "Mango Butter", "melting_point": 31, "default_unit": "g"},
                {"name": "Kokum", "physical_form": "Butter", "iodine_value": 35},
                {"name": "Illipe Butter"}
            ]
        })
        .to_string(),
    )
    .unwrap();
    load_seed_dir(dir.path()).unwrap()
}

#[tokio::test]
async fn test_tiers_and_orphans() {
    let mut pipeline = built_forms().await;
    let seeds = seeds_from_dir();

    let summary = pipeline.link_seeds(&seeds).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.orphaned, 1);

    let store = pipeline.store();
    let mango = store
        .find_merged_forms("Mango Butter", TermMatch::Exact)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(mango.seed_key.as_deref(), Some(seeds[0].key.as_str()));
    assert_eq!(
        mango.seed_specs.as_ref().unwrap()["melting_point"],
        SpecValue::Number(31.0)
    );
    assert_eq!(
        mango.merged_specs["melting_point"],
        SpecValue::Number(34.0),
        "scraped value kept beside the override"
    );

    let flakes = store
        .find_merged_forms("Raw Mango Butter Flakes", TermMatch::Exact)
        .await
        .unwrap();
    assert_eq!(flakes.len(), 1);
    assert!(flakes[0].seed_key.is_none(), "exact match beats the substring candidate");

    let seeds_linked = store.list_seeds(Some(ItemStatus::Linked)).await.unwrap();
    let kokum = seeds_linked.iter().find(|s| s.name == "Kokum").unwrap();
    assert_eq!(kokum.match_tier.as_deref(), Some("prefix"));

    let orphans = store.list_seeds(Some(ItemStatus::Orphan)).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].name, "Illipe Butter");
}

#[tokio::test]
async fn test_override_survives_rebuild() {
    let mut pipeline = built_forms().await;
    let seeds = seeds_from_dir();
    pipeline.link_seeds(&seeds).await.unwrap();

    let rebuilt = pipeline.rebuild_specs().await.unwrap();
    assert_eq!(rebuilt.changed, 0);

    let mango = pipeline
        .store()
        .find_merged_forms("Mango Butter", TermMatch::Exact)
        .await
        .unwrap()
        .remove(0);
    assert!(mango.seed_specs.is_some());
}
