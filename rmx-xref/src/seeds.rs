//! Curated seed documents
//!
//! A seed directory holds `.json` or `.toml` documents, each a category with
//! a list of items. Every key of an item beyond the fixed ones is an
//! authoritative spec value.

use crate::types::{RawFields, SpecMap, SpecValue};
use rmx_common::config::SEED_SOURCE_ID;
use rmx_common::hash::stable_key;
use rmx_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// One seed file
#[derive(Debug, Clone, Deserialize)]
pub struct SeedDocument {
    pub category: String,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

/// One curated item as written in a seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inci_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_form: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active_ingredient: Option<bool>,
    /// Spec fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A seed item with its category and stable key
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub key: String,
    pub category: String,
    pub item: SeedItem,
}

impl Seed {
    pub fn new(category: &str, item: SeedItem) -> Self {
        Self {
            key: stable_key(&[category, item.name.as_str()]),
            category: category.to_string(),
            item,
        }
    }

    pub fn name(&self) -> &str {
        &self.item.name
    }

    /// Id of the `seed` SourceItem carrying this seed's raw fields
    pub fn source_item_id(&self) -> String {
        stable_key(&[SEED_SOURCE_ID, self.category.as_str(), self.name()])
    }

    /// Curated spec values, attached to a merged form as its override
    pub fn specs(&self) -> SpecMap {
        self.item
            .extra
            .iter()
            .filter_map(|(field, value)| SpecValue::from_json(value).map(|v| (field.clone(), v)))
            .collect()
    }

    /// The item as a raw record for ingestion under the seed source
    pub fn raw_fields(&self) -> RawFields {
        match serde_json::to_value(&self.item) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => RawFields::new(),
        }
    }
}

fn parse_error(path: &Path, message: impl std::fmt::Display) -> Error {
    Error::InvalidInput(format!("seed file {}: {}", path.display(), message))
}

/// Parse one seed document; the extension picks the format
pub fn parse_seed_document(path: &Path, content: &str) -> Result<SeedDocument> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => serde_json::from_str(content).map_err(|e| parse_error(path, e)),
        Some("toml") => toml::from_str(content).map_err(|e| parse_error(path, e)),
        _ => Err(parse_error(path, "unsupported extension")),
    }
}

/// Load every seed document in a directory (file name order)
///
/// Items without a name are skipped. A document that fails to parse stops
/// the load: curated input is expected to be valid.
pub fn load_seed_dir(dir: &Path) -> Result<Vec<Seed>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("toml")
                )
        })
        .collect();
    paths.sort();

    let mut seeds = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        let document = parse_seed_document(&path, &content)?;
        let before = seeds.len();
        for item in document.items {
            if item.name.trim().is_empty() {
                debug!(file = %path.display(), "Seed item without a name skipped");
                continue;
            }
            seeds.push(Seed::new(&document.category, item));
        }
        debug!(
            file = %path.display(),
            category = %document.category,
            items = seeds.len() - before,
            "Seed document loaded"
        );
    }

    info!(seeds = seeds.len(), "Loaded seeds from {}", dir.display());
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_document_extra_fields_are_specs() {
        let doc = parse_seed_document(
            Path::new("butters.json"),
            r#"{"category": "butters", "items": [
                {"name": "Shea Butter (Refined)", "aliases": ["Karite Butter"],
                 "saponification_value": 181, "comedogenic_rating": "0-2"}
            ]}"#,
        )
        .unwrap();
        let seed = Seed::new(&doc.category, doc.items[0].clone());

        assert_eq!(seed.item.aliases, vec!["Karite Butter"]);
        let specs = seed.specs();
        assert_eq!(specs["saponification_value"], SpecValue::Number(181.0));
        assert_eq!(specs["comedogenic_rating"], SpecValue::Text("0-2".into()));
        assert!(!specs.contains_key("aliases"));

        let raw = seed.raw_fields();
        assert_eq!(raw["name"], json!("Shea Butter (Refined)"));
        assert_eq!(raw["saponification_value"], json!(181));
        assert!(!raw.contains_key("inci_name"));
    }

    #[test]
    fn test_toml_document() {
        let doc = parse_seed_document(
            Path::new("oils.toml"),
            r#"
category = "oils"

[[items]]
name = "Jojoba Oil"
physical_form = "Oil"
iodine_value = 82
"#,
        )
        .unwrap();
        assert_eq!(doc.category, "oils");
        assert_eq!(doc.items[0].physical_form.as_deref(), Some("Oil"));
        assert_eq!(doc.items[0].extra["iodine_value"], json!(82));
    }

    #[test]
    fn test_key_is_stable_per_category_and_name() {
        let item: SeedItem = serde_json::from_value(json!({"name": "Mango Butter"})).unwrap();
        let a = Seed::new("butters", item.clone());
        let b = Seed::new("Butters", item.clone());
        let c = Seed::new("exotic", item);
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
    }

    #[test]
    fn test_load_seed_dir_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            r#"{"category": "oils", "items": [{"name": "Olive Oil"}, {"name": " "}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "category = \"butters\"\n[[items]]\nname = \"Cocoa Butter\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a seed").unwrap();

        let seeds = load_seed_dir(dir.path()).unwrap();
        let names: Vec<_> = seeds.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Cocoa Butter", "Olive Oil"]);
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(parse_seed_document(Path::new("bad.json"), "{").is_err());
        assert!(parse_seed_document(Path::new("seed.yaml"), "category: x").is_err());
    }
}
