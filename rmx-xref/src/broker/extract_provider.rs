//! Provider backed by a previously captured per-source extract
//!
//! The extract is a JSON file holding either an object keyed by raw term
//! (`{"Shea Butter": {...}}`) or an array of objects that each carry a
//! `name`. It is loaded once; lookups are case-insensitive.

use crate::text::collapse_whitespace;
use crate::types::{FetchError, Provider, RawFields};
use std::collections::HashMap;
use std::path::Path;

pub struct ExtractProvider {
    id: String,
    records: HashMap<String, RawFields>,
}

fn lookup_key(term: &str) -> String {
    collapse_whitespace(term).to_lowercase()
}

impl ExtractProvider {
    /// Load an extract file
    pub async fn load(id: &str, path: &Path) -> Result<Self, FetchError> {
        let content = tokio::fs::read_to_string(path).await?;
        let provider = Self::from_json_str(id, &content)?;
        tracing::info!(
            source = %id,
            records = provider.records.len(),
            "Loaded extract from {}",
            path.display()
        );
        Ok(provider)
    }

    /// Parse extract content
    pub fn from_json_str(id: &str, content: &str) -> Result<Self, FetchError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut records = HashMap::new();
        match value {
            serde_json::Value::Object(map) => {
                for (term, fields) in map {
                    if let serde_json::Value::Object(fields) = fields {
                        records
                            .entry(lookup_key(&term))
                            .or_insert_with(|| fields.into_iter().collect());
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    let serde_json::Value::Object(fields) = item else {
                        continue;
                    };
                    let Some(name) = fields.get("name").and_then(|n| n.as_str()) else {
                        continue;
                    };
                    // First occurrence wins for duplicate names
                    records
                        .entry(lookup_key(name))
                        .or_insert_with(|| fields.into_iter().collect());
                }
            }
            _ => {
                return Err(FetchError::Parse(
                    "extract must be a JSON object or array".to_string(),
                ))
            }
        }

        Ok(Self {
            id: id.to_string(),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl Provider for ExtractProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
        Ok(self.records.get(&lookup_key(term)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_object_extract_case_insensitive() {
        let provider = ExtractProvider::from_json_str(
            "cosing",
            r#"{"Shea Butter": {"inci_name": "Butyrospermum Parkii Butter"}, "bad": 3}"#,
        )
        .unwrap();
        assert_eq!(provider.len(), 1, "non-object entries are ignored");

        let fields = provider.fetch("  shea   BUTTER ").await.unwrap().unwrap();
        assert_eq!(fields["inci_name"], json!("Butyrospermum Parkii Butter"));
        assert_eq!(provider.fetch("Cocoa Butter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_array_extract_first_name_wins() {
        let provider = ExtractProvider::from_json_str(
            "shop",
            r#"[{"name": "Jojoba Oil", "price": 12}, {"name": "jojoba oil", "price": 99}, {"price": 1}]"#,
        )
        .unwrap();
        assert_eq!(provider.len(), 1);
        let fields = provider.fetch("Jojoba Oil").await.unwrap().unwrap();
        assert_eq!(fields["price"], json!(12));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extract.json");
        std::fs::write(&path, r#"{"Mango Butter": {"odor": "faint"}}"#).unwrap();

        let provider = ExtractProvider::load("cosing", &path).await.unwrap();
        assert!(provider.fetch("mango butter").await.unwrap().is_some());
    }

    #[test]
    fn test_scalar_extract_rejected() {
        assert!(ExtractProvider::from_json_str("x", "42").is_err());
    }
}
