//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "RMX_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "RMX_CONFIG";

/// Source id reserved for curated seed items
pub const SEED_SOURCE_ID: &str = "seed";

/// Database file name inside the root folder
const DATABASE_FILE: &str = "rmx.db";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the pipeline database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Providers in precedence order (first entry wins merges)
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Tunables shared by every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per committed batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent terms in flight during ingestion
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory of seed documents
    #[serde(default)]
    pub seed_dir: Option<PathBuf>,
    /// Newline-separated list of terms to gather
    #[serde(default)]
    pub terms_file: Option<PathBuf>,
    /// Confidence given to synthetic base clusters
    #[serde(default = "default_synthetic_confidence")]
    pub synthetic_confidence: f64,
    /// Longest canonical term eligible for a substring parent match
    #[serde(default = "default_substring_max_len")]
    pub substring_max_len: usize,
    /// Extra characters a seed substring match may carry
    #[serde(default = "default_seed_substring_slack")]
    pub seed_substring_slack: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            seed_dir: None,
            terms_file: None,
            synthetic_confidence: default_synthetic_confidence(),
            substring_max_len: default_substring_max_len(),
            seed_substring_slack: default_seed_substring_slack(),
        }
    }
}

/// How a provider obtains its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Read-only HTTP lookup
    Http,
    /// Lookup in a previously captured JSON extract
    Extract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    /// URL template containing `{term}` (http sources)
    #[serde(default)]
    pub url: Option<String>,
    /// Extract file path (extract sources)
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between two requests to the same provider
    #[serde(default)]
    pub min_interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_workers() -> usize {
    4
}
fn default_synthetic_confidence() -> f64 {
    0.5
}
fn default_substring_max_len() -> usize {
    32
}
fn default_seed_substring_slack() -> usize {
    12
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_enabled() -> bool {
    true
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config("pipeline.batch_size must be > 0".to_string()));
        }
        if self.pipeline.workers == 0 {
            return Err(Error::Config("pipeline.workers must be > 0".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            let id = source.id.trim().to_lowercase();
            if id.is_empty() {
                return Err(Error::Config("source id must not be empty".to_string()));
            }
            if !seen.insert(id.clone()) {
                return Err(Error::Config(format!("duplicate source id: {}", source.id)));
            }
            match source.kind {
                SourceKind::Http => match &source.url {
                    Some(url) if url.contains("{term}") => {}
                    _ => {
                        return Err(Error::Config(format!(
                            "http source '{}' needs a url containing {{term}}",
                            source.id
                        )))
                    }
                },
                SourceKind::Extract => {
                    if source.path.is_none() {
                        return Err(Error::Config(format!(
                            "extract source '{}' needs a path",
                            source.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Source ids in merge precedence order
    ///
    /// Disabled sources keep their slot so that previously ingested rows still
    /// merge in a stable order. The seed source is appended last unless listed.
    pub fn source_precedence(&self) -> Vec<String> {
        let mut order: Vec<String> = self
            .sources
            .iter()
            .map(|s| s.id.trim().to_lowercase())
            .collect();
        if !order.iter().any(|id| id == SEED_SOURCE_ID) {
            order.push(SEED_SOURCE_ID.to_string());
        }
        order
    }
}

/// Load configuration following the priority order:
/// 1. Explicit path (command-line argument)
/// 2. Environment variable
/// 3. User config file (`<config dir>/rmx/config.toml`)
/// 4. Built-in defaults
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let path = match cli_path {
        Some(path) => Some(path.to_path_buf()),
        None => match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => user_config_file().filter(|p| p.exists()),
        },
    };

    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Read config {} failed: {}", path.display(), e))
            })?;
            tracing::info!("Configuration loaded from {}", path.display());
            TomlConfig::from_toml_str(&content)
        }
        None => {
            tracing::info!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config `root_folder`
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rmx").join("config.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rmx"))
        .unwrap_or_else(|| PathBuf::from("./rmx_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
        root_folder = "/tmp/rmx-test"

        [pipeline]
        batch_size = 25

        [[sources]]
        id = "cosing"
        kind = "extract"
        path = "extracts/cosing.json"

        [[sources]]
        id = "pubchem"
        kind = "http"
        url = "https://example.invalid/compound/{term}"
        timeout_secs = 5
    "#;

    #[test]
    fn test_parse_sample_config() {
        let config = TomlConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.pipeline.workers, 4, "workers should default to 4");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].timeout_secs, 5);
        assert!(config.sources[0].enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_precedence_appends_seed_source() {
        let config = TomlConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.source_precedence(), vec!["cosing", "pubchem", "seed"]);
    }

    #[test]
    fn test_precedence_keeps_explicit_seed_slot() {
        let mut config = TomlConfig::from_toml_str(SAMPLE).unwrap();
        config.sources.insert(
            0,
            SourceConfig {
                id: "seed".to_string(),
                kind: SourceKind::Extract,
                url: None,
                path: Some(PathBuf::from("unused.json")),
                timeout_secs: 10,
                min_interval_ms: 0,
                enabled: false,
            },
        );
        assert_eq!(config.source_precedence(), vec!["seed", "cosing", "pubchem"]);
    }

    #[test]
    fn test_http_source_requires_term_placeholder() {
        let bad = r#"
            [[sources]]
            id = "shop"
            kind = "http"
            url = "https://example.invalid/search"
        "#;
        assert!(matches!(TomlConfig::from_toml_str(bad), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_source_ids_rejected() {
        let bad = r#"
            [[sources]]
            id = "cosing"
            kind = "extract"
            path = "a.json"

            [[sources]]
            id = "COSING"
            kind = "extract"
            path = "b.json"
        "#;
        assert!(TomlConfig::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let bad = "[pipeline]\nbatch_size = 0\n";
        assert!(TomlConfig::from_toml_str(bad).is_err());
    }

    #[test]
    #[serial]
    fn test_root_folder_cli_beats_config() {
        std::env::remove_var(ROOT_FOLDER_ENV);
        let config = TomlConfig::from_toml_str(SAMPLE).unwrap();
        let cli = PathBuf::from("/opt/rmx");
        assert_eq!(resolve_root_folder(Some(&cli), &config), cli);
        assert_eq!(
            resolve_root_folder(None, &config),
            PathBuf::from("/tmp/rmx-test")
        );
    }

    #[test]
    #[serial]
    fn test_root_folder_env_beats_config() {
        std::env::set_var(ROOT_FOLDER_ENV, "/srv/rmx");
        let config = TomlConfig::from_toml_str(SAMPLE).unwrap();
        let resolved = resolve_root_folder(None, &config);
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolved, PathBuf::from("/srv/rmx"));
    }

    #[test]
    #[serial]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sources[0].id, "cosing");
    }
}
