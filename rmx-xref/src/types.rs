//! Core Types and Trait Definitions for RMX-XREF
//!
//! Defines the provider seam of the Source Broker and the typed value model
//! shared by the extractor, the merger and the seed linker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Raw and typed field values
// ============================================================================

/// Raw provider record: field name → untyped JSON value
pub type RawFields = BTreeMap<String, serde_json::Value>;

/// Typed spec map (field name → value); ordered for reproducible output
pub type SpecMap = BTreeMap<String, SpecValue>;

/// One typed field value after extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl SpecValue {
    /// Empty text or an empty list counts as no value
    pub fn is_empty(&self) -> bool {
        match self {
            SpecValue::Text(s) => s.trim().is_empty(),
            SpecValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
            SpecValue::Flag(_) | SpecValue::Number(_) => false,
        }
    }

    /// Text content, when this value is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SpecValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert an arbitrary JSON value without any cleaning
    ///
    /// Used for curated seed specs, which are authoritative as written.
    pub fn from_json(value: &serde_json::Value) -> Option<SpecValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(SpecValue::Flag(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(SpecValue::Number),
            serde_json::Value::String(s) => Some(SpecValue::Text(s.clone())),
            serde_json::Value::Array(items) => Some(SpecValue::List(
                items.iter().map(json_scalar_to_string).collect(),
            )),
            serde_json::Value::Object(_) => Some(SpecValue::Text(value.to_string())),
        }
    }
}

impl fmt::Display for SpecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecValue::Flag(b) => write!(f, "{}", b),
            SpecValue::Number(n) => write!(f, "{}", n),
            SpecValue::Text(s) => write!(f, "{}", s),
            SpecValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

/// Render a JSON scalar as plain text (strings unquoted)
pub fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Spec Extractor output: the three field families of a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSpecs {
    /// Measured/technical properties (saponification value, melting point…)
    #[serde(default)]
    pub specs: SpecMap,
    /// Free-text and list descriptors (description, benefits, synonyms…)
    #[serde(default)]
    pub descriptors: SpecMap,
    /// Registry identifiers (INCI, CAS, EC…)
    #[serde(default)]
    pub identifiers: SpecMap,
}

impl ExtractedSpecs {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty() && self.descriptors.is_empty() && self.identifiers.is_empty()
    }

    /// Non-empty `common_name` identifier, if any
    pub fn common_name(&self) -> Option<&str> {
        self.identifiers
            .get("common_name")
            .and_then(SpecValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Linkage status
// ============================================================================

/// Linkage status of a SourceItem or seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Attached to a cluster/definition (or merged form, for seeds)
    Linked,
    /// Could not be matched; kept for manual follow-up
    Orphan,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Linked => "linked",
            ItemStatus::Orphan => "orphan",
        }
    }

    pub fn parse(value: &str) -> ItemStatus {
        if value.eq_ignore_ascii_case("linked") {
            ItemStatus::Linked
        } else {
            ItemStatus::Orphan
        }
    }
}

// ============================================================================
// Provider trait (Source Broker seam)
// ============================================================================

/// A single external source of raw records
///
/// Each implementation performs either a read-only network lookup or a
/// lookup against a previously captured extract. Errors stay inside the
/// provider boundary: the broker turns them into "no data" for the term.
///
/// # Example
/// ```rust,ignore
/// use rmx_xref::types::{Provider, RawFields, FetchError};
///
/// struct Fixed;
///
/// #[async_trait::async_trait]
/// impl Provider for Fixed {
///     fn source_id(&self) -> &str { "fixed" }
///     async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Source id, matching a `[[sources]]` entry
    fn source_id(&self) -> &str;

    /// Look up one term
    ///
    /// `Ok(None)` means the source has no record for the term.
    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError>;
}

/// Provider-internal failure (SourceFetchFailure)
#[derive(Debug, Error)]
pub enum FetchError {
    /// I/O error reading an extract
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the provider timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Provider answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// Response or extract could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider is not usable in this run
    #[error("Provider not available: {0}")]
    NotAvailable(String),
}
