//! Garbage Filter
//!
//! Stateless sanitizer for scraped field text. Every value passes through the
//! same rules at first ingestion and at every later re-extraction, so fresh
//! and previously corrupted rows converge to the same clean value.
//!
//! Rule order for a single value:
//! 1. Collapse whitespace
//! 2. Field-specific secondary rule (description marker truncation, CAS check)
//! 3. Global denylist, then the per-field denylist
//!
//! A match on a denylist pattern discards the value; it never survives raw.

use crate::text::collapse_whitespace;
use crate::types::SpecValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Result of filtering one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Value is clean as given
    Keep,
    /// Value was repaired; use the contained text
    Clean(String),
    /// Value is corrupted or meaningless; treat the field as absent
    Discard,
}

/// Scrape-corruption signatures applied to every field
static GLOBAL_DENYLIST: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)<\s*/?\s*(script|style|div|span|iframe|noscript)\b",
        r"(?i)\b(gtag|dataLayer|googletag|fbq|_gaq)\s*[\.(\[]",
        r"(?i)function\s*\(\s*\)\s*\{",
        r"(?i)window\.(location|onload|addEventListener)",
        r"(?i)\b(accept|manage)\s+(all\s+)?cookies\b",
        r"(?i)\bsubscribe\s+to\s+(our|the)\s+newsletter\b",
        r"(?i)\b(add\s+to\s+cart|add\s+to\s+basket|checkout\s+now)\b",
        r"\{\{\s*[\w.]+\s*\}\}",
        r"\$\{\s*\w+\s*\}",
        r"(?i)^(n/?a|none|null|undefined|unknown|-+|\.+|\?+)$",
        r"(?i)\blorem\s+ipsum\b",
    ])
});

/// Field-specific corruption signatures
static FIELD_DENYLIST: Lazy<HashMap<&'static str, Vec<Regex>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "description",
        compile(&[
            r"(?i)^(description|product description|overview)\s*:?$",
            r"(?i)\bclick\s+here\b",
            r"(?i)\bread\s+more\b\s*$",
            r"(?i)\b(customers\s+also\s+(bought|viewed))\b",
        ]),
    );
    map.insert(
        "benefits",
        compile(&[
            r"(?i)^(benefits|key benefits)\s*:?$",
            r"(?i)\bsee\s+all\s+benefits\b",
        ]),
    );
    map.insert(
        "uses",
        compile(&[r"(?i)^(uses|how to use|applications)\s*:?$", r"(?i)\bshop\s+now\b"]),
    );
    map.insert(
        "appearance",
        compile(&[r"(?i)^(appearance|color|colour)\s*:?$", r"(?i)\bsee\s+(image|photo)\b"]),
    );
    map.insert("odor", compile(&[r"(?i)^(odou?r|scent|aroma)\s*:?$"]));
    map.insert(
        "synonyms",
        compile(&[r"(?i)^(synonyms?|other names)\s*:?$", r"(?i)\bmore\.\.\.$"]),
    );
    map.insert(
        "common_name",
        compile(&[r"(?i)^(common name|name)\s*:?$", r"(?i)\b(buy|sale|discount)\b"]),
    );
    map
});

/// Markers at which a scraped description runs into an unrelated page section
const DESCRIPTION_MARKERS: &[&str] = &[
    "Safety Information",
    "Related Ingredients",
    "See also:",
    "References:",
    "Frequently Asked Questions",
];

static CAS_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2,7})-(\d{2})-(\d)$").expect("CAS pattern is valid")
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("denylist pattern is valid"))
        .collect()
}

/// Filter one string value of `field`
pub fn filter(field: &str, value: &str) -> FilterOutcome {
    let collapsed = collapse_whitespace(value);

    let candidate = match field {
        "description" => truncate_at_marker(&collapsed),
        "cas_number" => {
            if !is_valid_cas(&collapsed) {
                return FilterOutcome::Discard;
            }
            collapsed
        }
        _ => collapsed,
    };

    if candidate.is_empty() || matches_denylist(field, &candidate) {
        return FilterOutcome::Discard;
    }

    if candidate == value {
        FilterOutcome::Keep
    } else {
        FilterOutcome::Clean(candidate)
    }
}

/// Filter a value and return the surviving text, if any
pub fn sanitize(field: &str, value: &str) -> Option<String> {
    match filter(field, value) {
        FilterOutcome::Keep => Some(value.to_string()),
        FilterOutcome::Clean(cleaned) => Some(cleaned),
        FilterOutcome::Discard => None,
    }
}

/// Element-wise filter; a list reduced to nothing is absent
pub fn sanitize_list<S: AsRef<str>>(field: &str, values: &[S]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = values
        .iter()
        .filter_map(|v| sanitize(field, v.as_ref()))
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Whether an already-typed value should be treated as garbage
///
/// Text is garbage when it would not survive unchanged; a list is garbage
/// when none of its elements survive. Numbers and flags are never garbage.
pub fn is_garbage(field: &str, value: &SpecValue) -> bool {
    match value {
        SpecValue::Text(text) => !matches!(filter(field, text), FilterOutcome::Keep),
        SpecValue::List(items) => sanitize_list(field, items).is_none(),
        SpecValue::Number(n) => !n.is_finite(),
        SpecValue::Flag(_) => false,
    }
}

fn matches_denylist(field: &str, value: &str) -> bool {
    if GLOBAL_DENYLIST.iter().any(|re| re.is_match(value)) {
        return true;
    }
    FIELD_DENYLIST
        .get(field)
        .map(|patterns| patterns.iter().any(|re| re.is_match(value)))
        .unwrap_or(false)
}

fn truncate_at_marker(value: &str) -> String {
    let cut = DESCRIPTION_MARKERS
        .iter()
        .filter_map(|marker| value.find(marker))
        .min();
    match cut {
        Some(index) => value[..index].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// CAS registry number: format and check digit
pub fn is_valid_cas(value: &str) -> bool {
    let Some(caps) = CAS_FORMAT.captures(value.trim()) else {
        return false;
    };
    let digits: String = format!("{}{}", &caps[1], &caps[2]);
    let check: u32 = caps[3].parse().unwrap_or(10);
    let sum: u32 = digits
        .chars()
        .rev()
        .enumerate()
        .filter_map(|(i, c)| c.to_digit(10).map(|d| d * (i as u32 + 1)))
        .sum();
    sum % 10 == check
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_value_kept() {
        assert_eq!(filter("description", "A rich, creamy butter."), FilterOutcome::Keep);
    }

    #[test]
    fn test_whitespace_collapsed_is_clean() {
        assert_eq!(
            filter("odor", "  faint   nutty "),
            FilterOutcome::Clean("faint nutty".to_string())
        );
    }

    #[test]
    fn test_script_fragment_discarded() {
        let raw = "Nice butter <script>gtag('config')</script>";
        assert_eq!(filter("description", raw), FilterOutcome::Discard);
        assert_eq!(sanitize("benefits", "window.location = '/cart'"), None);
    }

    #[test]
    fn test_placeholder_values_discarded() {
        for raw in ["N/A", "none", "-", "unknown", "  "] {
            assert_eq!(sanitize("appearance", raw), None, "{:?} should be discarded", raw);
        }
    }

    #[test]
    fn test_description_truncated_at_marker() {
        let raw = "Shea butter is a fat from the shea nut. Safety Information Keep away from eyes.";
        assert_eq!(
            sanitize("description", raw).as_deref(),
            Some("Shea butter is a fat from the shea nut.")
        );
    }

    #[test]
    fn test_description_marker_only_is_absent() {
        assert_eq!(sanitize("description", "Related Ingredients: Cocoa Butter"), None);
    }

    #[test]
    fn test_field_specific_pattern_only_hits_its_field() {
        assert_eq!(sanitize("uses", "Shop now"), None);
        assert_eq!(sanitize("origin", "Shop now").as_deref(), Some("Shop now"));
    }

    #[test]
    fn test_list_filtered_elementwise() {
        let values = vec!["Butyrospermum Parkii".to_string(), "N/A".to_string()];
        assert_eq!(
            sanitize_list("synonyms", &values),
            Some(vec!["Butyrospermum Parkii".to_string()])
        );
        let junk = vec!["-".to_string(), "unknown".to_string()];
        assert_eq!(sanitize_list("synonyms", &junk), None);
    }

    #[test]
    fn test_cas_check_digit() {
        assert!(is_valid_cas("7732-18-5"), "water");
        assert!(is_valid_cas("69-72-7"), "salicylic acid");
        assert!(!is_valid_cas("7732-18-4"));
        assert!(!is_valid_cas("not-a-cas"));
        assert_eq!(sanitize("cas_number", "7732-18-4"), None);
    }

    #[test]
    fn test_is_garbage_on_typed_values() {
        assert!(is_garbage("description", &SpecValue::Text("N/A".into())));
        assert!(!is_garbage("description", &SpecValue::Text("Clean text".into())));
        assert!(!is_garbage("saponification_value", &SpecValue::Number(181.0)));
        assert!(is_garbage("synonyms", &SpecValue::List(vec!["none".into()])));
    }
}
