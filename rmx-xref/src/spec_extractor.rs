//! Spec Extractor
//!
//! Converts one raw provider record into typed `ExtractedSpecs`, routing each
//! field to specs, descriptors or identifiers and passing every textual value
//! through the Garbage Filter.

use crate::garbage;
use crate::text::{collapse_whitespace, snake_case};
use crate::types::{json_scalar_to_string, ExtractedSpecs, RawFields, SpecMap, SpecValue};
use serde_json::Value;

/// Registry identifiers
const IDENTIFIER_FIELDS: &[&str] = &[
    "inci_name",
    "cas_number",
    "ec_number",
    "pubchem_cid",
    "common_name",
    "iupac_name",
    "molecular_formula",
];

/// Free-text and list descriptors
const DESCRIPTOR_FIELDS: &[&str] = &[
    "description",
    "benefits",
    "uses",
    "appearance",
    "odor",
    "color",
    "synonyms",
    "certifications",
    "aliases",
    "origin",
];

/// Structural keys that never become spec data
const SKIPPED_FIELDS: &[&str] = &["name", "physical_form", "url", "source_url", "id"];

/// Field families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Spec,
    Descriptor,
    Identifier,
}

fn family_of(field: &str) -> Option<Family> {
    if SKIPPED_FIELDS.contains(&field) {
        None
    } else if IDENTIFIER_FIELDS.contains(&field) {
        Some(Family::Identifier)
    } else if DESCRIPTOR_FIELDS.contains(&field) {
        Some(Family::Descriptor)
    } else {
        Some(Family::Spec)
    }
}

/// Extract typed specs from a raw record
pub fn extract(raw: &RawFields) -> ExtractedSpecs {
    let mut out = ExtractedSpecs::default();

    for (name, value) in raw {
        let field = snake_case(name);
        if field.is_empty() {
            continue;
        }

        // One level of nesting: {"fatty_acids": {"oleic": 40}} → fatty_acids_oleic
        if let Value::Object(children) = value {
            for (child_name, child_value) in children {
                let child = format!("{}_{}", field, snake_case(child_name));
                insert_field(&mut out, &child, child_value);
            }
            continue;
        }

        insert_field(&mut out, &field, value);
    }

    out
}

fn insert_field(out: &mut ExtractedSpecs, field: &str, value: &Value) {
    let Some(family) = family_of(field) else {
        return;
    };
    let Some(typed) = to_spec_value(field, value, family) else {
        return;
    };
    let target: &mut SpecMap = match family {
        Family::Spec => &mut out.specs,
        Family::Descriptor => &mut out.descriptors,
        Family::Identifier => &mut out.identifiers,
    };
    target.insert(field.to_string(), typed);
}

fn to_spec_value(field: &str, value: &Value, family: Family) -> Option<SpecValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SpecValue::Flag(*b)),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(SpecValue::Number),
        Value::String(s) => {
            let cleaned = garbage::sanitize(field, s)?;
            if family == Family::Spec {
                if let Some(number) = parse_number(&cleaned) {
                    return Some(SpecValue::Number(number));
                }
                if let Some(flag) = parse_flag(&cleaned) {
                    return Some(SpecValue::Flag(flag));
                }
            }
            Some(SpecValue::Text(cleaned))
        }
        Value::Array(items) => {
            let texts: Vec<String> = items
                .iter()
                .filter(|v| !v.is_null())
                .map(json_scalar_to_string)
                .map(|s| collapse_whitespace(&s))
                .collect();
            garbage::sanitize_list(field, &texts).map(SpecValue::List)
        }
        // Deeper nesting is kept verbatim as text
        Value::Object(_) => garbage::sanitize(field, &value.to_string()).map(SpecValue::Text),
    }
}

/// Plain numeric text ("181", "3.5", "1,200")
fn parse_number(text: &str) -> Option<f64> {
    let compact: String = text.chars().filter(|c| *c != ',').collect();
    compact.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}
