//! Derivative Resolver
//!
//! Decides whether a canonical term names a chemically or industrially
//! modified form of a simpler base ingredient and splits it into
//! `(base_term, variation)`.
//!
//! A term is only considered when it carries a modifier trigger word. The
//! decomposition rules are an ordered strategy list; the first rule that
//! yields a decomposition wins, and no match leaves the term unresolved.

use crate::lexicon::{
    is_modifier_trigger, is_physical_form, BASE_ALIASES, BASE_ALIAS_KEYS, BASE_MODIFIER_PREFIXES,
    MODIFIER_SUFFIXES, MODIFIER_TRIGGERS,
};
use crate::text::collapse_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PEG_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(PEG|PPG)-(\d+)\s+(.+)$").expect("PEG pattern is valid"));

/// Which decomposition rule produced a derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationRule {
    /// `PEG-n` / `PPG-n` adducts
    PegPrefix,
    /// "butter"/"oil" followed by (or fused with) a modifier suffix
    ButterOilSuffix,
    /// Known multi-word modifier suffix with an aliased base remainder
    ModifierSuffix,
    /// Aliased base prefix followed by any modifier
    BasePrefix,
}

/// A resolved derivative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub base_term: String,
    pub variation: String,
    pub rule: DerivationRule,
}

type RuleFn = fn(&str) -> Option<(String, String)>;

/// Decomposition strategies in priority order
const RULES: &[(DerivationRule, RuleFn)] = &[
    (DerivationRule::PegPrefix, peg_prefix),
    (DerivationRule::ButterOilSuffix, butter_oil_suffix),
    (DerivationRule::ModifierSuffix, modifier_suffix),
    (DerivationRule::BasePrefix, base_prefix),
];

/// Candidacy gate: the term carries at least one modifier trigger word
pub fn is_candidate(term: &str) -> bool {
    words(term).iter().any(|word| {
        is_modifier_trigger(word)
            || MODIFIER_TRIGGERS
                .iter()
                .any(|trigger| trigger.len() >= 5 && word.ends_with(trigger))
    })
}

/// Resolve a term into base and variation, if it is a recognised derivative
pub fn resolve(term: &str) -> Option<Derivation> {
    let term = collapse_whitespace(term);
    if !is_candidate(&term) {
        return None;
    }

    for (rule, apply) in RULES {
        if let Some((base_term, variation)) = apply(&term) {
            if base_term.is_empty() || base_term.eq_ignore_ascii_case(&term) {
                continue;
            }
            tracing::debug!(term = %term, base = %base_term, rule = ?rule, "Resolved derivative");
            return Some(Derivation {
                base_term,
                variation,
                rule: *rule,
            });
        }
    }

    tracing::debug!(term = %term, "Derivative candidate with no decomposition");
    None
}

/// Canonicalise a base term's spelling via the alias table
///
/// The longest alias that is the whole text, or a whole leading word group,
/// is replaced by its canonical base ("Oliv Oil" → "Olive Oil"). Other
/// words get a capital first letter ("castor oil" → "Castor Oil").
pub fn canonicalize_base(text: &str) -> String {
    let text = collapse_whitespace(text);
    let lowered = text.to_ascii_lowercase();
    for key in BASE_ALIAS_KEYS.iter() {
        if lowered == *key {
            return BASE_ALIASES[key].to_string();
        }
        if lowered.starts_with(key) && lowered[key.len()..].starts_with(' ') {
            return format!("{} {}", BASE_ALIASES[key], capitalize_words(&text[key.len()..]));
        }
    }
    capitalize_words(&text)
}

fn words(term: &str) -> Vec<String> {
    term.split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

fn has_trigger(text: &str) -> bool {
    words(text).iter().any(|w| is_modifier_trigger(w))
}

/// Uppercase the first letter of each word, leaving the rest untouched
fn capitalize_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// (a) "PEG-7 Olive Oil Esters" → ("Olive Oil", "PEG-7 Esters")
fn peg_prefix(term: &str) -> Option<(String, String)> {
    let caps = PEG_PREFIX.captures(term)?;
    let adduct = format!("{}-{}", caps[1].to_ascii_uppercase(), &caps[2]);
    let mut tokens: Vec<&str> = caps.get(3)?.as_str().split_whitespace().collect();

    let mut trailing = Vec::new();
    while tokens.len() > 1 && tokens.last().map(|t| is_modifier_trigger(t)).unwrap_or(false) {
        if let Some(token) = tokens.pop() {
            trailing.insert(0, token);
        }
    }

    let mut leading = Vec::new();
    while tokens.len() > 1 && BASE_MODIFIER_PREFIXES.contains(&tokens[0].to_ascii_lowercase().as_str()) {
        leading.push(tokens.remove(0));
    }

    let base = canonicalize_base(&tokens.join(" "));
    let mut variation = vec![adduct];
    variation.extend(leading.iter().map(|t| capitalize_words(t)));
    variation.extend(trailing.iter().map(|t| capitalize_words(t)));
    Some((base, variation.join(" ")))
}

/// (b) "Shea Butter Ethyl Esters" → ("Shea Butter", "Ethyl Esters");
/// fused "Shea Butteramidopropyl Betaine" → ("Shea Butter", "Amidopropyl Betaine")
fn butter_oil_suffix(term: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = term.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate().skip(1) {
        let lowered = token.to_ascii_lowercase();
        for word in ["butter", "oil"] {
            if lowered == word && i + 1 < tokens.len() {
                let suffix = tokens[i + 1..].join(" ");
                if has_trigger(&suffix) {
                    let base = canonicalize_base(&tokens[..=i].join(" "));
                    return Some((base, capitalize_words(&suffix)));
                }
            }

            if lowered.starts_with(word) && lowered.len() >= word.len() + 3 {
                let fused_rest = &token[word.len()..];
                let mut suffix_tokens = vec![fused_rest];
                suffix_tokens.extend(&tokens[i + 1..]);
                let suffix = suffix_tokens.join(" ");
                if is_candidate(&suffix) {
                    let mut base_tokens: Vec<String> =
                        tokens[..i].iter().map(|t| t.to_string()).collect();
                    base_tokens.push(capitalize_words(word));
                    let base = canonicalize_base(&base_tokens.join(" "));
                    return Some((base, capitalize_words(&suffix)));
                }
            }
        }
    }
    None
}

/// (c) "Coconut Amidopropyl Betaine" → ("Coconut", "Amidopropyl Betaine");
/// "Cocamidopropyl Betaine" → ("Coconut", "Amidopropyl Betaine")
fn modifier_suffix(term: &str) -> Option<(String, String)> {
    // ASCII lowercasing keeps byte offsets aligned with `term`
    let lowered = term.to_ascii_lowercase();

    for suffix in MODIFIER_SUFFIXES.iter() {
        if !lowered.ends_with(suffix) || lowered.len() <= suffix.len() {
            continue;
        }
        let split = lowered.len() - suffix.len();
        if !term.is_char_boundary(split) {
            continue;
        }

        let mut remainder: Vec<&str> = term[..split].split_whitespace().collect();
        while remainder.len() > 1 && remainder.last().map(|t| is_physical_form(t)).unwrap_or(false) {
            remainder.pop();
        }
        let remainder = remainder.join(" ").to_ascii_lowercase();
        if let Some(base) = BASE_ALIASES.get(remainder.as_str()) {
            return Some((base.to_string(), capitalize_words(term[split..].trim())));
        }
    }
    None
}

/// (d) Aliased base prefix plus a modifier anywhere after it
fn base_prefix(term: &str) -> Option<(String, String)> {
    let lowered = term.to_ascii_lowercase();

    for key in BASE_ALIAS_KEYS.iter() {
        if !lowered.starts_with(key) || !term.is_char_boundary(key.len()) {
            continue;
        }
        let rest = &term[key.len()..];
        if rest.trim().is_empty() {
            continue;
        }

        let fused = !rest.starts_with(' ');
        if fused {
            // "Cocamide": the fused tail must itself open with a modifier
            let first = rest.split_whitespace().next().unwrap_or_default().to_ascii_lowercase();
            let opens_with_modifier = MODIFIER_TRIGGERS
                .iter()
                .any(|trigger| trigger.len() >= 4 && first.starts_with(trigger));
            if !opens_with_modifier {
                continue;
            }
        }

        if is_candidate(rest) {
            return Some((BASE_ALIASES[key].to_string(), capitalize_words(rest.trim())));
        }
    }
    None
}
