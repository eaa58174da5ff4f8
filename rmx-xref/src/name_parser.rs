//! Name Parser
//!
//! Lexical decomposition of a raw ingredient name into
//! `(term, variation, physical_form)`. Ordered rules, first match per slot wins:
//!
//! 1. Parenthetical content that is a percentage or variation keyword → variation
//!    (every parenthetical is removed from the working name)
//! 2. Trailing percentage token → variation
//! 3. First comma: head is kept, a variation-keyword tail → variation
//! 4. Trailing physical-form word → physical_form (unless given explicitly)
//! 5. Trailing inline-variation word(s) or percentage → variation
//! 6. Remaining tokens → term; empty falls back to the whole name
//!
//! No grammar is attempted. A brand name ending in a form word will mis-parse;
//! such cases are flagged `ambiguous` where detectable and corrected later
//! through seed overrides.

use crate::lexicon::{is_physical_form, is_variation_keyword, INLINE_VARIATIONS, INLINE_VARIATION_PAIRS};
use crate::text::{collapse_whitespace, is_percentage, title_case};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]*)\)").expect("parenthetical pattern is valid"));

/// Parser output for one raw name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedName {
    /// Ingredient term with form and variation removed ("Shea")
    pub term: String,
    /// Grade/variant ("Refined", "2%"), empty when none
    pub variation: String,
    /// Physical form ("Butter"), empty when none
    pub physical_form: String,
    /// Term plus the form word when the form came from the name ("Shea Butter")
    pub stem: String,
    /// Low-confidence decomposition (ParseAmbiguity)
    pub ambiguous: bool,
}

impl ParsedName {
    /// Cluster identity: `lower(stem)|lower(variation)`
    pub fn cluster_key(&self) -> String {
        cluster_key(&self.stem, &self.variation)
    }
}

/// Cluster identity for a stem/variation pair
pub fn cluster_key(stem: &str, variation: &str) -> String {
    format!(
        "{}|{}",
        collapse_whitespace(stem).to_lowercase(),
        collapse_whitespace(variation).to_lowercase()
    )
}

/// Parse a raw name, optionally with a physical form supplied by the source
pub fn parse(raw_name: &str, explicit_form: Option<&str>) -> ParsedName {
    let normalized = collapse_whitespace(raw_name);
    let explicit_form = explicit_form
        .map(collapse_whitespace)
        .filter(|f| !f.is_empty());

    let mut variation: Option<String> = None;
    let mut ambiguous = false;

    // Rule 1: parentheticals
    for caps in PARENTHETICAL.captures_iter(&normalized) {
        let inner = caps[1].trim();
        if variation.is_none() {
            variation = variation_from(inner);
        }
    }
    let working = PARENTHETICAL.replace_all(&normalized, " ");
    let mut working = collapse_whitespace(&working.replace(['(', ')'], " "));

    // Rule 2: trailing percentage of the whole name, before any comma split
    let trailing = working
        .rsplit(|c: char| c.is_whitespace() || c == ',')
        .next()
        .filter(|t| is_percentage(t))
        .map(str::to_string);
    if let Some(token) = trailing {
        working.truncate(working.len() - token.len());
        working = working
            .trim_end_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string();
        if variation.is_none() {
            variation = Some(token);
        }
    }

    // Rule 3 runs on the whole string so a comma tail never reaches the tokens
    let (head, tail) = match working.split_once(',') {
        Some((head, tail)) => (head.trim().to_string(), Some(tail.trim().to_string())),
        None => (working.clone(), None),
    };

    let mut tokens: Vec<String> = head.split_whitespace().map(str::to_string).collect();

    // A percentage closing the head of a comma-split name
    if tokens.last().map(|t| is_percentage(t)).unwrap_or(false) {
        let token = tokens.pop().unwrap_or_default();
        if variation.is_none() {
            variation = Some(token);
        }
    }

    if variation.is_none() {
        if let Some(tail) = tail.as_deref() {
            if is_variation_keyword(tail) {
                variation = Some(title_case(tail));
            }
        }
    }

    // Rule 4: physical form
    let mut form_from_name = false;
    let physical_form = match &explicit_form {
        Some(form) => {
            if let Some(last) = tokens.last() {
                if is_physical_form(last) && !last.eq_ignore_ascii_case(form) {
                    ambiguous = true;
                }
            }
            title_case(form)
        }
        None => match tokens.last() {
            Some(last) if is_physical_form(last) => {
                form_from_name = true;
                title_case(&tokens.pop().unwrap_or_default())
            }
            _ => String::new(),
        },
    };

    // Rule 5: inline variation
    if variation.is_none() {
        variation = pop_inline_variation(&mut tokens);
    }

    // Rule 6: term
    let mut term = tokens.join(" ");
    let fell_back = term.is_empty();
    if fell_back {
        term = working.clone();
        if term.is_empty() {
            term = normalized.clone();
        }
        ambiguous = true;
    }

    let stem = if form_from_name && !fell_back {
        format!("{} {}", term, physical_form)
    } else {
        term.clone()
    };

    let parsed = ParsedName {
        term,
        variation: variation.unwrap_or_default(),
        physical_form,
        stem,
        ambiguous,
    };

    if parsed.ambiguous {
        tracing::debug!(raw_name = %raw_name, term = %parsed.term, "Ambiguous name parse");
    }

    parsed
}

/// A parenthetical or comma tail that names a variation
fn variation_from(text: &str) -> Option<String> {
    if is_percentage(text) {
        Some(text.replace(' ', ""))
    } else if is_variation_keyword(text) {
        Some(title_case(text))
    } else {
        None
    }
}

fn pop_inline_variation(tokens: &mut Vec<String>) -> Option<String> {
    if tokens.len() >= 2 {
        let pair = format!(
            "{} {}",
            tokens[tokens.len() - 2].to_ascii_lowercase(),
            tokens[tokens.len() - 1].to_ascii_lowercase()
        );
        if INLINE_VARIATION_PAIRS.contains(&pair.as_str()) {
            tokens.truncate(tokens.len() - 2);
            return Some(title_case(&pair));
        }
    }

    let last = tokens.last()?;
    if is_percentage(last) {
        return tokens.pop();
    }
    if INLINE_VARIATIONS.contains(last.to_ascii_lowercase().as_str()) {
        return tokens.pop().map(|t| title_case(&t));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(p: &ParsedName) -> (&str, &str, &str) {
        (p.term.as_str(), p.variation.as_str(), p.physical_form.as_str())
    }

    #[test]
    fn test_plain_form_suffix() {
        let parsed = parse("Shea Butter", None);
        assert_eq!(triple(&parsed), ("Shea", "", "Butter"));
        assert_eq!(parsed.stem, "Shea Butter");
        assert!(!parsed.ambiguous);
    }

    #[test]
    fn test_percentage_before_form() {
        let parsed = parse("Salicylic Acid 2% Solution", None);
        assert_eq!(triple(&parsed), ("Salicylic Acid", "2%", "Solution"));
    }

    #[test]
    fn test_parenthetical_variation() {
        let parsed = parse("Shea Butter (Refined)", None);
        assert_eq!(triple(&parsed), ("Shea", "Refined", "Butter"));
        assert_eq!(parsed.stem, "Shea Butter");
        assert_eq!(parsed.cluster_key(), "shea butter|refined");
    }

    #[test]
    fn test_non_variation_parenthetical_removed() {
        let parsed = parse("Shea Butter (Butyrospermum Parkii)", None);
        assert_eq!(triple(&parsed), ("Shea", "", "Butter"));
    }

    #[test]
    fn test_parenthetical_percentage() {
        let parsed = parse("Niacinamide (10%) Powder", None);
        assert_eq!(triple(&parsed), ("Niacinamide", "10%", "Powder"));
    }

    #[test]
    fn test_trailing_percentage() {
        let parsed = parse("Hyaluronic Acid 1%", None);
        assert_eq!(triple(&parsed), ("Hyaluronic Acid", "1%", ""));
    }

    #[test]
    fn test_percentage_after_comma() {
        let parsed = parse("Glycolic Acid, 70%", None);
        assert_eq!(triple(&parsed), ("Glycolic Acid", "70%", ""));
        assert_eq!(parsed.cluster_key(), "glycolic acid|70%");
    }

    #[test]
    fn test_comma_tail_variation() {
        let parsed = parse("Cocoa Butter, Unrefined", None);
        assert_eq!(triple(&parsed), ("Cocoa", "Unrefined", "Butter"));
    }

    #[test]
    fn test_comma_tail_noise_dropped() {
        let parsed = parse("Jojoba Oil, 16 oz bottle", None);
        assert_eq!(triple(&parsed), ("Jojoba", "", "Oil"));
    }

    #[test]
    fn test_inline_variation_pair() {
        let parsed = parse("Olive Oil Extra Virgin", None);
        assert_eq!(triple(&parsed), ("Olive Oil", "Extra Virgin", ""));

        let parsed = parse("Coconut Virgin Oil", None);
        assert_eq!(triple(&parsed), ("Coconut", "Virgin", "Oil"));
    }

    #[test]
    fn test_explicit_form_not_popped() {
        let parsed = parse("Mango Butter", Some("solid"));
        assert_eq!(triple(&parsed), ("Mango Butter", "", "Solid"));
        assert!(parsed.ambiguous, "form word disagrees with explicit form");
        assert_eq!(parsed.stem, "Mango Butter");
    }

    #[test]
    fn test_explicit_form_agreeing() {
        let parsed = parse("Mango Butter", Some("butter"));
        assert!(!parsed.ambiguous);
        assert_eq!(parsed.physical_form, "Butter");
    }

    #[test]
    fn test_fallback_to_whole_name() {
        let parsed = parse("Butter", None);
        assert_eq!(parsed.term, "Butter");
        assert!(parsed.ambiguous);
        assert_eq!(parsed.stem, "Butter");
    }

    #[test]
    fn test_whitespace_normalised() {
        let parsed = parse("  Jojoba   Oil ", None);
        assert_eq!(parsed.stem, "Jojoba Oil");
    }
}
