//! Small text helpers shared across stages

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case each whitespace/hyphen separated word ("cold-pressed" → "Cold-Pressed")
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_whitespace() || ch == '-' {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Normalise a field name to snake_case ("Saponification Value" → "saponification_value")
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = ch.is_lowercase() || ch.is_numeric();
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Percentage token such as "2%", "0.5 %" or "10.25%"
pub fn is_percentage(token: &str) -> bool {
    let trimmed = token.trim();
    let Some(number) = trimmed.strip_suffix('%') else {
        return false;
    };
    let number = number.trim_end();
    !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        && number.chars().any(|c| c.is_ascii_digit())
}

/// Escape `%`, `_` and the escape char itself for a LIKE pattern with `ESCAPE '\'`
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
