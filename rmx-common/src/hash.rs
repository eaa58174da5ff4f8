//! Stable record keys
//!
//! SourceItems are keyed by a SHA-256 over their identifying parts so that a
//! re-ingested record lands on the same row. Content hashes detect whether a
//! re-ingested record actually changed.

use sha2::{Digest, Sha256};

/// Separator between hashed parts (cannot appear in normalized text)
const PART_SEPARATOR: u8 = 0x1f;

/// Hash identifying parts into a hex key
///
/// Parts are lowercased and trimmed first, so `("Cosing", " Shea Butter")`
/// and `("cosing", "shea butter")` share a key.
pub fn stable_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([PART_SEPARATOR]);
        }
        hasher.update(part.as_ref().trim().to_lowercase().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hash arbitrary content bytes into a hex digest
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_key_normalizes_case_and_whitespace() {
        assert_eq!(
            stable_key(&["Cosing", " Shea Butter "]),
            stable_key(&["cosing", "shea butter"])
        );
    }

    #[test]
    fn test_stable_key_part_boundaries_matter() {
        assert_ne!(stable_key(&["ab", "c"]), stable_key(&["a", "bc"]));
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash(b"{}");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
