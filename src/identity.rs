// 🔑 Identity Key Generator
// Stable composite keys + one-way external identifiers
//
// key         = company scope first, then the entity's identity-bearing fields,
//               each normalized and joined with KEY_SEPARATOR
// external id = SHA-256 over (company scope, key), hex encoded
//
// The same (company, key) pair always yields the same external id, across
// processes and over time. Re-running an import therefore upserts.

use sha2::{Digest, Sha256};

/// Separator between key components. Normalized components never contain it.
pub const KEY_SEPARATOR: char = '|';

/// Length of a rendered external id (hex SHA-256)
pub const EXTERNAL_ID_LEN: usize = 64;

/// Normalize one key component
///
/// Lower-cases, keeps letters and digits, and collapses every run of
/// whitespace/punctuation into a single space. Leading and trailing
/// separators are dropped, so "123 Main St" and " 123 MAIN ST. " are equal.
pub fn normalize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;

    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Normalize the company scope
///
/// Only trims and ASCII lower-cases, the same comparison `Company::matches`
/// and the companies table use. Punctuation is significant here: "A-1" and
/// "A.1" are distinct tenants and must never share an external id.
pub fn normalize_scope(company_scope: &str) -> String {
    company_scope.trim().to_ascii_lowercase()
}

/// Compose a key from the company scope and identity-bearing fields
///
/// Absent fields contribute an empty component so positions stay stable:
/// ("acme", [Some("a"), None, Some("b")]) → "acme|a||b".
pub fn compose_key(company_scope: &str, parts: &[Option<&str>]) -> String {
    let mut key = normalize_scope(company_scope);

    for part in parts {
        key.push(KEY_SEPARATOR);
        if let Some(value) = part {
            key.push_str(&normalize_component(value));
        }
    }

    key
}

/// Render the external identifier for (company scope, key)
pub fn external_id(company_scope: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_scope(company_scope).as_bytes());
    // Unit separator keeps ("ab", "c") and ("a", "bc") apart
    hasher.update([0x1f]);
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// True when every identity-bearing component of a key is non-empty
pub fn key_is_complete(key: &str) -> bool {
    key.split(KEY_SEPARATOR).all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_component_collapses_case_and_whitespace() {
        assert_eq!(normalize_component("123 Main St"), "123 main st");
        assert_eq!(normalize_component("  123   MAIN ST. "), "123 main st");
        assert_eq!(normalize_component("O'Brien"), "o brien");
        assert_eq!(normalize_component(""), "");
    }

    #[test]
    fn test_compose_key_is_case_and_whitespace_insensitive() {
        let a = compose_key("ACME1", &[Some("123 Main St"), Some("Anytown"), Some("CA")]);
        let b = compose_key(" acme1", &[Some("123 MAIN ST "), Some("anytown"), Some(" ca")]);

        assert_eq!(a, b);
        assert_eq!(a, "acme1|123 main st|anytown|ca");
    }

    #[test]
    fn test_compose_key_keeps_positions_for_missing_fields() {
        let key = compose_key("acme1", &[Some("a"), None, Some("b")]);
        assert_eq!(key, "acme1|a||b");
        assert!(!key_is_complete(&key));
    }

    #[test]
    fn test_external_id_is_deterministic_and_fixed_length() {
        let key = compose_key("acme1", &[Some("john doe"), Some("123 main st")]);
        let first = external_id("acme1", &key);
        let second = external_id("ACME1", &key);

        assert_eq!(first, second);
        assert_eq!(first.len(), EXTERNAL_ID_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_external_id_never_merges_tenants() {
        let key = compose_key("shared", &[Some("john doe")]);

        assert_ne!(external_id("acme1", &key), external_id("acme2", &key));
    }

    #[test]
    fn test_punctuation_variant_tenants_stay_apart() {
        let dashed = compose_key("A-1", &[Some("John Doe"), Some("123 Main St")]);
        let dotted = compose_key("A.1", &[Some("John Doe"), Some("123 Main St")]);

        assert_eq!(dashed, "a-1|john doe|123 main st");
        assert_ne!(dashed, dotted);
        assert_ne!(external_id("A-1", &dashed), external_id("A.1", &dotted));
        assert_eq!(external_id(" a-1 ", &dashed), external_id("A-1", &dashed));
    }
}
