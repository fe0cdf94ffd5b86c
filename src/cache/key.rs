//! Content-addressed cache keys.
//!
//! A key is the SHA-256 of the connection id, the payload signature and
//! the filter values sorted by name, rendered as 64 lowercase hex chars.
//! Each field is length-prefixed so that moving bytes across a field
//! boundary yields a different key.

use sha2::{Digest, Sha256};

use crate::types::FilterValues;

/// Build the cache key for a component invocation.
///
/// Filter insertion order never affects the result.
pub fn build_key(connection_id: &str, payload_signature: &str, filters: &FilterValues) -> String {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, connection_id.as_bytes());
    write_field(&mut hasher, payload_signature.as_bytes());

    let mut names: Vec<&String> = filters.keys().collect();
    names.sort();
    hasher.update((names.len() as u64).to_le_bytes());
    for name in names {
        write_field(&mut hasher, name.as_bytes());
        // serde_json renders nested objects with sorted keys
        let value = filters[name].to_string();
        write_field(&mut hasher, value.as_bytes());
    }

    hex::encode(hasher.finalize())
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Short key prefix for log lines.
pub(crate) fn short(key: &str) -> &str {
    &key[..16.min(key.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_fixed_width_hex() {
        let key = build_key("db", "select 1", &FilterValues::new());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_boundaries_matter() {
        let filters = FilterValues::new();
        assert_ne!(build_key("ab", "c", &filters), build_key("a", "bc", &filters));
    }

    #[test]
    fn filter_value_type_matters() {
        let mut a = FilterValues::new();
        a.insert("id".into(), json!(1));
        let mut b = FilterValues::new();
        b.insert("id".into(), json!("1"));
        assert_ne!(build_key("db", "q", &a), build_key("db", "q", &b));
    }

    #[test]
    fn short_prefix() {
        assert_eq!(short("0123456789abcdef0123"), "0123456789abcdef");
        assert_eq!(short("abc"), "abc");
    }
}
