//! Cache key construction
//!
//! Keys are a SHA-256 over every result-affecting parameter. Parameters are held in
//! a sorted map, so the key does not depend on the order parameters were added in.
//! Set-valued parameters (`ids`) are sorted and deduplicated; order-significant
//! ones (`sequence`) are kept as supplied.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Normalize free text for keying: trim, lowercase, collapse whitespace
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builder for a deterministic cache key
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Start a key in `namespace` (e.g. "query", "traversal")
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), normalize_text(value));
        self
    }

    /// Order-insensitive list parameter
    pub fn ids<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<String> = values.into_iter().map(|s| s.as_ref().to_string()).collect();
        ids.sort();
        ids.dedup();
        self.params.insert(name.to_string(), ids.join("\u{1f}"));
        self
    }

    /// Order-sensitive list parameter
    pub fn sequence<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = values.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.params.insert(name.to_string(), items.join("\u{1f}"));
        self
    }

    pub fn number(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Float parameter, fixed precision so 0.5 and 0.50000001 share a key
    pub fn float(mut self, name: &str, value: f32) -> Self {
        self.params.insert(name.to_string(), format!("{:.4}", value));
        self
    }

    pub fn flag(mut self, name: &str, value: bool) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// `namespace:hexdigest`
    pub fn build(self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.params {
            hasher.update(name.as_bytes());
            hasher.update([0x1e]);
            hasher.update(value.as_bytes());
            hasher.update([0x1d]);
        }
        format!("{}:{}", self.namespace, hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_independent_of_order() {
        let a = CacheKeyBuilder::new("traversal")
            .ids("seeds", ["b", "a", "a"])
            .number("depth", 2)
            .float("min_veracity", 0.5)
            .build();
        let b = CacheKeyBuilder::new("traversal")
            .float("min_veracity", 0.5)
            .number("depth", 2)
            .ids("seeds", ["a", "b"])
            .build();
        assert_eq!(a, b);
        assert!(a.starts_with("traversal:"));
    }

    #[test]
    fn test_key_sensitive_to_values() {
        let base = CacheKeyBuilder::new("query").text("q", "What boils?");
        let same = CacheKeyBuilder::new("query").text("q", "  what   BOILS? ");
        let other = CacheKeyBuilder::new("query").text("q", "What freezes?");
        assert_eq!(base.clone().build(), same.build());
        assert_ne!(base.clone().build(), other.build());
        assert_ne!(
            base.clone().number("depth", 1).build(),
            base.number("depth", 2).build()
        );
    }

    #[test]
    fn test_sequence_keeps_order() {
        let zb = CacheKeyBuilder::new("query").sequence("pinned", ["z", "b"]).build();
        let bz = CacheKeyBuilder::new("query").sequence("pinned", ["b", "z"]).build();
        let again = CacheKeyBuilder::new("query").sequence("pinned", ["z", "b"]).build();
        assert_ne!(zb, bz);
        assert_eq!(zb, again);
    }

    #[test]
    fn test_namespace_separates_keys() {
        let q = CacheKeyBuilder::new("query").number("depth", 1).build();
        let t = CacheKeyBuilder::new("traversal").number("depth", 1).build();
        assert_ne!(q, t);
    }
}
