//! Cache key management utilities.
//!
//! All consumers share one cache, so keys must carry every parameter that
//! changes the fetched data (workshop id, page, filter) to stay distinct.

use std::fmt::Display;

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build a key from a namespace and an id: `"{prefix}:{id}"`.
    pub fn build(prefix: &str, id: &dyn Display) -> String {
        format!("{}:{}", prefix, id)
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }

    /// Build a key from a namespace plus named parameters.
    ///
    /// Parameters are sorted by name so argument order does not create
    /// distinct keys for the same query.
    ///
    /// ```
    /// use fetch_kit::key::CacheKeyBuilder;
    ///
    /// let a = CacheKeyBuilder::with_params("tasks", &[("workshop", "w1"), ("page", "2")]);
    /// let b = CacheKeyBuilder::with_params("tasks", &[("page", "2"), ("workshop", "w1")]);
    /// assert_eq!(a, "tasks?page=2&workshop=w1");
    /// assert_eq!(a, b);
    /// ```
    pub fn with_params(prefix: &str, params: &[(&str, &str)]) -> String {
        if params.is_empty() {
            return prefix.to_string();
        }
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_unstable();
        let query: Vec<String> = sorted
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}?{}", prefix, query.join("&"))
    }

    /// Parse a composite key into parts.
    pub fn parse(key: &str) -> Vec<&str> {
        key.split(':').collect()
    }
}
