//! Logical query identity.

use std::fmt;

use crate::store::{EntityClass, StoreKey};

/// Ordered segments identifying a query, e.g. `["analysis", "INFY"]`.
///
/// The first segment is conventionally the entity class name, which is what
/// class-wide invalidation matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Prefix matching every query of `class`.
    pub fn for_class(class: EntityClass) -> Self {
        Self(vec![class.as_str().to_string()])
    }

    /// Append a segment.
    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<&StoreKey> for QueryKey {
    fn from(key: &StoreKey) -> Self {
        let mut parts = vec![key.class().as_str().to_string()];
        parts.extend(key.parts());
        Self(parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_prefix_matching() {
        let key = QueryKey::new(["analysis", "INFY"]);
        assert!(key.starts_with(&QueryKey::for_class(EntityClass::Analysis)));
        assert!(!key.starts_with(&QueryKey::for_class(EntityClass::Portfolio)));
        assert!(key.starts_with(&key));
        assert!(!QueryKey::new(["analysis"]).starts_with(&key));
    }

    #[test]
    fn test_from_store_key() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let key = QueryKey::from(&StoreKey::index_analysis("NIFTY50", day)).with("u1");
        assert_eq!(key.to_string(), "indexAnalysis:NIFTY50:2025-01-02:u1");
    }
}
