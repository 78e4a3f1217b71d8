//! # Parameter Validation Seam
//!
//! Raw request parameters and the validator contract. Actual validation
//! (required fields, role/authorization subset checks, override ceilings)
//! lives outside this crate; the lifecycle service only consumes the
//! resulting [`QueryDefinition`] or surfaces the validator's error.

use crate::error::Result;
use crate::models::{QueryDefinition, UserDetails};
use async_trait::async_trait;
use std::collections::HashMap;

/// Raw multi-valued request parameters, as a thin HTTP layer would collect
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    values: HashMap<String, Vec<String>>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Replace all values for a key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), vec![value.into()]);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.values.remove(key)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.values.iter()
    }
}

/// Validator contract consumed by `define`/`create`.
///
/// Implementations perform required-field checks, verify the caller holds
/// the requested authorizations, and enforce override ceilings (page size,
/// max results, max concurrent tasks), returning
/// [`QueryError::Validation`](crate::error::QueryError::Validation) with a
/// specific sub-code on failure. The returned definition carries the
/// caller's identity as owner.
#[async_trait]
pub trait QueryValidator: Send + Sync {
    async fn validate(
        &self,
        query_logic_name: &str,
        parameters: &QueryParameters,
        caller: &UserDetails,
    ) -> Result<QueryDefinition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimap_semantics() {
        let mut params = QueryParameters::new();
        params.add("auths", "A").add("auths", "B").add("query", "F == 'v'");

        assert_eq!(params.all("auths"), &["A".to_string(), "B".to_string()]);
        assert_eq!(params.first("query"), Some("F == 'v'"));
        assert!(params.first("missing").is_none());
        assert!(params.all("missing").is_empty());

        params.set("auths", "C");
        assert_eq!(params.all("auths"), &["C".to_string()]);

        assert!(params.remove("auths").is_some());
        assert!(!params.contains_key("auths"));
    }
}
