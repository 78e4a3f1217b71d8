//! Query identifiers and declarative definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Immutable identifier for a query: a globally unique id plus the name of
/// the query logic it runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub query_id: Uuid,
    pub query_logic_name: String,
}

impl QueryKey {
    pub fn new(query_logic_name: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            query_logic_name: query_logic_name.into(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.query_logic_name, self.query_id)
    }
}

/// Declarative description of what to run.
///
/// Immutable once the query enters the CREATED state, except through an
/// explicit `update` (DEFINED state only) or by producing a new query via
/// `duplicate`/`reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Query expression in the logic's query language.
    pub query: String,
    /// Human-readable query name.
    pub query_name: String,
    pub query_logic_name: String,
    /// Authorizations the caller requested for this query.
    pub query_authorizations: Vec<String>,
    pub begin_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Visibility marking applied to records this query produces.
    pub visibility: String,
    pub page_size: usize,
    /// Caller override of the logic's max results ceiling. Negative means
    /// unlimited.
    pub max_results_override: Option<i64>,
    pub max_concurrent_tasks: Option<usize>,
    /// Short name of the owning user; every non-admin mutating operation
    /// checks the caller against this.
    pub owner: String,
    /// Distinguished name of the owning user.
    pub user_dn: String,
    /// Extra logic-specific parameters passed through untouched.
    pub parameters: HashMap<String, String>,
}

impl QueryDefinition {
    /// Produce a copy with caller overrides merged in, leaving `self`
    /// untouched. Used by `update`, `duplicate`, and `reset`; ownership
    /// fields are never overridable.
    pub fn with_overrides(&self, overrides: &DefinitionOverrides) -> QueryDefinition {
        let mut merged = self.clone();
        if let Some(query) = &overrides.query {
            merged.query = query.clone();
        }
        if let Some(name) = &overrides.query_name {
            merged.query_name = name.clone();
        }
        if let Some(auths) = &overrides.query_authorizations {
            merged.query_authorizations = auths.clone();
        }
        if let Some(begin) = overrides.begin_date {
            merged.begin_date = Some(begin);
        }
        if let Some(end) = overrides.end_date {
            merged.end_date = Some(end);
        }
        if let Some(visibility) = &overrides.visibility {
            merged.visibility = visibility.clone();
        }
        if let Some(page_size) = overrides.page_size {
            merged.page_size = page_size;
        }
        if let Some(max_results) = overrides.max_results_override {
            merged.max_results_override = Some(max_results);
        }
        if let Some(max_tasks) = overrides.max_concurrent_tasks {
            merged.max_concurrent_tasks = Some(max_tasks);
        }
        for (k, v) in &overrides.parameters {
            merged.parameters.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Field-by-field overrides a caller may supply to `update`, `duplicate`,
/// or `reset`. Every field is optional; unset fields keep the source value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionOverrides {
    pub query: Option<String>,
    pub query_name: Option<String>,
    pub query_authorizations: Option<Vec<String>>,
    pub begin_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub visibility: Option<String>,
    pub page_size: Option<usize>,
    pub max_results_override: Option<i64>,
    pub max_concurrent_tasks: Option<usize>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl DefinitionOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
