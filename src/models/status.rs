//! Query lifecycle states and the mutable per-query status record.

use super::query::{QueryDefinition, QueryKey};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a query.
///
/// CREATED is the only state in which `next`, `cancel`, or `close` may
/// succeed; every other state rejects those operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Stored but not yet executing; no task states, no result queue.
    Defined,
    /// Executing on the worker pool.
    Created,
    /// Finished normally or closed by the caller.
    Closed,
    /// Canceled by the caller or an administrator.
    Canceled,
}

impl QueryState {
    /// Whether the query is actively executing.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Whether no further lifecycle transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Canceled)
    }

    /// Whether `remove` is legal in this state (active next calls permitting).
    pub fn is_removable(&self) -> bool {
        !self.is_running()
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined => write!(f, "defined"),
            Self::Created => write!(f, "created"),
            Self::Closed => write!(f, "closed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for QueryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "defined" => Ok(Self::Defined),
            "created" => Ok(Self::Created),
            "closed" => Ok(Self::Closed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid query state: {s}")),
        }
    }
}

/// The mutable lifecycle record, one per query id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatus {
    pub query_key: QueryKey,
    pub state: QueryState,
    pub query: QueryDefinition,
    /// Results delivered to callers so far. Monotonically non-decreasing.
    pub num_results_returned: u64,
    /// Results produced by workers so far. Monotonically non-decreasing.
    pub num_results_generated: u64,
    /// In-flight paging calls; gates removal and deferred queue teardown.
    pub active_next_calls: u32,
    /// Last page number successfully delivered, starting at 0.
    pub last_page_number: u64,
    /// Set once the first next call has published its NEXT event.
    pub next_requested: bool,
    /// Updated on every access.
    pub last_used_millis: i64,
    /// Updated on every mutation.
    pub last_updated_millis: i64,
    /// Populated only by a PLAN round trip, after which the record is
    /// deleted.
    pub plan: Option<String>,
}

impl QueryStatus {
    /// New status record in the DEFINED state.
    pub fn define(query_key: QueryKey, query: QueryDefinition) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            query_key,
            state: QueryState::Defined,
            query,
            num_results_returned: 0,
            num_results_generated: 0,
            active_next_calls: 0,
            last_page_number: 0,
            next_requested: false,
            last_used_millis: now,
            last_updated_millis: now,
            plan: None,
        }
    }

    /// New status record directly in the CREATED state.
    pub fn create(query_key: QueryKey, query: QueryDefinition) -> Self {
        let mut status = Self::define(query_key, query);
        status.state = QueryState::Created;
        status
    }

    pub fn query_id(&self) -> uuid::Uuid {
        self.query_key.query_id
    }

    /// Record an access without mutating lifecycle data.
    pub fn touch(&mut self) {
        self.last_used_millis = Utc::now().timestamp_millis();
    }

    /// Record a mutation.
    pub fn mark_updated(&mut self) {
        let now = Utc::now().timestamp_millis();
        self.last_used_millis = now;
        self.last_updated_millis = now;
    }

    /// Effective max results for this query: the definition override when
    /// present, the configured default otherwise. Negative means unlimited.
    pub fn effective_max_results(&self, default_max_results: i64) -> i64 {
        self.query.max_results_override.unwrap_or(default_max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn definition() -> QueryDefinition {
        QueryDefinition {
            query: "FIELD == 'value'".to_string(),
            query_name: "test".to_string(),
            query_logic_name: "EventQuery".to_string(),
            query_authorizations: vec![],
            begin_date: None,
            end_date: None,
            visibility: "ALL".to_string(),
            page_size: 10,
            max_results_override: None,
            max_concurrent_tasks: None,
            owner: "userdn".to_string(),
            user_dn: "cn=user".to_string(),
            parameters: HashMap::new(),
        }
    }

    #[test]
    fn state_predicates() {
        assert!(QueryState::Created.is_running());
        assert!(!QueryState::Defined.is_running());
        assert!(QueryState::Closed.is_terminal());
        assert!(QueryState::Canceled.is_terminal());
        assert!(QueryState::Defined.is_removable());
        assert!(!QueryState::Created.is_removable());
    }

    #[test]
    fn define_starts_with_zeroed_counters() {
        let status = QueryStatus::define(QueryKey::new("EventQuery"), definition());
        assert_eq!(status.state, QueryState::Defined);
        assert_eq!(status.num_results_returned, 0);
        assert_eq!(status.num_results_generated, 0);
        assert_eq!(status.active_next_calls, 0);
        assert_eq!(status.last_page_number, 0);
        assert!(!status.next_requested);
        assert!(status.plan.is_none());
    }

    #[test]
    fn effective_max_results_prefers_override() {
        let mut status = QueryStatus::create(QueryKey::new("EventQuery"), definition());
        assert_eq!(status.effective_max_results(369), 369);
        status.query.max_results_override = Some(42);
        assert_eq!(status.effective_max_results(369), 42);
    }

    proptest! {
        #[test]
        fn state_display_round_trips(state in prop_oneof![
            Just(QueryState::Defined),
            Just(QueryState::Created),
            Just(QueryState::Closed),
            Just(QueryState::Canceled),
        ]) {
            let parsed = QueryState::from_str(&state.to_string()).unwrap();
            prop_assert_eq!(parsed, state);
        }

        #[test]
        fn unknown_states_are_rejected(s in "[a-z]{1,12}") {
            prop_assume!(!matches!(s.as_str(), "defined" | "created" | "closed" | "canceled"));
            prop_assert!(QueryState::from_str(&s).is_err());
        }
    }
}
