//! # Query Service Configuration
//!
//! Runtime configuration for the lifecycle orchestrator. All values carry
//! sensible defaults, can be loaded from an optional `queryflow.toml` file,
//! and can be overridden with `QUERYFLOW_*` environment variables
//! (e.g. `QUERYFLOW_NEXT_CALL_TIMEOUT_MS=30000`).

use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the query lifecycle service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryProperties {
    /// Identity of this service instance, used as the event origin and for
    /// self-origin filtering (e.g. "query:host-1").
    pub service_id: String,
    /// Destination pattern addressing any free executor for a query's logic.
    pub executor_destination: String,
    /// Destination pattern addressing whichever node currently handles a
    /// blocking call for a query (CANCEL interrupts only).
    pub query_destination: String,
    /// Role required for admin operation variants.
    pub admin_role: String,
    /// Role exempt from override-ceiling checks. Consumed by the external
    /// [`QueryValidator`](crate::validation::QueryValidator) implementation,
    /// not by this crate.
    pub privileged_role: String,
    /// Page size applied when a definition does not set one.
    pub default_page_size: usize,
    /// Max results applied when a definition carries no override.
    /// Negative means unlimited.
    pub default_max_results: i64,
    /// Concurrent task ceiling applied when a definition carries no override.
    /// Consumed by the external validator and the executor pool, not by this
    /// crate.
    pub default_max_concurrent_tasks: usize,
    /// Maximum number of in-flight next calls per query.
    pub concurrent_next_limit: u32,
    /// Budget for a next call to make progress before failing with a timeout.
    pub next_call_timeout_ms: u64,
    /// How long a single result-queue receive waits before re-checking state.
    pub result_poll_interval_ms: u64,
    /// Budget for a plan round trip with the executor pool.
    pub plan_timeout_ms: u64,
}

impl Default for QueryProperties {
    fn default() -> Self {
        Self {
            service_id: "query:default".to_string(),
            executor_destination: "executor-unassigned:**".to_string(),
            query_destination: "query:**".to_string(),
            admin_role: "Administrator".to_string(),
            privileged_role: "PrivilegedUser".to_string(),
            default_page_size: 20,
            default_max_results: -1, // unlimited
            default_max_concurrent_tasks: 8,
            concurrent_next_limit: 1,
            next_call_timeout_ms: 60_000,   // 1 minute
            result_poll_interval_ms: 6_000, // 6 seconds
            plan_timeout_ms: 60_000,        // 1 minute
        }
    }
}

impl QueryProperties {
    /// Load configuration from the optional `queryflow.toml` file and the
    /// `QUERYFLOW_*` environment, layered over defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(config::File::with_name("queryflow").required(false))
    }

    fn load_from<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("QUERYFLOW"))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| QueryError::internal(format!("Invalid configuration: {e}")))
    }

    pub fn next_call_timeout(&self) -> Duration {
        Duration::from_millis(self.next_call_timeout_ms)
    }

    pub fn result_poll_interval(&self) -> Duration {
        Duration::from_millis(self.result_poll_interval_ms)
    }

    pub fn plan_timeout(&self) -> Duration {
        Duration::from_millis(self.plan_timeout_ms)
    }
}
