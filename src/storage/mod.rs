//! # Query Status Storage
//!
//! Keyed store of per-query [`QueryStatus`] and [`TaskStates`] records,
//! shared by every service instance acting on a query.
//!
//! The contract is a key-value cache, not a database: durability beyond the
//! cache is out of scope. Two extras make the lifecycle correct under
//! concurrency:
//!
//! - a per-query **status lock** serializing read-modify-write cycles, so
//!   racing transitions (e.g. `cancel` vs an in-flight `next`) are ordered;
//! - a per-query **change notification** handle, signaled on every status
//!   update, which PLAN waiters and other blocked observers use instead of
//!   busy-polling.

mod cache;

pub use cache::InMemoryQueryStorage;

use crate::error::Result;
use crate::models::{QueryStatus, TaskKey, TaskStates};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Storage contract for query status and task state records.
#[async_trait]
pub trait QueryStorage: Send + Sync {
    async fn get_query_status(&self, query_id: Uuid) -> Result<Option<QueryStatus>>;

    /// Insert or replace a status record.
    async fn put_query_status(&self, status: QueryStatus) -> Result<()>;

    /// Replace an existing status record; errors if the record is gone.
    async fn update_query_status(&self, status: QueryStatus) -> Result<()>;

    /// Delete a status record, returning whether one existed.
    async fn delete_query_status(&self, query_id: Uuid) -> Result<bool>;

    async fn list_query_statuses(&self) -> Result<Vec<QueryStatus>>;

    async fn get_task_states(&self, query_id: Uuid) -> Result<Option<TaskStates>>;

    async fn put_task_states(&self, states: TaskStates) -> Result<()>;

    async fn delete_task_states(&self, query_id: Uuid) -> Result<bool>;

    /// All task keys for a query, across every phase.
    async fn get_tasks(&self, query_id: Uuid) -> Result<Vec<TaskKey>>;

    /// Per-query lock serializing status read-modify-write cycles.
    ///
    /// Hold the guard across the whole get/mutate/update sequence; never
    /// across a result-queue wait.
    fn status_lock(&self, query_id: Uuid) -> Arc<Mutex<()>>;

    /// Per-query change notification, signaled by every
    /// `put_query_status`/`update_query_status`.
    fn status_notify(&self, query_id: Uuid) -> Arc<Notify>;
}
