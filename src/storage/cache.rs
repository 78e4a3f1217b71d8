//! In-memory query storage backed by dashmap.
//!
//! Suitable for single-process deployments and tests; a clustered cache
//! implements the same [`QueryStorage`] trait.

use super::QueryStorage;
use crate::error::{QueryError, Result};
use crate::models::{QueryStatus, TaskKey, TaskStates};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Dashmap-backed [`QueryStorage`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryQueryStorage {
    statuses: DashMap<Uuid, QueryStatus>,
    task_states: DashMap<Uuid, TaskStates>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    notifies: DashMap<Uuid, Arc<Notify>>,
}

impl InMemoryQueryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify_status_change(&self, query_id: Uuid) {
        if let Some(notify) = self.notifies.get(&query_id) {
            notify.notify_waiters();
        }
    }
}

#[async_trait]
impl QueryStorage for InMemoryQueryStorage {
    async fn get_query_status(&self, query_id: Uuid) -> Result<Option<QueryStatus>> {
        Ok(self.statuses.get(&query_id).map(|s| s.clone()))
    }

    async fn put_query_status(&self, status: QueryStatus) -> Result<()> {
        let query_id = status.query_id();
        self.statuses.insert(query_id, status);
        self.notify_status_change(query_id);
        Ok(())
    }

    async fn update_query_status(&self, status: QueryStatus) -> Result<()> {
        let query_id = status.query_id();
        match self.statuses.get_mut(&query_id) {
            Some(mut entry) => {
                *entry = status;
                drop(entry);
                self.notify_status_change(query_id);
                Ok(())
            }
            None => Err(QueryError::internal(format!(
                "Cannot update status for unknown query {query_id}"
            ))),
        }
    }

    async fn delete_query_status(&self, query_id: Uuid) -> Result<bool> {
        let existed = self.statuses.remove(&query_id).is_some();
        if existed {
            self.notify_status_change(query_id);
        }
        self.locks.remove(&query_id);
        self.notifies.remove(&query_id);
        Ok(existed)
    }

    async fn list_query_statuses(&self) -> Result<Vec<QueryStatus>> {
        Ok(self.statuses.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_task_states(&self, query_id: Uuid) -> Result<Option<TaskStates>> {
        Ok(self.task_states.get(&query_id).map(|s| s.clone()))
    }

    async fn put_task_states(&self, states: TaskStates) -> Result<()> {
        self.task_states.insert(states.query_id, states);
        Ok(())
    }

    async fn delete_task_states(&self, query_id: Uuid) -> Result<bool> {
        Ok(self.task_states.remove(&query_id).is_some())
    }

    async fn get_tasks(&self, query_id: Uuid) -> Result<Vec<TaskKey>> {
        Ok(self
            .task_states
            .get(&query_id)
            .map(|s| s.task_keys())
            .unwrap_or_default())
    }

    fn status_lock(&self, query_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(query_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn status_notify(&self, query_id: Uuid) -> Arc<Notify> {
        self.notifies
            .entry(query_id)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}
