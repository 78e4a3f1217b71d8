//! In-memory result queues.
//!
//! Each queue is a `VecDeque` under a short-held `parking_lot` mutex plus a
//! `Notify` to wake blocked consumers. The notify future is registered
//! before the buffer is re-checked, so a publish between the check and the
//! await is never lost.

use super::ResultQueueManager;
use crate::error::{QueryError, Result};
use crate::models::ResultRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Default)]
struct QueueInner {
    buffer: Mutex<VecDeque<ResultRecord>>,
    available: Notify,
}

/// Dashmap-backed [`ResultQueueManager`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryQueueManager {
    queues: DashMap<Uuid, Arc<QueueInner>>,
}

impl InMemoryQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, query_id: Uuid) -> Option<Arc<QueueInner>> {
        self.queues.get(&query_id).map(|q| q.clone())
    }
}

#[async_trait]
impl ResultQueueManager for InMemoryQueueManager {
    async fn create_queue(&self, query_id: Uuid) -> Result<()> {
        match self.queues.entry(query_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(QueryError::internal(format!(
                "Result queue already exists for query {query_id}"
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(QueueInner::default()));
                Ok(())
            }
        }
    }

    fn queue_exists(&self, query_id: Uuid) -> bool {
        self.queues.contains_key(&query_id)
    }

    async fn publish(&self, query_id: Uuid, record: ResultRecord) -> Result<()> {
        let queue = self.queue(query_id).ok_or_else(|| {
            QueryError::internal(format!("No result queue for query {query_id}"))
        })?;
        queue.buffer.lock().push_back(record);
        queue.available.notify_waiters();
        Ok(())
    }

    async fn receive(&self, query_id: Uuid, wait: Duration) -> Result<Option<ResultRecord>> {
        let Some(queue) = self.queue(query_id) else {
            return Ok(None);
        };

        let drain = async {
            loop {
                // enable() registers with the Notify before the buffer
                // re-check; notify_waiters() stores no permit, so an
                // unregistered waiter would miss a publish landing between
                // the pop miss and the await
                let notified = queue.available.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(record) = queue.buffer.lock().pop_front() {
                    return Some(record);
                }
                // deletion wakes waiters; stop instead of waiting out the
                // full window on a queue that no longer exists
                if !self.queues.contains_key(&query_id) {
                    return None;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(wait, drain).await {
            Ok(record) => Ok(record),
            Err(_) => Ok(None),
        }
    }

    fn queue_size(&self, query_id: Uuid) -> usize {
        self.queue(query_id).map_or(0, |q| q.buffer.lock().len())
    }

    async fn clear_queue(&self, query_id: Uuid) -> Result<()> {
        if let Some(queue) = self.queue(query_id) {
            queue.buffer.lock().clear();
        }
        Ok(())
    }

    async fn delete_queue(&self, query_id: Uuid) -> Result<()> {
        if let Some((_, queue)) = self.queues.remove(&query_id) {
            // wake any consumer still blocked on this queue
            queue.available.notify_waiters();
        }
        Ok(())
    }
}
