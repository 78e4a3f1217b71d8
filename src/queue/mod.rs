//! # Result Queues
//!
//! Per-query FIFO queues carrying result records from remote workers to the
//! next-page assembler.
//!
//! A queue exists exactly for a query's CREATED lifetime: created on the
//! transition into CREATED, destroyed on the transition out. Queue existence
//! is therefore an externally observable proxy for "is this query currently
//! executing".
//!
//! Receive is multi-consumer: concurrent next calls against one query drain
//! the same queue, and records are partitioned across callers on a
//! first-drained basis with no replay.

mod memory;

pub use memory::InMemoryQueueManager;

use crate::error::Result;
use crate::models::ResultRecord;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Provider contract for per-query result queues.
#[async_trait]
pub trait ResultQueueManager: Send + Sync {
    /// Create the queue for a query. Creating an existing queue is an error;
    /// the lifecycle permits exactly one CREATED lifetime per query.
    async fn create_queue(&self, query_id: Uuid) -> Result<()>;

    fn queue_exists(&self, query_id: Uuid) -> bool;

    /// Append a record. Workers call this through their queue publisher.
    async fn publish(&self, query_id: Uuid, record: ResultRecord) -> Result<()>;

    /// Pop the oldest record, waiting up to `wait` for one to arrive.
    /// `Ok(None)` means the wait elapsed (or the queue is gone); callers
    /// re-check query state and retry.
    async fn receive(&self, query_id: Uuid, wait: Duration) -> Result<Option<ResultRecord>>;

    /// Number of records currently buffered.
    fn queue_size(&self, query_id: Uuid) -> usize;

    /// Drop all buffered records, keeping the queue.
    async fn clear_queue(&self, query_id: Uuid) -> Result<()>;

    /// Destroy the queue and everything buffered in it.
    async fn delete_queue(&self, query_id: Uuid) -> Result<()>;
}
