//! Event bus abstraction and the in-process implementation.
//!
//! The bus guarantees delivery to all processes matching a destination
//! pattern, at-least-once. Delivery order across destinations is not
//! guaranteed; subscribers key all effects on the query id, never on
//! arrival order.

use super::request::RemoteQueryRequestEvent;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Publish/subscribe transport for [`RemoteQueryRequestEvent`]s.
#[async_trait]
pub trait QueryEventBus: Send + Sync {
    async fn publish(&self, event: RemoteQueryRequestEvent) -> Result<()>;

    /// Subscribe to every event on the bus. Destination filtering and
    /// self-origin filtering are the subscriber's responsibility.
    fn subscribe(&self) -> broadcast::Receiver<RemoteQueryRequestEvent>;
}

/// Whether a service id matches a destination pattern.
///
/// Patterns and ids are colon-separated segments. A `*` segment matches any
/// one segment; a `**` segment matches any remainder, including an empty
/// one. `"executor-unassigned:**"` addresses every instance of the executor
/// pool; `"query:**"` addresses every query-service instance.
pub fn destination_matches(pattern: &str, service_id: &str) -> bool {
    let mut pattern_segments = pattern.split(':');
    let mut id_segments = service_id.split(':');

    loop {
        match pattern_segments.next() {
            Some("**") => return true,
            Some("*") => {
                if id_segments.next().is_none() {
                    return false;
                }
            }
            Some(segment) => {
                if id_segments.next() != Some(segment) {
                    return false;
                }
            }
            None => return id_segments.next().is_none(),
        }
    }
}

/// In-process [`QueryEventBus`] on a tokio broadcast channel.
///
/// Useful for single-process deployments and tests; a brokered transport
/// implements the same trait. Publishing with no subscribers is not an
/// error.
#[derive(Debug, Clone)]
pub struct LocalEventBus {
    sender: broadcast::Sender<RemoteQueryRequestEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl QueryEventBus for LocalEventBus {
    async fn publish(&self, event: RemoteQueryRequestEvent) -> Result<()> {
        tracing::trace!(
            origin = %event.origin_service,
            destination = %event.destination,
            request = %event.request,
            "publishing remote query request"
        );
        // send() errs only when there are no subscribers, which is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteQueryRequestEvent> {
        self.sender.subscribe()
    }
}
