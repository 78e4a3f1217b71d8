//! Next-page assembly.
//!
//! A next call drains the query's result queue into a bounded page,
//! re-checking query state, the max-results ceiling, and worker exhaustion
//! between receives. The timeout budget is measured since the last
//! progress: any drained record resets it, and a timeout with a non-empty
//! page returns the short page rather than discarding drained records.

use super::QueryManagementService;
use crate::error::{QueryError, Result};
use crate::events::QueryRequest;
use crate::models::{QueryState, ResultRecord, ResultsPage};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

/// Result of a next call.
#[derive(Debug, Clone, PartialEq)]
pub enum NextOutcome {
    Page(ResultsPage),
    /// No more results will ever arrive; the query has been closed.
    NoContent,
}

/// Why the drain loop stopped collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    PageFull,
    /// Workers are done and everything generated has been drained.
    Exhausted,
    /// Delivering more would exceed the max-results ceiling.
    MaxResults,
    Canceled,
    /// Query closed and the queue has been drained dry.
    Closed,
    /// No progress within the timeout budget.
    TimedOut,
}

impl QueryManagementService {
    /// Assemble one page of results for a running query.
    pub(crate) async fn next_page(&self, query_id: Uuid) -> Result<NextOutcome> {
        let started = Instant::now();
        let (page_size, max_remaining, publish_next) = self.begin_next(query_id).await?;

        let Some(max_remaining) = max_remaining else {
            // ceiling already reached before this call; nothing left to page
            self.close_inner(query_id, true).await?;
            return Ok(NextOutcome::NoContent);
        };

        if publish_next {
            self.publish_to_executors(QueryRequest::next(query_id)).await?;
        }

        let target = match max_remaining {
            Some(remaining) => page_size.min(remaining),
            None => page_size,
        };

        // decrement of active_next_calls is owed from here on, even on error
        let drained = self.drain(query_id, target).await;
        let (records, reason) = match drained {
            Ok(ok) => ok,
            Err(error) => {
                self.finish_next(query_id, 0, false).await?;
                return Err(error);
            }
        };
        // a page cut to the ceiling is the ceiling being reached
        let reason = if reason == StopReason::PageFull
            && max_remaining.is_some_and(|remaining| records.len() >= remaining)
        {
            StopReason::MaxResults
        } else {
            reason
        };

        let auto_close = matches!(reason, StopReason::Exhausted | StopReason::MaxResults);
        let page_number = self.finish_next(query_id, records.len() as u64, auto_close).await?;
        if auto_close {
            self.publish_to_executors(QueryRequest::close(query_id)).await?;
        }

        debug!(
            %query_id,
            results = records.len(),
            ?reason,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "next call finished"
        );

        if records.is_empty() {
            return match reason {
                StopReason::TimedOut => Err(QueryError::timeout(query_id)),
                _ => Ok(NextOutcome::NoContent),
            };
        }

        Ok(NextOutcome::Page(ResultsPage {
            query_id,
            page_number,
            partial_results: reason == StopReason::Canceled,
            last_page: auto_close || reason == StopReason::Closed,
            operation_time_ms: started.elapsed().as_millis() as u64,
            results: records,
        }))
    }

    /// Admission check and bookkeeping, all under the status lock.
    ///
    /// Returns the page size, the remaining result allowance
    /// (`None` when the ceiling is already reached, `Some(None)` when
    /// unlimited), and whether this call owes the one-time NEXT event.
    #[allow(clippy::type_complexity)]
    async fn begin_next(
        &self,
        query_id: Uuid,
    ) -> Result<(usize, Option<Option<usize>>, bool)> {
        let lock = self.storage.status_lock(query_id);
        let _guard = lock.lock().await;

        let mut status = self.require_status(query_id).await?;
        if !status.state.is_running() {
            return Err(QueryError::not_running("next"));
        }
        if status.active_next_calls >= self.properties.concurrent_next_limit {
            return Err(QueryError::ConcurrentNextLimit {
                limit: self.properties.concurrent_next_limit,
            });
        }

        let max_results = status.effective_max_results(self.properties.default_max_results);
        let max_remaining = if max_results < 0 {
            Some(None)
        } else if status.num_results_returned >= max_results as u64 {
            None
        } else {
            Some(Some((max_results as u64 - status.num_results_returned) as usize))
        };
        if max_remaining.is_none() {
            trace!(%query_id, max_results, "max results reached, closing query");
            return Ok((0, None, false));
        }

        let page_size = if status.query.page_size > 0 {
            status.query.page_size
        } else {
            self.properties.default_page_size
        };

        status.active_next_calls += 1;
        let publish_next = !status.next_requested;
        status.next_requested = true;
        status.mark_updated();
        self.storage.update_query_status(status).await?;

        Ok((page_size, max_remaining, publish_next))
    }

    /// Drain the result queue until the page fills or a stop condition
    /// holds. Never touches the status record; the caller finalizes.
    async fn drain(
        &self,
        query_id: Uuid,
        target: usize,
    ) -> Result<(Vec<ResultRecord>, StopReason)> {
        let poll_interval = self.properties.result_poll_interval();
        let mut deadline = Instant::now() + self.properties.next_call_timeout();
        let mut records = Vec::with_capacity(target);

        loop {
            if records.len() >= target {
                return Ok((records, StopReason::PageFull));
            }

            let status = self.require_status(query_id).await?;
            match status.state {
                QueryState::Canceled => return Ok((records, StopReason::Canceled)),
                QueryState::Created => {}
                // closed mid-call: keep draining what is buffered, stop
                // waiting for more
                _ => {
                    if self.queues.queue_size(query_id) == 0 {
                        return Ok((records, StopReason::Closed));
                    }
                }
            }

            if status.state == QueryState::Created
                && self.queues.queue_size(query_id) == 0
                && self.workers_exhausted(&status, records.len() as u64).await?
            {
                return Ok((records, StopReason::Exhausted));
            }

            let wait = if status.state == QueryState::Created {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok((records, StopReason::TimedOut));
                }
                poll_interval.min(remaining)
            } else {
                Duration::ZERO
            };

            match self.queues.receive(query_id, wait).await? {
                Some(record) => {
                    records.push(record);
                    // progress resets the timeout budget
                    deadline = Instant::now() + self.properties.next_call_timeout();
                }
                None if status.state != QueryState::Created => {
                    return Ok((records, StopReason::Closed));
                }
                None => {}
            }
        }
    }

    /// Whether the worker pool can never produce another record: no task is
    /// READY or RUNNING (or the task states are gone), nothing is buffered,
    /// and everything generated has been accounted for.
    async fn workers_exhausted(&self, status: &crate::models::QueryStatus, drained: u64) -> Result<bool> {
        let unfinished = self
            .storage
            .get_task_states(status.query_id())
            .await?
            .is_some_and(|states| states.has_unfinished_work());
        Ok(!unfinished && status.num_results_returned + drained >= status.num_results_generated)
    }

    /// Settle counters under the status lock and tear down the queue when
    /// this was the last next call against a no-longer-running query.
    /// Returns the page number delivered.
    async fn finish_next(&self, query_id: Uuid, delivered: u64, auto_close: bool) -> Result<u64> {
        let lock = self.storage.status_lock(query_id);
        let (page_number, teardown) = {
            let _guard = lock.lock().await;
            let mut status = self.require_status(query_id).await?;
            status.active_next_calls = status.active_next_calls.saturating_sub(1);
            status.num_results_returned += delivered;
            if delivered > 0 {
                status.last_page_number += 1;
            }
            if auto_close && status.state == QueryState::Created {
                status.state = QueryState::Closed;
            }
            status.mark_updated();
            let page_number = status.last_page_number;
            let teardown = !status.state.is_running() && status.active_next_calls == 0;
            self.storage.update_query_status(status).await?;
            (page_number, teardown)
        };

        if teardown && self.queues.queue_exists(query_id) {
            self.queues.delete_queue(query_id).await?;
        }
        Ok(page_number)
    }
}
