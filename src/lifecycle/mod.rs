//! # Query Lifecycle Manager
//!
//! The orchestrator for a query's whole life: define, create, next-page
//! delivery, cancel/close, duplicate/reset, plan, remove, and the admin
//! override variants. Every operation is a validated state transition on
//! the stored [`QueryStatus`] plus a set of events exchanged with the
//! remote executor pool.
//!
//! ## Concurrency
//!
//! All status mutations for one query id are serialized through the
//! storage's per-query status lock, so racing transitions (a `cancel`
//! against an in-flight `next`) are ordered and the loser observes the
//! winner's state. The result queue for a query is created exactly once on
//! the transition into CREATED and destroyed exactly once on the way out;
//! teardown is deferred while next calls are still draining (close) or
//! immediate (cancel).
//!
//! ## Events
//!
//! CREATE/NEXT/CLOSE/PLAN address the executor pool pattern; CANCEL
//! additionally addresses the query-service pattern so whichever instance
//! is blocked in a next or plan call observes the interrupt. Incoming
//! events are dispatched through [`QueryManagementService::handle_remote_request`]
//! after self-origin and destination filtering.

mod next;

pub use next::NextOutcome;

use crate::audit::AuditSink;
use crate::config::QueryProperties;
use crate::error::{QueryError, Result};
use crate::events::{
    destination_matches, QueryEventBus, QueryRequest, RemoteQueryRequestEvent, RequestMethod,
};
use crate::models::{
    DefinitionOverrides, QueryDefinition, QueryKey, QueryState, QueryStatus, ResultsPage,
    TaskStates, UserDetails,
};
use crate::queue::ResultQueueManager;
use crate::storage::QueryStorage;
use crate::validation::{QueryParameters, QueryValidator};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

/// Filter for `list`/`admin_list`.
#[derive(Debug, Clone, Default)]
pub struct QueryListFilter {
    pub query_id: Option<Uuid>,
    pub query_name: Option<String>,
    /// Owner short name; honored by `admin_list` only, since `list` always
    /// scopes to the caller.
    pub user: Option<String>,
}

/// Query lifecycle orchestrator.
///
/// All collaborators are constructor-injected; the service holds no global
/// state of its own.
pub struct QueryManagementService {
    properties: QueryProperties,
    storage: Arc<dyn QueryStorage>,
    queues: Arc<dyn ResultQueueManager>,
    bus: Arc<dyn QueryEventBus>,
    validator: Arc<dyn QueryValidator>,
    audit: Arc<dyn AuditSink>,
}

impl QueryManagementService {
    pub fn new(
        properties: QueryProperties,
        storage: Arc<dyn QueryStorage>,
        queues: Arc<dyn ResultQueueManager>,
        bus: Arc<dyn QueryEventBus>,
        validator: Arc<dyn QueryValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            properties,
            storage,
            queues,
            bus,
            validator,
            audit,
        }
    }

    pub fn properties(&self) -> &QueryProperties {
        &self.properties
    }

    /// Validate parameters and store the query in the DEFINED state.
    ///
    /// No task states, no result queue, no events, no audit record: the
    /// query is parked until `create_defined`, `duplicate`, or `update`
    /// acts on it.
    #[instrument(skip(self, parameters, caller), fields(caller = %caller.username))]
    pub async fn define(
        &self,
        query_logic_name: &str,
        parameters: &QueryParameters,
        caller: &UserDetails,
    ) -> Result<QueryKey> {
        let definition = self
            .validator
            .validate(query_logic_name, parameters, caller)
            .await?;
        let key = QueryKey::new(query_logic_name);
        let status = QueryStatus::define(key.clone(), definition);
        self.storage.put_query_status(status).await?;
        debug!(query_id = %key.query_id, "query defined");
        Ok(key)
    }

    /// Validate parameters, audit, and start a new query executing.
    #[instrument(skip(self, parameters, caller), fields(caller = %caller.username))]
    pub async fn create(
        &self,
        query_logic_name: &str,
        parameters: &QueryParameters,
        caller: &UserDetails,
    ) -> Result<QueryKey> {
        let definition = self
            .validator
            .validate(query_logic_name, parameters, caller)
            .await?;
        self.start_query(definition).await
    }

    /// Promote a DEFINED query owned by the caller to CREATED, exactly as
    /// `create` would have.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn create_defined(&self, query_id: Uuid, caller: &UserDetails) -> Result<QueryKey> {
        let status = self.validate_request(query_id, caller).await?;
        if status.state != QueryState::Defined {
            return Err(QueryError::not_defined("create"));
        }

        // audit before any mutation
        self.audit.record(query_id, &status.query).await?;

        let lock = self.storage.status_lock(query_id);
        let key = {
            let _guard = lock.lock().await;
            let mut status = self.require_status(query_id).await?;
            if status.state != QueryState::Defined {
                return Err(QueryError::not_defined("create"));
            }
            status.state = QueryState::Created;
            status.mark_updated();
            let key = status.query_key.clone();
            self.storage.update_query_status(status).await?;
            key
        };

        self.allocate_execution_resources(query_id).await?;
        self.publish_to_executors(QueryRequest::create(query_id)).await?;
        debug!(%query_id, "defined query promoted to created");
        Ok(key)
    }

    /// Deliver one page of results for a running query. `Ok(None)` means no
    /// more results will ever arrive (the query auto-closes).
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn next(&self, query_id: Uuid, caller: &UserDetails) -> Result<Option<ResultsPage>> {
        self.validate_request(query_id, caller).await?;
        match self.next_page(query_id).await? {
            NextOutcome::Page(page) => Ok(Some(page)),
            NextOutcome::NoContent => Ok(None),
        }
    }

    /// Cancel a running query owned by the caller.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn cancel(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.validate_request(query_id, caller).await?;
        self.cancel_inner(query_id, true).await
    }

    /// Cancel any running query; requires the admin role.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_cancel(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.require_admin(caller)?;
        self.require_status(query_id).await?;
        self.cancel_inner(query_id, true).await
    }

    /// Cancel every running query in the store; requires the admin role.
    /// Returns how many queries were canceled.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_cancel_all(&self, caller: &UserDetails) -> Result<usize> {
        self.require_admin(caller)?;
        let mut canceled = 0;
        for status in self.storage.list_query_statuses().await? {
            if status.state.is_running() {
                self.cancel_inner(status.query_id(), true).await?;
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    /// Close a running query owned by the caller.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn close(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.validate_request(query_id, caller).await?;
        self.close_inner(query_id, true).await
    }

    /// Close any running query; requires the admin role.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_close(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.require_admin(caller)?;
        self.require_status(query_id).await?;
        self.close_inner(query_id, true).await
    }

    /// Close every running query in the store; requires the admin role.
    /// Returns how many queries were closed.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_close_all(&self, caller: &UserDetails) -> Result<usize> {
        self.require_admin(caller)?;
        let mut closed = 0;
        for status in self.storage.list_query_statuses().await? {
            if status.state.is_running() {
                self.close_inner(status.query_id(), true).await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Delete the status and task states of a query owned by the caller.
    /// Legal only for DEFINED/CLOSED/CANCELED queries with no active next
    /// calls.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn remove(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.validate_request(query_id, caller).await?;
        self.remove_inner(query_id).await
    }

    /// Remove any query; requires the admin role.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_remove(&self, query_id: Uuid, caller: &UserDetails) -> Result<()> {
        self.require_admin(caller)?;
        self.require_status(query_id).await?;
        self.remove_inner(query_id).await
    }

    /// Remove every removable query in the store; requires the admin role.
    /// Running queries and queries with active next calls are skipped.
    /// Returns how many queries were removed.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn admin_remove_all(&self, caller: &UserDetails) -> Result<usize> {
        self.require_admin(caller)?;
        let mut removed = 0;
        for status in self.storage.list_query_statuses().await? {
            if status.state.is_removable() && status.active_next_calls == 0 {
                self.remove_inner(status.query_id()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Update the definition of a DEFINED query owned by the caller.
    #[instrument(skip(self, overrides, caller), fields(caller = %caller.username))]
    pub async fn update(
        &self,
        query_id: Uuid,
        overrides: &DefinitionOverrides,
        caller: &UserDetails,
    ) -> Result<QueryKey> {
        self.validate_request(query_id, caller).await?;

        let lock = self.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let mut status = self.require_status(query_id).await?;
        if status.state != QueryState::Defined {
            return Err(QueryError::not_defined("update"));
        }
        status.query = status.query.with_overrides(overrides);
        status.mark_updated();
        let key = status.query_key.clone();
        self.storage.update_query_status(status).await?;
        Ok(key)
    }

    /// Start a new query from an existing one, merging caller overrides
    /// into the source definition. The source is untouched; the new query
    /// starts CREATED with fresh counters. The caller must own the source
    /// or hold the admin role.
    #[instrument(skip(self, overrides, caller), fields(caller = %caller.username))]
    pub async fn duplicate(
        &self,
        query_id: Uuid,
        overrides: &DefinitionOverrides,
        caller: &UserDetails,
    ) -> Result<QueryKey> {
        let status = self.require_status(query_id).await?;
        if !caller.has_role(&self.properties.admin_role) {
            self.check_ownership(&status, caller)?;
        }
        let definition = status.query.with_overrides(overrides);
        self.start_query(definition).await
    }

    /// Duplicate a query owned by the caller and cancel the original if it
    /// was running. DEFINED/CLOSED/CANCELED originals are left unchanged.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn reset(&self, query_id: Uuid, caller: &UserDetails) -> Result<QueryKey> {
        let status = self.validate_request(query_id, caller).await?;

        if status.state.is_running() {
            self.cancel_inner(query_id, true).await?;
        }

        self.start_query(status.query.clone()).await
    }

    /// Ask the executor pool for the query plan, then discard the query.
    ///
    /// Publishes PLAN and blocks until a remote worker fills in the status
    /// record's `plan` field, bounded by the configured plan timeout. On
    /// success the status, task states, and queue are deleted; the query id
    /// is spent either way.
    #[instrument(skip(self, caller), fields(caller = %caller.username))]
    pub async fn plan(&self, query_id: Uuid, caller: &UserDetails) -> Result<String> {
        self.validate_request(query_id, caller).await?;

        self.publish_to_executors(QueryRequest::plan(query_id)).await?;

        let notify = self.storage.status_notify(query_id);
        let deadline = tokio::time::Instant::now() + self.properties.plan_timeout();
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let status = self.require_status(query_id).await?;
            if let Some(plan) = status.plan {
                self.discard_query(query_id).await?;
                return Ok(plan);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(QueryError::timeout(query_id));
            }
        }
    }

    /// Fetch the status of a query, refreshing its last-used time. The
    /// caller must own it or hold the admin role.
    pub async fn get(&self, query_id: Uuid, caller: &UserDetails) -> Result<QueryStatus> {
        let lock = self.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let mut status = self.require_status(query_id).await?;
        if !caller.has_role(&self.properties.admin_role) {
            self.check_ownership(&status, caller)?;
        }
        status.touch();
        self.storage.update_query_status(status.clone()).await?;
        Ok(status)
    }

    /// List the caller's queries, optionally narrowed by id or name.
    pub async fn list(
        &self,
        filter: &QueryListFilter,
        caller: &UserDetails,
    ) -> Result<Vec<QueryStatus>> {
        let statuses = self.storage.list_query_statuses().await?;
        Ok(statuses
            .into_iter()
            .filter(|s| s.query.owner == caller.username)
            .filter(|s| Self::filter_matches(s, filter))
            .collect())
    }

    /// List every query in the store, optionally narrowed by id, name, or
    /// owner; requires the admin role.
    pub async fn admin_list(
        &self,
        filter: &QueryListFilter,
        caller: &UserDetails,
    ) -> Result<Vec<QueryStatus>> {
        self.require_admin(caller)?;
        let statuses = self.storage.list_query_statuses().await?;
        Ok(statuses
            .into_iter()
            .filter(|s| filter.user.as_ref().is_none_or(|u| &s.query.owner == u))
            .filter(|s| Self::filter_matches(s, filter))
            .collect())
    }

    /// Dispatch a control request received from another service instance.
    ///
    /// Only CANCEL and CLOSE act on this side; both run with event
    /// publication suppressed since the originating instance already
    /// published. Everything else is executor-bound and ignored here.
    pub async fn handle_remote_request(&self, request: QueryRequest) -> Result<()> {
        match request.method {
            RequestMethod::Cancel => {
                trace!(query_id = %request.query_id, "received remote cancel request");
                self.cancel_inner(request.query_id, false).await
            }
            RequestMethod::Close => {
                trace!(query_id = %request.query_id, "received remote close request");
                self.close_inner(request.query_id, false).await
            }
            method => {
                debug!(%method, query_id = %request.query_id, "ignoring remote request method");
                Ok(())
            }
        }
    }

    /// Spawn the bus listener for this service instance. Self-origin events
    /// and events routed elsewhere are skipped; handler failures are logged,
    /// never propagated (delivery is at-least-once, a duplicate cancel for
    /// an already-canceled query is expected noise).
    pub fn spawn_event_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        let mut receiver = service.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.origin_service == service.properties.service_id {
                            continue;
                        }
                        if !destination_matches(&event.destination, &service.properties.service_id)
                        {
                            continue;
                        }
                        if let Err(error) = service.handle_remote_request(event.request).await {
                            warn!(%error, request = %event.request, "remote request failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event listener lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ---- internals ----------------------------------------------------

    /// Audit + store a CREATED status + task states + result queue + CREATE
    /// event, in that order, so a failure never leaves partial state behind.
    async fn start_query(&self, definition: QueryDefinition) -> Result<QueryKey> {
        let key = QueryKey::new(definition.query_logic_name.clone());
        let query_id = key.query_id;

        self.audit.record(query_id, &definition).await?;

        let status = QueryStatus::create(key.clone(), definition);
        self.storage.put_query_status(status).await?;
        self.allocate_execution_resources(query_id).await?;
        self.publish_to_executors(QueryRequest::create(query_id)).await?;
        debug!(%query_id, "query created");
        Ok(key)
    }

    async fn allocate_execution_resources(&self, query_id: Uuid) -> Result<()> {
        self.storage
            .put_task_states(TaskStates::allocate(query_id, 1))
            .await?;
        self.queues.create_queue(query_id).await
    }

    pub(crate) async fn cancel_inner(&self, query_id: Uuid, publish: bool) -> Result<()> {
        let lock = self.storage.status_lock(query_id);
        {
            let _guard = lock.lock().await;
            let mut status = self.require_status(query_id).await?;
            if !status.state.is_running() {
                return Err(QueryError::not_running("cancel"));
            }
            status.state = QueryState::Canceled;
            status.mark_updated();
            self.storage.update_query_status(status).await?;
        }

        // immediate teardown; in-flight next calls keep what they drained
        self.queues.delete_queue(query_id).await?;

        if publish {
            // interrupt whichever instance is blocked on this query, then
            // tell the executor pool to stop producing
            self.publish_to_query_services(QueryRequest::cancel(query_id)).await?;
            self.publish_to_executors(QueryRequest::cancel(query_id)).await?;
        }
        debug!(%query_id, "query canceled");
        Ok(())
    }

    pub(crate) async fn close_inner(&self, query_id: Uuid, publish: bool) -> Result<()> {
        let lock = self.storage.status_lock(query_id);
        let teardown_now = {
            let _guard = lock.lock().await;
            let mut status = self.require_status(query_id).await?;
            if !status.state.is_running() {
                return Err(QueryError::not_running("close"));
            }
            status.state = QueryState::Closed;
            status.mark_updated();
            let teardown_now = status.active_next_calls == 0;
            self.storage.update_query_status(status).await?;
            teardown_now
        };

        // with next calls still draining, teardown happens when the last
        // one finishes
        if teardown_now {
            self.queues.delete_queue(query_id).await?;
        }

        if publish {
            self.publish_to_executors(QueryRequest::close(query_id)).await?;
        }
        debug!(%query_id, "query closed");
        Ok(())
    }

    async fn remove_inner(&self, query_id: Uuid) -> Result<()> {
        let lock = self.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let status = self.require_status(query_id).await?;
        if status.state.is_running() {
            return Err(QueryError::RemoveRunning { query_id });
        }
        if status.active_next_calls > 0 {
            return Err(QueryError::RemoveActiveNext { query_id });
        }
        self.storage.delete_task_states(query_id).await?;
        self.storage.delete_query_status(query_id).await?;
        debug!(%query_id, "query removed");
        Ok(())
    }

    /// Delete every stored artifact of a query, regardless of state. Used
    /// after a successful plan exchange.
    async fn discard_query(&self, query_id: Uuid) -> Result<()> {
        if self.queues.queue_exists(query_id) {
            self.queues.delete_queue(query_id).await?;
        }
        self.storage.delete_task_states(query_id).await?;
        self.storage.delete_query_status(query_id).await?;
        Ok(())
    }

    /// Existence plus ownership check shared by every non-admin mutating
    /// operation. No state is touched on failure.
    async fn validate_request(&self, query_id: Uuid, caller: &UserDetails) -> Result<QueryStatus> {
        let status = self.require_status(query_id).await?;
        self.check_ownership(&status, caller)?;
        Ok(status)
    }

    async fn require_status(&self, query_id: Uuid) -> Result<QueryStatus> {
        self.storage
            .get_query_status(query_id)
            .await?
            .ok_or(QueryError::NotFound { query_id })
    }

    fn check_ownership(&self, status: &QueryStatus, caller: &UserDetails) -> Result<()> {
        if status.query.owner != caller.username {
            return Err(QueryError::ownership_mismatch(
                caller.username.clone(),
                status.query.owner.clone(),
            ));
        }
        Ok(())
    }

    fn require_admin(&self, caller: &UserDetails) -> Result<()> {
        if !caller.has_role(&self.properties.admin_role) {
            return Err(QueryError::forbidden(self.properties.admin_role.clone()));
        }
        Ok(())
    }

    fn filter_matches(status: &QueryStatus, filter: &QueryListFilter) -> bool {
        filter.query_id.is_none_or(|id| status.query_id() == id)
            && filter
                .query_name
                .as_ref()
                .is_none_or(|name| &status.query.query_name == name)
    }

    pub(crate) async fn publish_to_executors(&self, request: QueryRequest) -> Result<()> {
        self.bus
            .publish(RemoteQueryRequestEvent::new(
                self.properties.service_id.clone(),
                self.properties.executor_destination.clone(),
                request,
            ))
            .await
    }

    async fn publish_to_query_services(&self, request: QueryRequest) -> Result<()> {
        self.bus
            .publish(RemoteQueryRequestEvent::new(
                self.properties.service_id.clone(),
                self.properties.query_destination.clone(),
                request,
            ))
            .await
    }
}
