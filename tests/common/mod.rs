//! Shared test harness: a fully wired lifecycle service over the in-memory
//! storage, queue, and bus implementations, plus fixture callers and a
//! validator stub.

#![allow(dead_code)]

use async_trait::async_trait;
use queryflow_core::audit::AuditSink;
use queryflow_core::config::QueryProperties;
use queryflow_core::error::{QueryError, Result};
use queryflow_core::events::{LocalEventBus, RemoteQueryRequestEvent};
use queryflow_core::lifecycle::QueryManagementService;
use queryflow_core::models::{QueryDefinition, QueryStatus, ResultRecord, TaskPhase, UserDetails};
use queryflow_core::queue::InMemoryQueueManager;
use queryflow_core::storage::InMemoryQueryStorage;

// trait methods on the harness fields stay callable in every suite
pub use queryflow_core::events::QueryEventBus;
pub use queryflow_core::queue::ResultQueueManager;
pub use queryflow_core::storage::QueryStorage;
use queryflow_core::validation::{QueryParameters, QueryValidator};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Properties tuned so blocking paths resolve in test time.
pub fn test_properties() -> QueryProperties {
    QueryProperties {
        service_id: "query:test-1".to_string(),
        next_call_timeout_ms: 300,
        result_poll_interval_ms: 20,
        plan_timeout_ms: 300,
        ..QueryProperties::default()
    }
}

pub fn caller() -> UserDetails {
    UserDetails::new("userdn", "cn=user").with_auths(vec!["ALL".to_string()])
}

pub fn other_caller() -> UserDetails {
    UserDetails::new("altuserdn", "cn=altuser").with_auths(vec!["ALL".to_string()])
}

pub fn admin() -> UserDetails {
    UserDetails::new("adminuserdn", "cn=admin").with_roles(vec!["Administrator".to_string()])
}

/// Minimal valid parameter set for the stub validator.
pub fn query_params() -> QueryParameters {
    let mut params = QueryParameters::new();
    params
        .set("query", "FIELD == 'value'")
        .set("queryName", "test query")
        .set("auths", "ALL")
        .set("pagesize", "10");
    params
}

/// Validator stub: builds a definition straight from the parameters, failing
/// only when the query expression is missing.
pub struct StubValidator;

#[async_trait]
impl QueryValidator for StubValidator {
    async fn validate(
        &self,
        query_logic_name: &str,
        parameters: &QueryParameters,
        caller: &UserDetails,
    ) -> Result<QueryDefinition> {
        let query = parameters.first("query").ok_or_else(|| {
            QueryError::validation("missing-required-parameter", "query parameter is required")
        })?;
        Ok(QueryDefinition {
            query: query.to_string(),
            query_name: parameters.first("queryName").unwrap_or("unnamed").to_string(),
            query_logic_name: query_logic_name.to_string(),
            query_authorizations: parameters.all("auths").to_vec(),
            begin_date: None,
            end_date: None,
            visibility: "ALL".to_string(),
            page_size: parameters.first("pagesize").and_then(|v| v.parse().ok()).unwrap_or(10),
            max_results_override: parameters
                .first("max.results.override")
                .and_then(|v| v.parse().ok()),
            max_concurrent_tasks: None,
            owner: caller.username.clone(),
            user_dn: caller.dn.clone(),
            parameters: Default::default(),
        })
    }
}

/// Audit sink capturing every record for assertion.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub records: Mutex<Vec<(Uuid, QueryDefinition)>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, query_id: Uuid, query: &QueryDefinition) -> Result<()> {
        self.records.lock().unwrap().push((query_id, query.clone()));
        Ok(())
    }
}

/// Audit sink that always fails, for abort-before-mutation tests.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _query_id: Uuid, _query: &QueryDefinition) -> Result<()> {
        Err(QueryError::internal("audit sink unavailable"))
    }
}

pub struct TestHarness {
    pub service: Arc<QueryManagementService>,
    pub storage: Arc<InMemoryQueryStorage>,
    pub queues: Arc<InMemoryQueueManager>,
    pub bus: Arc<LocalEventBus>,
    pub audit: Arc<RecordingAuditSink>,
    events: Mutex<broadcast::Receiver<RemoteQueryRequestEvent>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_properties(test_properties())
    }

    pub fn with_properties(properties: QueryProperties) -> Self {
        let storage = Arc::new(InMemoryQueryStorage::new());
        let queues = Arc::new(InMemoryQueueManager::new());
        let bus = Arc::new(LocalEventBus::default());
        let audit = Arc::new(RecordingAuditSink::default());
        let events = Mutex::new(bus.subscribe());
        let service = Arc::new(QueryManagementService::new(
            properties,
            storage.clone(),
            queues.clone(),
            bus.clone(),
            Arc::new(StubValidator),
            audit.clone(),
        ));
        Self {
            service,
            storage,
            queues,
            bus,
            audit,
            events,
        }
    }

    /// Create a running query owned by `caller` and return its id.
    pub async fn create_query(&self, caller: &UserDetails) -> Uuid {
        let key = self
            .service
            .create("EventQuery", &query_params(), caller)
            .await
            .expect("create should succeed");
        key.query_id
    }

    pub async fn status(&self, query_id: Uuid) -> QueryStatus {
        self.storage
            .get_query_status(query_id)
            .await
            .expect("storage read should succeed")
            .expect("status should exist")
    }

    /// Push `count` worker results onto the queue and bump the generated
    /// counter the way a worker's result publisher would.
    pub async fn publish_results(&self, query_id: Uuid, count: u64) {
        let lock = self.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let mut status = self.status(query_id).await;
        for i in 0..count {
            let sequence = status.num_results_generated + i;
            self.queues
                .publish(query_id, ResultRecord::new(sequence, json!({ "seq": sequence })))
                .await
                .expect("publish should succeed");
        }
        status.num_results_generated += count;
        self.storage
            .update_query_status(status)
            .await
            .expect("status update should succeed");
    }

    /// Mark every task finished, as workers do when execution completes.
    pub async fn finish_tasks(&self, query_id: Uuid) {
        let mut states = self
            .storage
            .get_task_states(query_id)
            .await
            .expect("storage read should succeed")
            .expect("task states should exist");
        for key in states.task_keys() {
            states.set_phase(key.task_id, TaskPhase::Completed);
        }
        self.storage
            .put_task_states(states)
            .await
            .expect("task state update should succeed");
    }

    /// Everything published on the bus since the last drain.
    pub fn drain_events(&self) -> Vec<RemoteQueryRequestEvent> {
        let mut receiver = self.events.lock().unwrap();
        let mut drained = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            drained.push(event);
        }
        drained
    }
}
