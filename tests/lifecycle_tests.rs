//! Define/create/update/remove lifecycle behavior: stored state, resource
//! allocation, event publication, auditing, and the ownership checks every
//! non-admin operation performs.

mod common;

use common::*;
use queryflow_core::events::RequestMethod;
use queryflow_core::models::{DefinitionOverrides, QueryState};
use queryflow_core::QueryError;
use uuid::Uuid;

#[tokio::test]
async fn create_starts_an_executing_query() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    let status = harness.status(query_id).await;
    assert_eq!(status.state, QueryState::Created);
    assert_eq!(status.query.owner, "userdn");
    assert_eq!(status.query.query_logic_name, "EventQuery");
    assert!(harness.queues.queue_exists(query_id));
    assert!(harness
        .storage
        .get_task_states(query_id)
        .await
        .unwrap()
        .is_some());

    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method(), RequestMethod::Create);
    assert_eq!(events[0].destination, "executor-unassigned:**");
    assert_eq!(events[0].origin_service, "query:test-1");
    assert_eq!(events[0].query_id(), query_id);

    let audited = harness.audit.records.lock().unwrap();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].0, query_id);
}

#[tokio::test]
async fn define_parks_the_query_without_resources() {
    let harness = TestHarness::new();
    let key = harness
        .service
        .define("EventQuery", &query_params(), &caller())
        .await
        .unwrap();

    let status = harness.status(key.query_id).await;
    assert_eq!(status.state, QueryState::Defined);
    assert!(!harness.queues.queue_exists(key.query_id));
    assert!(harness
        .storage
        .get_task_states(key.query_id)
        .await
        .unwrap()
        .is_none());
    assert!(harness.drain_events().is_empty());
    assert!(harness.audit.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn create_defined_promotes_a_parked_query() {
    let harness = TestHarness::new();
    let key = harness
        .service
        .define("EventQuery", &query_params(), &caller())
        .await
        .unwrap();

    harness
        .service
        .create_defined(key.query_id, &caller())
        .await
        .unwrap();

    let status = harness.status(key.query_id).await;
    assert_eq!(status.state, QueryState::Created);
    assert!(harness.queues.queue_exists(key.query_id));
    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method(), RequestMethod::Create);
    assert_eq!(harness.audit.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn create_defined_rejects_a_running_query() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    let error = harness
        .service
        .create_defined(query_id, &caller())
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Cannot call create on a query that is not defined"
    );
}

#[tokio::test]
async fn validation_failure_stores_nothing() {
    let harness = TestHarness::new();
    let mut params = query_params();
    params.remove("query");

    let error = harness
        .service
        .create("EventQuery", &params, &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, QueryError::Validation { .. }));
    assert_eq!(error.status_code(), 400);
    assert!(harness.storage.list_query_statuses().await.unwrap().is_empty());
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn audit_failure_aborts_before_any_mutation() {
    use queryflow_core::events::QueryEventBus;
    use queryflow_core::lifecycle::QueryManagementService;
    use std::sync::Arc;

    let storage = Arc::new(queryflow_core::storage::InMemoryQueryStorage::new());
    let queues = Arc::new(queryflow_core::queue::InMemoryQueueManager::new());
    let bus = Arc::new(queryflow_core::events::LocalEventBus::default());
    let mut events = bus.subscribe();
    let service = QueryManagementService::new(
        test_properties(),
        storage.clone(),
        queues,
        bus,
        Arc::new(StubValidator),
        Arc::new(FailingAuditSink),
    );

    let error = service
        .create("EventQuery", &query_params(), &caller())
        .await
        .unwrap_err();
    assert!(matches!(error, QueryError::Internal { .. }));
    assert!(storage.list_query_statuses().await.unwrap().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unknown_query_id_is_not_found() {
    let harness = TestHarness::new();
    let query_id = Uuid::new_v4();

    let error = harness.service.cancel(query_id, &caller()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("No query object matches this id. {query_id}")
    );
    assert_eq!(error.status_code(), 404);
}

#[tokio::test]
async fn non_owner_is_rejected_before_any_state_check() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    let error = harness
        .service
        .cancel(query_id, &other_caller())
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Current user does not match user that defined query. altuserdn != userdn"
    );
    assert_eq!(error.status_code(), 401);
    // untouched
    assert_eq!(harness.status(query_id).await.state, QueryState::Created);
}

#[tokio::test]
async fn update_rewrites_a_defined_query() {
    let harness = TestHarness::new();
    let key = harness
        .service
        .define("EventQuery", &query_params(), &caller())
        .await
        .unwrap();

    let overrides = DefinitionOverrides {
        query: Some("FIELD == 'other'".to_string()),
        page_size: Some(50),
        ..Default::default()
    };
    harness
        .service
        .update(key.query_id, &overrides, &caller())
        .await
        .unwrap();

    let status = harness.status(key.query_id).await;
    assert_eq!(status.query.query, "FIELD == 'other'");
    assert_eq!(status.query.page_size, 50);
    assert_eq!(status.state, QueryState::Defined);
}

#[tokio::test]
async fn update_rejects_a_query_that_left_defined() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    let error = harness
        .service
        .update(query_id, &DefinitionOverrides::default(), &caller())
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Cannot call update on a query that is not defined"
    );
    assert_eq!(error.status_code(), 400);
}

#[tokio::test]
async fn remove_rejects_a_running_query() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    let error = harness.service.remove(query_id, &caller()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Cannot remove a running query. {query_id}")
    );
    assert!(harness
        .storage
        .get_query_status(query_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn remove_deletes_a_closed_query() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;
    harness.service.close(query_id, &caller()).await.unwrap();

    harness.service.remove(query_id, &caller()).await.unwrap();

    assert!(harness
        .storage
        .get_query_status(query_id)
        .await
        .unwrap()
        .is_none());
    assert!(harness
        .storage
        .get_task_states(query_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn remove_rejects_active_next_calls() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;
    harness.service.close(query_id, &caller()).await.unwrap();

    // stage an in-flight next call
    {
        let lock = harness.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let mut status = harness.status(query_id).await;
        status.active_next_calls = 1;
        harness.storage.update_query_status(status).await.unwrap();
    }

    let error = harness.service.remove(query_id, &caller()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Cannot remove a query with active next calls. {query_id}")
    );
}

#[tokio::test]
async fn remove_deletes_a_defined_query() {
    let harness = TestHarness::new();
    let key = harness
        .service
        .define("EventQuery", &query_params(), &caller())
        .await
        .unwrap();

    harness.service.remove(key.query_id, &caller()).await.unwrap();
    assert!(harness
        .storage
        .get_query_status(key.query_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn get_returns_own_queries_and_admin_sees_all() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    assert_eq!(
        harness.service.get(query_id, &caller()).await.unwrap().query_id(),
        query_id
    );
    assert!(harness.service.get(query_id, &other_caller()).await.is_err());
    assert_eq!(
        harness.service.get(query_id, &admin()).await.unwrap().query_id(),
        query_id
    );
}

#[tokio::test]
async fn get_refreshes_the_last_used_time() {
    let harness = TestHarness::new();
    let query_id = harness.create_query(&caller()).await;

    // age the record so the refresh is observable
    {
        let lock = harness.storage.status_lock(query_id);
        let _guard = lock.lock().await;
        let mut status = harness.status(query_id).await;
        status.last_used_millis = 1;
        harness.storage.update_query_status(status).await.unwrap();
    }

    let fetched = harness.service.get(query_id, &caller()).await.unwrap();
    assert!(fetched.last_used_millis > 1);
    assert!(harness.status(query_id).await.last_used_millis > 1);
}

#[tokio::test]
async fn list_scopes_to_the_caller() {
    use queryflow_core::lifecycle::QueryListFilter;

    let harness = TestHarness::new();
    let mine = harness.create_query(&caller()).await;
    harness.create_query(&other_caller()).await;

    let listed = harness
        .service
        .list(&QueryListFilter::default(), &caller())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].query_id(), mine);

    // narrowing by id
    let filtered = harness
        .service
        .list(
            &QueryListFilter {
                query_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
            &caller(),
        )
        .await
        .unwrap();
    assert!(filtered.is_empty());
}
