#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # QueryFlow Core
//!
//! Distributed query lifecycle orchestration: the control plane that sits
//! between callers submitting queries and the remote worker pool executing
//! them.
//!
//! ## Overview
//!
//! A query moves through a small state machine (DEFINED, CREATED, CLOSED,
//! CANCELED). This crate owns every transition: it validates and stores
//! definitions, starts execution by allocating task state and a result
//! queue and signaling the executor pool, assembles result pages on demand,
//! and coordinates cancel/close across service instances over an event bus.
//! Query evaluation itself happens elsewhere; workers push result records
//! into per-query queues that the next-page assembler drains.
//!
//! ## Module Organization
//!
//! - [`lifecycle`] - the QueryManagementService orchestrator and next-page assembly
//! - [`models`] - query keys, definitions, status, task state, pages, callers
//! - [`storage`] - query status storage contract and the in-memory cache
//! - [`queue`] - per-query result queue contract and the in-memory provider
//! - [`events`] - remote query requests, the event bus, destination routing
//! - [`validation`] - raw parameters and the validator seam
//! - [`audit`] - audit sink seam for queries entering execution
//! - [`config`] - runtime configuration
//! - [`error`] - structured error handling
//! - [`logging`] - tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use queryflow_core::audit::LoggingAuditSink;
//! use queryflow_core::config::QueryProperties;
//! use queryflow_core::events::LocalEventBus;
//! use queryflow_core::lifecycle::QueryManagementService;
//! use queryflow_core::queue::InMemoryQueueManager;
//! use queryflow_core::storage::InMemoryQueryStorage;
//! use queryflow_core::validation::{QueryParameters, QueryValidator};
//! use std::sync::Arc;
//!
//! # async fn example(validator: Arc<dyn QueryValidator>) -> queryflow_core::Result<()> {
//! let service = Arc::new(QueryManagementService::new(
//!     QueryProperties::load()?,
//!     Arc::new(InMemoryQueryStorage::new()),
//!     Arc::new(InMemoryQueueManager::new()),
//!     Arc::new(LocalEventBus::default()),
//!     validator,
//!     Arc::new(LoggingAuditSink),
//! ));
//! service.spawn_event_listener();
//!
//! let mut params = QueryParameters::new();
//! params.set("query", "FIELD == 'value'");
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod queue;
pub mod storage;
pub mod validation;

pub use config::QueryProperties;
pub use error::{QueryError, Result};
pub use lifecycle::{NextOutcome, QueryListFilter, QueryManagementService};
pub use models::{
    QueryDefinition, QueryKey, QueryState, QueryStatus, ResultRecord, ResultsPage, UserDetails,
};
