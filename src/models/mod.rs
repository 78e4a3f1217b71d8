//! # Query Domain Models
//!
//! Data types for the query lifecycle: identifiers, definitions, the mutable
//! status record, task decomposition state, result records and pages, and
//! caller identity.
//!
//! - [`query`] - QueryKey, QueryDefinition, DefinitionOverrides
//! - [`status`] - QueryState and the mutable QueryStatus record
//! - [`task`] - TaskKey, TaskPhase, TaskStates
//! - [`page`] - ResultRecord and ResultsPage
//! - [`user`] - UserDetails caller identity

pub mod page;
pub mod query;
pub mod status;
pub mod task;
pub mod user;

pub use page::{ResultRecord, ResultsPage};
pub use query::{DefinitionOverrides, QueryDefinition, QueryKey};
pub use status::{QueryState, QueryStatus};
pub use task::{TaskKey, TaskPhase, TaskStates};
pub use user::UserDetails;
