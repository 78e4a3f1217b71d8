//! # Remote Query Events
//!
//! Control messages exchanged with remote executor workers over the event
//! bus, plus the bus abstraction itself.
//!
//! - [`request`] - QueryRequest tagged union and the routed event envelope
//! - [`bus`] - QueryEventBus trait, LocalEventBus, destination matching

pub mod bus;
pub mod request;

pub use bus::{destination_matches, LocalEventBus, QueryEventBus};
pub use request::{QueryRequest, RemoteQueryRequestEvent, RequestMethod};
