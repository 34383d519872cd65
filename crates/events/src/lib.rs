//! Contract event bus and audit persistence.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ContractEvent`]: the event envelope published by the API handlers.
//! - [`EventPersistence`]: background service that writes every event to
//!   the `contract_events` table.

pub mod bus;
pub mod persistence;

pub use bus::{ContractEvent, EventBus, EventKind};
pub use persistence::EventPersistence;
