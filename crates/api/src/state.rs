use std::sync::Arc;

use contractflow_core::engine::ContractEngine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, used for health reporting. `None` when the engine runs
    /// on the in-memory store.
    pub pool: Option<contractflow_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Serialized contract operations over the configured store and
    /// collaborators.
    pub engine: Arc<ContractEngine>,
    /// Event bus for publishing contract events.
    pub event_bus: Arc<contractflow_events::EventBus>,
}
