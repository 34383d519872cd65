//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` in the API state. Handlers
//! publish a [`ContractEvent`] after each successful operation.

use chrono::{DateTime, Utc};
use contractflow_core::contract::Contract;
use contractflow_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Every event a contract can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "contract.drafted")]
    Drafted,
    #[serde(rename = "contract.sent")]
    Sent,
    #[serde(rename = "contract.signed")]
    Signed,
    #[serde(rename = "contract.activated")]
    Activated,
    #[serde(rename = "contract.changes_requested")]
    ChangesRequested,
    #[serde(rename = "contract.revised")]
    Revised,
    #[serde(rename = "contract.cancelled")]
    Cancelled,
    #[serde(rename = "contract.declined")]
    Declined,
    #[serde(rename = "contract.disputed")]
    Disputed,
    #[serde(rename = "contract.completed")]
    Completed,
    #[serde(rename = "contract.phase_paid")]
    PhasePaid,
    #[serde(rename = "contract.workspace_attached")]
    WorkspaceAttached,
}

impl EventKind {
    /// Dot-separated name stored in `contract_events.event_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafted => "contract.drafted",
            Self::Sent => "contract.sent",
            Self::Signed => "contract.signed",
            Self::Activated => "contract.activated",
            Self::ChangesRequested => "contract.changes_requested",
            Self::Revised => "contract.revised",
            Self::Cancelled => "contract.cancelled",
            Self::Declined => "contract.declined",
            Self::Disputed => "contract.disputed",
            Self::Completed => "contract.completed",
            Self::PhasePaid => "contract.phase_paid",
            Self::WorkspaceAttached => "contract.workspace_attached",
        }
    }
}

// ---------------------------------------------------------------------------
// ContractEvent
// ---------------------------------------------------------------------------

/// A domain event that happened to one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub kind: EventKind,
    pub contract_id: DbId,
    /// User that triggered the event; `None` for service callers.
    pub actor_user_id: Option<DbId>,
    /// Event-specific data. Always carries the contract's status after the
    /// operation.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ContractEvent {
    /// Event for `contract` with a payload holding its status and version.
    pub fn new(kind: EventKind, contract: &Contract) -> Self {
        Self {
            kind,
            contract_id: contract.id,
            actor_user_id: None,
            payload: serde_json::json!({
                "status": contract.status,
                "version": contract.version,
            }),
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Merge extra fields into the payload object.
    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(
                key.to_string(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<ContractEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ContractEvent) {
        tracing::debug!(
            event_type = event.kind.as_str(),
            contract_id = event.contract_id,
            "Publishing contract event"
        );
        // Zero receivers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
