//! Durable event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and appends every received [`ContractEvent`] to the
//! `contract_events` table. It runs as a long-lived background task and
//! shuts down when the bus sender is dropped.

use contractflow_core::types::DbId;
use contractflow_db::models::event::CreateContractEvent;
use contractflow_db::repositories::ContractEventRepo;
use contractflow_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::ContractEvent;

/// Background service that persists contract events to the database.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<ContractEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = event.kind.as_str(),
                            contract_id = event.contract_id,
                            "Failed to persist contract event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &ContractEvent) -> Result<DbId, sqlx::Error> {
        ContractEventRepo::insert(
            pool,
            &CreateContractEvent {
                event_type: event.kind.as_str(),
                contract_id: Some(event.contract_id),
                actor_user_id: event.actor_user_id,
                payload: &event.payload,
                occurred_at: event.timestamp,
            },
        )
        .await
    }
}
