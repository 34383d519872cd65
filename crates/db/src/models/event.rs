//! Contract event row model.

use contractflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `contract_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContractEventRow {
    pub id: DbId,
    pub event_type: String,
    pub contract_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
}

/// Insert DTO for `contract_events`.
#[derive(Debug, Clone)]
pub struct CreateContractEvent<'a> {
    pub event_type: &'a str,
    pub contract_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub payload: &'a serde_json::Value,
    pub occurred_at: Timestamp,
}
