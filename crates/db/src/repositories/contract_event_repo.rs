//! Repository for the `contract_events` table.

use contractflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::{ContractEventRow, CreateContractEvent};

/// Column list for `contract_events` queries.
const COLUMNS: &str =
    "id, event_type, contract_id, actor_user_id, payload, occurred_at, created_at";

/// Append and read the contract audit trail.
pub struct ContractEventRepo;

impl ContractEventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event: &CreateContractEvent<'_>,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO contract_events \
                (event_type, contract_id, actor_user_id, payload, occurred_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event.event_type)
        .bind(event.contract_id)
        .bind(event.actor_user_id)
        .bind(event.payload)
        .bind(event.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// Events recorded for one contract, oldest first.
    pub async fn list_for_contract(
        pool: &PgPool,
        contract_id: DbId,
    ) -> Result<Vec<ContractEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM contract_events \
             WHERE contract_id = $1 \
             ORDER BY occurred_at, id"
        );
        sqlx::query_as::<_, ContractEventRow>(&query)
            .bind(contract_id)
            .fetch_all(pool)
            .await
    }
}
