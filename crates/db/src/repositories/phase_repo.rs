//! Repository for the `contract_phases` table.

use contractflow_core::ledger::Phase;
use contractflow_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::phase::PhaseRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, contract_id, ordinal, title, amount, status, payment_ref, paid_at, created_at, updated_at";

/// Provides read and replace operations for contract phases.
pub struct PhaseRepo;

impl PhaseRepo {
    /// List a contract's phases ordered by ordinal.
    pub async fn list_for_contract(
        pool: &PgPool,
        contract_id: DbId,
    ) -> Result<Vec<PhaseRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM contract_phases WHERE contract_id = $1 ORDER BY ordinal"
        );
        sqlx::query_as::<_, PhaseRow>(&query)
            .bind(contract_id)
            .fetch_all(pool)
            .await
    }

    /// List the phases of several contracts at once.
    pub async fn list_for_contracts(
        pool: &PgPool,
        contract_ids: &[DbId],
    ) -> Result<Vec<PhaseRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM contract_phases \
             WHERE contract_id = ANY($1) \
             ORDER BY contract_id, ordinal"
        );
        sqlx::query_as::<_, PhaseRow>(&query)
            .bind(contract_ids)
            .fetch_all(pool)
            .await
    }

    /// Make the stored phases equal `phases`: upsert by `(contract_id,
    /// ordinal)` and delete any ordinal past the end.
    pub async fn replace_all(
        conn: &mut PgConnection,
        contract_id: DbId,
        phases: &[Phase],
    ) -> Result<Vec<PhaseRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO contract_phases \
                (contract_id, ordinal, title, amount, status, payment_ref, paid_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (contract_id, ordinal) DO UPDATE SET \
                title = EXCLUDED.title, \
                amount = EXCLUDED.amount, \
                status = EXCLUDED.status, \
                payment_ref = EXCLUDED.payment_ref, \
                paid_at = EXCLUDED.paid_at \
             RETURNING {COLUMNS}"
        );

        let mut rows = Vec::with_capacity(phases.len());
        for phase in phases {
            let row = sqlx::query_as::<_, PhaseRow>(&query)
                .bind(contract_id)
                .bind(phase.ordinal as i16)
                .bind(&phase.title)
                .bind(phase.amount)
                .bind(phase.status.as_str())
                .bind(&phase.payment_ref)
                .bind(phase.paid_at)
                .fetch_one(&mut *conn)
                .await?;
            rows.push(row);
        }

        sqlx::query("DELETE FROM contract_phases WHERE contract_id = $1 AND ordinal > $2")
            .bind(contract_id)
            .bind(phases.len() as i16)
            .execute(&mut *conn)
            .await?;

        Ok(rows)
    }
}
