//! Contract phase row model.

use contractflow_core::error::CoreError;
use contractflow_core::ledger::{Phase, PhaseStatus};
use contractflow_core::types::{DbId, Money, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `contract_phases` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PhaseRow {
    pub id: DbId,
    pub contract_id: DbId,
    pub ordinal: i16,
    pub title: String,
    pub amount: Money,
    pub status: String,
    pub payment_ref: Option<String>,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PhaseRow {
    pub fn into_phase(self) -> Result<Phase, CoreError> {
        let ordinal = u16::try_from(self.ordinal).map_err(|_| {
            CoreError::DataIntegrity(format!(
                "Phase {} of contract {} has invalid ordinal {}",
                self.id, self.contract_id, self.ordinal
            ))
        })?;
        let status = PhaseStatus::from_str_db(&self.status).map_err(|_| {
            CoreError::DataIntegrity(format!(
                "Phase {} of contract {} has unknown status '{}'",
                self.id, self.contract_id, self.status
            ))
        })?;
        Ok(Phase {
            ordinal,
            title: self.title,
            amount: self.amount,
            status,
            payment_ref: self.payment_ref,
            paid_at: self.paid_at,
        })
    }
}
