//! Contract row model.

use chrono::NaiveDate;
use contractflow_core::contract::{Contract, ContractStatus, SignatureRecord};
use contractflow_core::error::CoreError;
use contractflow_core::ledger::PhaseLedger;
use contractflow_core::types::{DbId, Money, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::phase::PhaseRow;

/// A row from the `contracts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContractRow {
    pub id: DbId,
    pub title: String,
    pub category: Option<String>,
    pub client_id: DbId,
    pub client_name: String,
    pub freelancer_id: DbId,
    pub freelancer_name: Option<String>,
    pub proposal_id: DbId,
    pub project_id: Option<DbId>,
    pub budget: Money,
    pub timeline: Option<String>,
    pub terms: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub status_reason: Option<String>,
    pub client_signature: Option<String>,
    pub client_signed_at: Option<Timestamp>,
    pub freelancer_signature: Option<String>,
    pub freelancer_signed_at: Option<Timestamp>,
    pub workspace_id: Option<String>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

fn signature_record(
    party_id: DbId,
    signature: Option<String>,
    signed_at: Option<Timestamp>,
) -> Option<SignatureRecord> {
    match (signature, signed_at) {
        (Some(signature), Some(signed_at)) => Some(SignatureRecord {
            party_id,
            signature,
            signed_at,
        }),
        _ => None,
    }
}

impl ContractRow {
    /// Assemble the domain aggregate from this row and its phase rows.
    pub fn into_contract(self, phases: Vec<PhaseRow>) -> Result<Contract, CoreError> {
        let status = ContractStatus::from_str_db(&self.status).map_err(|_| {
            CoreError::DataIntegrity(format!(
                "Contract {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let phases = phases
            .into_iter()
            .map(PhaseRow::into_phase)
            .collect::<Result<Vec<_>, _>>()?;
        let phases = PhaseLedger::from_phases(phases)?;

        Ok(Contract {
            id: self.id,
            title: self.title,
            category: self.category,
            client_id: self.client_id,
            client_name: self.client_name,
            freelancer_id: self.freelancer_id,
            freelancer_name: self.freelancer_name,
            proposal_id: self.proposal_id,
            project_id: self.project_id,
            budget: self.budget,
            timeline: self.timeline,
            terms: self.terms,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
            status_reason: self.status_reason,
            phases,
            client_signature: signature_record(
                self.client_id,
                self.client_signature,
                self.client_signed_at,
            ),
            freelancer_signature: signature_record(
                self.freelancer_id,
                self.freelancer_signature,
                self.freelancer_signed_at,
            ),
            workspace_id: self.workspace_id,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
