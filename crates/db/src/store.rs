//! PostgreSQL-backed [`ContractStore`].
//!
//! A contract and its phases are always written together in one
//! transaction. Unique-index violations (second open contract for a
//! proposal, shared workspace) surface as [`CoreError::Conflict`].

use std::collections::HashMap;

use async_trait::async_trait;
use contractflow_core::contract::{Contract, NewContract};
use contractflow_core::error::CoreError;
use contractflow_core::store::{ContractStore, ListQuery};
use contractflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::contract::ContractRow;
use crate::models::phase::PhaseRow;
use crate::repositories::{ContractRepo, PhaseRepo};

#[derive(Clone)]
pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn hydrate(&self, row: ContractRow) -> Result<Contract, CoreError> {
        let phases = PhaseRepo::list_for_contract(&self.pool, row.id)
            .await
            .map_err(db_error)?;
        row.into_contract(phases)
    }
}

/// Translate a database failure into the domain taxonomy.
fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or("unique constraint");
            return CoreError::Conflict(match constraint {
                "uq_contracts_open_proposal" => {
                    "The proposal already has an open contract".to_string()
                }
                "uq_contracts_workspace_id" => {
                    "The workspace is already attached to another contract".to_string()
                }
                other => format!("Duplicate value violates {other}"),
            });
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal(format!("Database error: {err}"))
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn insert(&self, new: &NewContract) -> Result<Contract, CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let row = ContractRepo::insert(&mut tx, new).await.map_err(db_error)?;
        let phases = PhaseRepo::replace_all(&mut tx, row.id, new.phases.phases())
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        row.into_contract(phases)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Contract>, CoreError> {
        match ContractRepo::find_by_id(&self.pool, id).await.map_err(db_error)? {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_open_by_proposal(
        &self,
        proposal_id: DbId,
    ) -> Result<Option<Contract>, CoreError> {
        match ContractRepo::find_open_by_proposal(&self.pool, proposal_id)
            .await
            .map_err(db_error)?
        {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_for_party(
        &self,
        user_id: DbId,
        query: ListQuery,
    ) -> Result<Vec<Contract>, CoreError> {
        let rows = ContractRepo::list_for_party(
            &self.pool,
            user_id,
            query.status,
            query.limit,
            query.offset,
        )
        .await
        .map_err(db_error)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<DbId> = rows.iter().map(|r| r.id).collect();
        let mut phases_by_contract: HashMap<DbId, Vec<PhaseRow>> = HashMap::new();
        for phase in PhaseRepo::list_for_contracts(&self.pool, &ids)
            .await
            .map_err(db_error)?
        {
            phases_by_contract
                .entry(phase.contract_id)
                .or_default()
                .push(phase);
        }

        rows.into_iter()
            .map(|row| {
                let phases = phases_by_contract.remove(&row.id).unwrap_or_default();
                row.into_contract(phases)
            })
            .collect()
    }

    async fn update(&self, contract: &Contract) -> Result<Contract, CoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let Some(row) = ContractRepo::update_versioned(&mut tx, contract)
            .await
            .map_err(db_error)?
        else {
            drop(tx);
            return Err(
                match ContractRepo::find_by_id(&self.pool, contract.id)
                    .await
                    .map_err(db_error)?
                {
                    Some(stored) => CoreError::Conflict(format!(
                        "Contract {} was modified concurrently (expected version {}, found {})",
                        contract.id, contract.version, stored.version
                    )),
                    None => CoreError::NotFound {
                        entity: "Contract",
                        id: contract.id,
                    },
                },
            );
        };
        let phases = PhaseRepo::replace_all(&mut tx, row.id, contract.phases.phases())
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        tracing::debug!(
            contract_id = row.id,
            version = row.version,
            status = %row.status,
            "Contract persisted"
        );
        row.into_contract(phases)
    }
}
