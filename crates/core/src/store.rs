//! Persistence and upstream seams of the engine.
//!
//! [`ContractStore`] is implemented by the PostgreSQL repository in the db
//! crate and by [`InMemoryContractStore`] for tests and local runs.
//! [`ProposalSource`] is implemented over HTTP in the clients crate.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::contract::{Contract, ContractStatus, NewContract};
use crate::error::CoreError;
use crate::types::DbId;

/// Default page size for contract listings.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Hard upper bound on a listing page.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Filter for [`ContractStore::list_for_party`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<ContractStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    /// Clamp caller-supplied paging values into range.
    pub fn new(status: Option<ContractStatus>, limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            status,
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Durable storage for contracts and their phases.
///
/// `update` is an optimistic write: it succeeds only when the stored
/// version equals `contract.version`, and returns the row with the bumped
/// version. A stale version is a [`CoreError::Conflict`].
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a new draft. Fails with [`CoreError::Conflict`] if an open
    /// contract already exists for the same proposal.
    async fn insert(&self, new: &NewContract) -> Result<Contract, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Contract>, CoreError>;

    /// The contract for `proposal_id` that is neither cancelled nor declined.
    async fn find_open_by_proposal(&self, proposal_id: DbId) -> Result<Option<Contract>, CoreError>;

    /// Contracts where `user_id` is either party, newest first.
    async fn list_for_party(&self, user_id: DbId, query: ListQuery)
        -> Result<Vec<Contract>, CoreError>;

    async fn update(&self, contract: &Contract) -> Result<Contract, CoreError>;
}

/// Read access to the external proposal service.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Raw proposal payload, or `None` if the service does not know the id.
    async fn fetch_proposal(&self, proposal_id: DbId) -> Result<Option<Value>, CoreError>;

    /// Ask the proposal service to mark a proposal accepted by `client_id`.
    async fn mark_accepted(&self, proposal_id: DbId, client_id: DbId) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Rows {
    next_id: DbId,
    contracts: BTreeMap<DbId, Contract>,
}

/// A [`ContractStore`] that keeps everything in process memory.
///
/// Enforces the same uniqueness rules as the database schema: one open
/// contract per proposal and one contract per workspace.
#[derive(Default)]
pub struct InMemoryContractStore {
    rows: Mutex<Rows>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.contracts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn insert(&self, new: &NewContract) -> Result<Contract, CoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(existing) = rows
            .contracts
            .values()
            .find(|c| c.proposal_id == new.proposal_id && !c.status.is_abandoned())
        {
            return Err(CoreError::Conflict(format!(
                "Proposal {} already has open contract {}",
                new.proposal_id, existing.id
            )));
        }

        rows.next_id += 1;
        let now = Utc::now();
        let contract = Contract {
            id: rows.next_id,
            title: new.title.clone(),
            category: new.category.clone(),
            client_id: new.client_id,
            client_name: new.client_name.clone(),
            freelancer_id: new.freelancer_id,
            freelancer_name: new.freelancer_name.clone(),
            proposal_id: new.proposal_id,
            project_id: new.project_id,
            budget: new.budget,
            timeline: new.timeline.clone(),
            terms: new.terms.clone(),
            start_date: None,
            end_date: None,
            status: ContractStatus::Draft,
            status_reason: None,
            phases: new.phases.clone(),
            client_signature: None,
            freelancer_signature: None,
            workspace_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        rows.contracts.insert(contract.id, contract.clone());
        Ok(contract)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Contract>, CoreError> {
        Ok(self.rows.lock().await.contracts.get(&id).cloned())
    }

    async fn find_open_by_proposal(
        &self,
        proposal_id: DbId,
    ) -> Result<Option<Contract>, CoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .contracts
            .values()
            .find(|c| c.proposal_id == proposal_id && !c.status.is_abandoned())
            .cloned())
    }

    async fn list_for_party(
        &self,
        user_id: DbId,
        query: ListQuery,
    ) -> Result<Vec<Contract>, CoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .contracts
            .values()
            .rev()
            .filter(|c| c.party_of(user_id).is_some())
            .filter(|c| query.status.map_or(true, |s| c.status == s))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn update(&self, contract: &Contract) -> Result<Contract, CoreError> {
        let mut rows = self.rows.lock().await;
        let stored = rows.contracts.get(&contract.id).ok_or(CoreError::NotFound {
            entity: "Contract",
            id: contract.id,
        })?;
        if stored.version != contract.version {
            return Err(CoreError::Conflict(format!(
                "Contract {} was modified concurrently (expected version {}, found {})",
                contract.id, contract.version, stored.version
            )));
        }
        if let Some(workspace_id) = &contract.workspace_id {
            if let Some(other) = rows
                .contracts
                .values()
                .find(|c| c.id != contract.id && c.workspace_id.as_ref() == Some(workspace_id))
            {
                return Err(CoreError::Conflict(format!(
                    "Workspace {workspace_id} is already attached to contract {}",
                    other.id
                )));
            }
        }

        let mut saved = contract.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        rows.contracts.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
