//! The contract engine: every externally triggered operation, serialized
//! per contract.
//!
//! Each operation acquires the contract's lock (or the proposal's lock when
//! drafting), loads a fresh copy from the store, applies the pure domain
//! functions to it, and persists the result with an optimistic version
//! check. Nothing is written when any step fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::contract::{Contract, ContractStatus, PartyIdentity};
use crate::error::CoreError;
use crate::ledger::PaymentOutcome;
use crate::lifecycle::{self, DraftUpdate, SignatureStage};
use crate::proposal_intake::{self, ProposalFacts, ProposalStatus};
use crate::provisioning::{
    Provisioned, WorkspaceProvisioner, WorkspaceService, DEFAULT_PROVISION_TIMEOUT,
};
use crate::signature::{self, SignatureReceipt};
use crate::store::{ContractStore, ListQuery, ProposalSource};
use crate::types::{DbId, Money};

/// Default bounded wait for a contract or proposal lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

// ---------------------------------------------------------------------------
// Keyed locks
// ---------------------------------------------------------------------------

/// One async mutex per key, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquire.
pub struct KeyedLocks {
    scope: &'static str,
    timeout: Duration,
    locks: Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new(scope: &'static str, timeout: Duration) -> Self {
        Self {
            scope,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait up to the configured timeout for `key`'s lock.
    pub async fn acquire(&self, key: DbId) -> Result<OwnedMutexGuard<()>, CoreError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(scope = self.scope, key, "Lock wait timed out");
                CoreError::Conflict(format!("{} {key} is busy, retry", self.scope))
            })
    }
}

// ---------------------------------------------------------------------------
// Configuration and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub lock_timeout: Duration,
    pub provision_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }
}

/// Result of drafting (or resuming a draft) from a proposal.
#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub contract: Contract,
    /// `false` when an existing open contract was returned.
    pub created: bool,
}

/// Result of a signature.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub contract: Contract,
    pub receipt: SignatureReceipt,
    /// Set when this signature completed the pair and the contract became
    /// active.
    pub activated: bool,
    pub workspace_created: bool,
}

/// Result of a payment confirmation.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub contract: Contract,
    pub ordinal: u16,
    pub outcome: PaymentOutcome,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ContractEngine {
    store: Arc<dyn ContractStore>,
    proposals: Arc<dyn ProposalSource>,
    provisioner: WorkspaceProvisioner,
    contract_locks: KeyedLocks,
    proposal_locks: KeyedLocks,
}

impl ContractEngine {
    pub fn new(
        store: Arc<dyn ContractStore>,
        proposals: Arc<dyn ProposalSource>,
        workspaces: Arc<dyn WorkspaceService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            proposals,
            provisioner: WorkspaceProvisioner::new(workspaces, config.provision_timeout),
            contract_locks: KeyedLocks::new("Contract", config.lock_timeout),
            proposal_locks: KeyedLocks::new("Proposal", config.lock_timeout),
        }
    }

    async fn load(&self, id: DbId) -> Result<Contract, CoreError> {
        self.store.find_by_id(id).await?.ok_or(CoreError::NotFound {
            entity: "Contract",
            id,
        })
    }

    /// Lock, load, mutate, persist. `mutate` runs on a private copy so an
    /// error leaves nothing behind.
    async fn mutate<T>(
        &self,
        id: DbId,
        mutate: impl FnOnce(&mut Contract) -> Result<T, CoreError>,
    ) -> Result<(Contract, T), CoreError> {
        let _guard = self.contract_locks.acquire(id).await?;
        let mut contract = self.load(id).await?;
        let value = mutate(&mut contract)?;
        let saved = self.store.update(&contract).await?;
        Ok((saved, value))
    }

    // -- Proposal intake ----------------------------------------------------

    /// Resume-draft keyed by proposal: returns the open contract for the
    /// proposal if there is one, otherwise drafts a new one.
    pub async fn draft_from_proposal(
        &self,
        proposal_id: DbId,
        client: &PartyIdentity,
    ) -> Result<DraftOutcome, CoreError> {
        let _guard = self.proposal_locks.acquire(proposal_id).await?;
        if let Some(existing) = self.resume(proposal_id, client).await? {
            return Ok(existing);
        }
        let facts = self.fetch_facts(proposal_id).await?;
        self.insert_draft(&facts, client).await
    }

    /// Mark a submitted proposal accepted upstream, then draft its contract.
    pub async fn accept_proposal(
        &self,
        proposal_id: DbId,
        client: &PartyIdentity,
    ) -> Result<DraftOutcome, CoreError> {
        let _guard = self.proposal_locks.acquire(proposal_id).await?;
        if let Some(existing) = self.resume(proposal_id, client).await? {
            return Ok(existing);
        }
        let mut facts = self.fetch_facts(proposal_id).await?;
        match facts.status {
            Some(ProposalStatus::Accepted) => {}
            Some(ProposalStatus::Submitted) | None => {
                self.proposals
                    .mark_accepted(proposal_id, client.user_id)
                    .await?;
                tracing::info!(proposal_id, user_id = client.user_id, "Proposal accepted");
                facts.status = Some(ProposalStatus::Accepted);
            }
            Some(other) => {
                return Err(CoreError::InvalidState(format!(
                    "Proposal {proposal_id} is {} and cannot be accepted",
                    other.as_str()
                )));
            }
        }
        self.insert_draft(&facts, client).await
    }

    async fn resume(
        &self,
        proposal_id: DbId,
        client: &PartyIdentity,
    ) -> Result<Option<DraftOutcome>, CoreError> {
        let Some(existing) = self.store.find_open_by_proposal(proposal_id).await? else {
            return Ok(None);
        };
        if existing.client_id != client.user_id {
            return Err(CoreError::Forbidden(format!(
                "Proposal {proposal_id} is already under contract {} with another client",
                existing.id
            )));
        }
        tracing::debug!(
            contract_id = existing.id,
            proposal_id,
            "Resuming existing contract for proposal"
        );
        Ok(Some(DraftOutcome {
            contract: existing,
            created: false,
        }))
    }

    async fn fetch_facts(&self, proposal_id: DbId) -> Result<ProposalFacts, CoreError> {
        let payload = self
            .proposals
            .fetch_proposal(proposal_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Proposal",
                id: proposal_id,
            })?;
        ProposalFacts::extract(proposal_id, &payload)
    }

    async fn insert_draft(
        &self,
        facts: &ProposalFacts,
        client: &PartyIdentity,
    ) -> Result<DraftOutcome, CoreError> {
        let new = proposal_intake::draft_from_proposal(facts, client)?;
        let contract = self.store.insert(&new).await?;
        tracing::info!(
            contract_id = contract.id,
            proposal_id = contract.proposal_id,
            user_id = client.user_id,
            budget = contract.budget,
            "Contract drafted"
        );
        Ok(DraftOutcome {
            contract,
            created: true,
        })
    }

    // -- Queries ------------------------------------------------------------

    /// A contract, visible only to its two parties.
    pub async fn get(&self, id: DbId, user_id: DbId) -> Result<Contract, CoreError> {
        let contract = self.load(id).await?;
        contract.require_party(user_id)?;
        Ok(contract)
    }

    pub async fn list(&self, user_id: DbId, query: ListQuery) -> Result<Vec<Contract>, CoreError> {
        self.store.list_for_party(user_id, query).await
    }

    // -- Draft editing ------------------------------------------------------

    pub async fn update_draft(
        &self,
        id: DbId,
        actor_id: DbId,
        update: DraftUpdate,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::update_draft(c, actor_id, update))
            .await?;
        Ok(contract)
    }

    /// Returns the saved contract and the new phase's ordinal.
    pub async fn add_phase(
        &self,
        id: DbId,
        actor_id: DbId,
        title: &str,
        amount: Money,
    ) -> Result<(Contract, u16), CoreError> {
        self.mutate(id, |c| lifecycle::add_phase(c, actor_id, title, amount))
            .await
    }

    pub async fn update_phase(
        &self,
        id: DbId,
        actor_id: DbId,
        ordinal: u16,
        title: Option<&str>,
        amount: Option<Money>,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| {
                lifecycle::update_phase(c, actor_id, ordinal, title, amount)
            })
            .await?;
        Ok(contract)
    }

    pub async fn remove_phase(
        &self,
        id: DbId,
        actor_id: DbId,
        ordinal: u16,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::remove_phase(c, actor_id, ordinal))
            .await?;
        Ok(contract)
    }

    // -- Transitions --------------------------------------------------------

    pub async fn send(&self, id: DbId, actor_id: DbId) -> Result<Contract, CoreError> {
        let (contract, ()) = self.mutate(id, |c| lifecycle::send(c, actor_id)).await?;
        tracing::info!(contract_id = id, user_id = actor_id, "Contract sent");
        Ok(contract)
    }

    /// Record a signature. When it completes the pair, the workspace is
    /// provisioned and the contract activated before anything is saved; if
    /// provisioning fails the signature is not persisted either and the
    /// caller may simply sign again.
    pub async fn sign(
        &self,
        id: DbId,
        signer_id: DbId,
        signature_text: &str,
    ) -> Result<SignOutcome, CoreError> {
        let _guard = self.contract_locks.acquire(id).await?;
        let mut contract = self.load(id).await?;
        let receipt =
            signature::record_signature(&mut contract, signer_id, signature_text, Utc::now())?;

        let mut activated = false;
        let mut workspace_created = false;
        if receipt.stage == SignatureStage::ReadyToActivate {
            let provisioned = self.provisioner.ensure_workspace(&mut contract).await?;
            lifecycle::activate(&mut contract)?;
            activated = true;
            workspace_created = provisioned.was_created();
        }

        let contract = self.store.update(&contract).await?;
        tracing::info!(
            contract_id = id,
            user_id = signer_id,
            party = receipt.party.as_str(),
            status = %contract.status,
            "Contract signed"
        );
        Ok(SignOutcome {
            contract,
            receipt,
            activated,
            workspace_created,
        })
    }

    pub async fn request_changes(
        &self,
        id: DbId,
        actor_id: DbId,
        note: &str,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::request_changes(c, actor_id, note))
            .await?;
        Ok(contract)
    }

    pub async fn revise(&self, id: DbId, actor_id: DbId) -> Result<Contract, CoreError> {
        let (contract, ()) = self.mutate(id, |c| lifecycle::revise(c, actor_id)).await?;
        Ok(contract)
    }

    pub async fn cancel(
        &self,
        id: DbId,
        actor_id: DbId,
        reason: &str,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::cancel(c, actor_id, reason))
            .await?;
        tracing::info!(contract_id = id, user_id = actor_id, "Contract cancelled");
        Ok(contract)
    }

    pub async fn decline(
        &self,
        id: DbId,
        actor_id: DbId,
        reason: Option<&str>,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::decline(c, actor_id, reason))
            .await?;
        tracing::info!(contract_id = id, user_id = actor_id, "Contract declined");
        Ok(contract)
    }

    pub async fn dispute(
        &self,
        id: DbId,
        actor_id: DbId,
        reason: &str,
    ) -> Result<Contract, CoreError> {
        let (contract, ()) = self
            .mutate(id, |c| lifecycle::dispute(c, actor_id, reason))
            .await?;
        tracing::warn!(contract_id = id, user_id = actor_id, "Contract disputed");
        Ok(contract)
    }

    pub async fn complete(&self, id: DbId, actor_id: DbId) -> Result<Contract, CoreError> {
        let (contract, ()) = self.mutate(id, |c| lifecycle::complete(c, actor_id)).await?;
        tracing::info!(contract_id = id, user_id = actor_id, "Contract completed");
        Ok(contract)
    }

    // -- Workspace and payments ---------------------------------------------

    /// Return the attached workspace, provisioning it for an active contract
    /// that lacks one.
    pub async fn ensure_workspace(
        &self,
        id: DbId,
        actor_id: DbId,
    ) -> Result<(Contract, Provisioned), CoreError> {
        let _guard = self.contract_locks.acquire(id).await?;
        let mut contract = self.load(id).await?;
        contract.require_party(actor_id)?;

        if let Some(existing) = contract.workspace_id.clone() {
            return Ok((contract, Provisioned::Existing(existing)));
        }
        if contract.status != ContractStatus::Active {
            return Err(CoreError::InvalidState(format!(
                "Contract {id} is {} and has no workspace to provision",
                contract.status
            )));
        }

        let provisioned = self.provisioner.ensure_workspace(&mut contract).await?;
        let contract = self.store.update(&contract).await?;
        Ok((contract, provisioned))
    }

    /// Apply an external payment confirmation to a phase.
    pub async fn record_payment(
        &self,
        id: DbId,
        ordinal: u16,
        payment_ref: &str,
        amount: Money,
    ) -> Result<PaymentReceipt, CoreError> {
        let _guard = self.contract_locks.acquire(id).await?;
        let mut contract = self.load(id).await?;
        let outcome =
            lifecycle::record_payment(&mut contract, ordinal, payment_ref, amount, Utc::now())?;

        let contract = match outcome {
            PaymentOutcome::AlreadyRecorded => {
                tracing::debug!(
                    contract_id = id,
                    ordinal,
                    "Duplicate payment confirmation ignored"
                );
                contract
            }
            PaymentOutcome::Recorded => {
                let saved = self.store.update(&contract).await?;
                tracing::info!(contract_id = id, ordinal, amount, "Phase paid");
                saved
            }
        };
        Ok(PaymentReceipt {
            contract,
            ordinal,
            outcome,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
