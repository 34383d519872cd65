//! Exactly-once workspace provisioning for signed contracts.
//!
//! The workspace subsystem owns its own lifecycle; a contract only holds a
//! back-reference to it. [`WorkspaceProvisioner::ensure_workspace`] returns
//! the attached reference when there is one and otherwise makes a single,
//! time-bounded create call. A failed call leaves the contract untouched so
//! the caller can retry. No identifier is ever synthesized locally.
//!
//! Callers must hold the contract's lock (see [`crate::engine`]) so the
//! check-then-create sequence is atomic from their perspective.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::contract::Contract;
use crate::error::CoreError;
use crate::types::DbId;

/// Default upper bound for a single create call.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload sent to the workspace service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceRequest {
    pub contract_id: DbId,
    pub title: String,
    pub client_id: DbId,
    pub freelancer_id: DbId,
    /// Lets the service collapse a retried create into the original one.
    #[serde(skip)]
    pub idempotency_key: String,
}

impl WorkspaceRequest {
    pub fn for_contract(contract: &Contract) -> Self {
        Self {
            contract_id: contract.id,
            title: contract.title.clone(),
            client_id: contract.client_id,
            freelancer_id: contract.freelancer_id,
            idempotency_key: format!("contract-workspace-{}", contract.id),
        }
    }
}

/// Errors reported by a [`WorkspaceService`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceServiceError {
    /// The request never produced a response (network, DNS, TLS).
    #[error("workspace request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("workspace service error ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The service answered 2xx but the body was unusable.
    #[error("invalid workspace service response: {0}")]
    InvalidResponse(String),
}

/// The external workspace service.
#[async_trait]
pub trait WorkspaceService: Send + Sync {
    /// Create a workspace and return its identifier.
    async fn create_workspace(
        &self,
        request: &WorkspaceRequest,
    ) -> Result<String, WorkspaceServiceError>;
}

/// Whether [`WorkspaceProvisioner::ensure_workspace`] created anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The contract already referenced this workspace.
    Existing(String),
    /// A workspace was created and attached during this call.
    Created(String),
}

impl Provisioned {
    pub fn workspace_id(&self) -> &str {
        match self {
            Self::Existing(id) | Self::Created(id) => id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Wraps a [`WorkspaceService`] with the at-most-once attachment rules.
#[derive(Clone)]
pub struct WorkspaceProvisioner {
    service: Arc<dyn WorkspaceService>,
    timeout: Duration,
}

impl WorkspaceProvisioner {
    pub fn new(service: Arc<dyn WorkspaceService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Return the contract's workspace, creating and attaching it if absent.
    ///
    /// On any failure the contract's workspace reference is left as it was
    /// and a [`CoreError::Dependency`] is returned.
    pub async fn ensure_workspace(
        &self,
        contract: &mut Contract,
    ) -> Result<Provisioned, CoreError> {
        if let Some(existing) = &contract.workspace_id {
            tracing::debug!(
                contract_id = contract.id,
                workspace_id = %existing,
                "Workspace already attached"
            );
            return Ok(Provisioned::Existing(existing.clone()));
        }

        let request = WorkspaceRequest::for_contract(contract);
        let result =
            tokio::time::timeout(self.timeout, self.service.create_workspace(&request)).await;

        let workspace_id = match result {
            Err(_) => {
                tracing::warn!(
                    contract_id = contract.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Workspace creation timed out"
                );
                return Err(CoreError::Dependency(format!(
                    "Workspace creation for contract {} timed out after {}ms",
                    contract.id,
                    self.timeout.as_millis()
                )));
            }
            Ok(Err(e)) => {
                tracing::warn!(contract_id = contract.id, error = %e, "Workspace creation failed");
                return Err(CoreError::Dependency(format!(
                    "Workspace creation for contract {} failed: {e}",
                    contract.id
                )));
            }
            Ok(Ok(id)) => id,
        };

        let workspace_id = workspace_id.trim().to_string();
        if workspace_id.is_empty() {
            return Err(CoreError::Dependency(format!(
                "Workspace service returned an empty identifier for contract {}",
                contract.id
            )));
        }

        contract.workspace_id = Some(workspace_id.clone());
        tracing::info!(
            contract_id = contract.id,
            workspace_id = %workspace_id,
            "Workspace provisioned"
        );
        Ok(Provisioned::Created(workspace_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::contract::ContractStatus;
    use crate::testing::{sample_contract, FakeWorkspaceService};

    fn provisioner(service: Arc<FakeWorkspaceService>) -> WorkspaceProvisioner {
        WorkspaceProvisioner::new(service, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn creates_and_attaches_on_first_call() {
        let service = Arc::new(FakeWorkspaceService::default());
        let mut contract = sample_contract(ContractStatus::PendingClient);

        let provisioned = provisioner(service.clone())
            .ensure_workspace(&mut contract)
            .await
            .unwrap();

        assert!(provisioned.was_created());
        assert_eq!(contract.workspace_id.as_deref(), Some(provisioned.workspace_id()));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn second_call_returns_same_id_without_remote_call() {
        let service = Arc::new(FakeWorkspaceService::default());
        let provisioner = provisioner(service.clone());
        let mut contract = sample_contract(ContractStatus::PendingClient);

        let first = provisioner.ensure_workspace(&mut contract).await.unwrap();
        let second = provisioner.ensure_workspace(&mut contract).await.unwrap();

        assert_eq!(first.workspace_id(), second.workspace_id());
        assert_eq!(second, Provisioned::Existing(first.workspace_id().to_string()));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn failure_leaves_reference_unset_and_is_retryable() {
        let service = Arc::new(FakeWorkspaceService::failing(1));
        let provisioner = provisioner(service.clone());
        let mut contract = sample_contract(ContractStatus::PendingClient);

        let err = provisioner.ensure_workspace(&mut contract).await.unwrap_err();
        assert_matches!(err, CoreError::Dependency(_));
        assert!(contract.workspace_id.is_none());

        let retried = provisioner.ensure_workspace(&mut contract).await.unwrap();
        assert!(retried.was_created());
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn timeout_is_a_dependency_error() {
        let service = Arc::new(FakeWorkspaceService::slow(Duration::from_secs(5)));
        let mut contract = sample_contract(ContractStatus::PendingClient);

        let err = provisioner(service)
            .ensure_workspace(&mut contract)
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Dependency(ref msg) if msg.contains("timed out"));
        assert!(contract.workspace_id.is_none());
    }

    #[tokio::test]
    async fn never_falls_back_to_contract_id() {
        let service = Arc::new(FakeWorkspaceService::failing(u32::MAX));
        let mut contract = sample_contract(ContractStatus::PendingClient);

        assert!(provisioner(service)
            .ensure_workspace(&mut contract)
            .await
            .is_err());
        assert!(contract.workspace_id.is_none());
    }

    #[test]
    fn idempotency_key_is_stable_per_contract() {
        let contract = sample_contract(ContractStatus::PendingClient);
        assert_eq!(
            WorkspaceRequest::for_contract(&contract).idempotency_key,
            WorkspaceRequest::for_contract(&contract).idempotency_key
        );
    }
}
