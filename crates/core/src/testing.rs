//! Fixtures and fakes shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::contract::{Contract, ContractStatus, PartyIdentity, SignatureRecord};
use crate::error::CoreError;
use crate::ledger::{PhaseLedger, PhaseStatus};
use crate::provisioning::{WorkspaceRequest, WorkspaceService, WorkspaceServiceError};
use crate::store::ProposalSource;
use crate::types::DbId;

pub const CLIENT_ID: DbId = 10;
pub const FREELANCER_ID: DbId = 20;
pub const STRANGER_ID: DbId = 30;

pub fn client_identity() -> PartyIdentity {
    PartyIdentity {
        user_id: CLIENT_ID,
        display_name: "Cli Ent".into(),
    }
}

fn signed(party_id: DbId) -> Option<SignatureRecord> {
    Some(SignatureRecord {
        party_id,
        signature: format!("user-{party_id}"),
        signed_at: Utc::now(),
    })
}

/// A 10000-unit contract with the default three-phase split whose
/// signatures and workspace are consistent with `status`.
pub fn sample_contract(status: ContractStatus) -> Contract {
    let now = Utc::now();
    let mut phases = PhaseLedger::split_evenly(10_000);
    if status == ContractStatus::Completed {
        for ordinal in 1..=3u16 {
            let amount = phases.get(ordinal).map(|p| p.amount).unwrap_or_default();
            phases
                .mark_paid(ordinal, &format!("tx-{ordinal}"), amount, now)
                .unwrap();
        }
        assert!(phases.phases().iter().all(|p| p.status == PhaseStatus::Paid));
    }

    let (client_signature, freelancer_signature, workspace_id) = match status {
        ContractStatus::PendingClient => (None, signed(FREELANCER_ID), None),
        ContractStatus::PendingFreelancer => (signed(CLIENT_ID), None, None),
        ContractStatus::Active | ContractStatus::Completed => (
            signed(CLIENT_ID),
            signed(FREELANCER_ID),
            Some("ws-existing".to_string()),
        ),
        _ => (None, None, None),
    };

    Contract {
        id: 1,
        title: "Landing page".into(),
        category: Some("web".into()),
        client_id: CLIENT_ID,
        client_name: "Cli Ent".into(),
        freelancer_id: FREELANCER_ID,
        freelancer_name: Some("Fran Lancer".into()),
        proposal_id: 77,
        project_id: Some(5),
        budget: 10_000,
        timeline: Some("3 weeks".into()),
        terms: "The freelancer delivers a responsive landing page in three milestones.".into(),
        start_date: None,
        end_date: None,
        status,
        status_reason: None,
        phases,
        client_signature,
        freelancer_signature,
        workspace_id,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Workspace service
// ---------------------------------------------------------------------------

/// Hands out `ws-<n>` identifiers, optionally failing or stalling.
#[derive(Default)]
pub struct FakeWorkspaceService {
    calls: AtomicU32,
    fail_first: u32,
    delay: Option<Duration>,
}

impl FakeWorkspaceService {
    /// Fails the first `n` calls, then succeeds.
    pub fn failing(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Default::default()
        }
    }

    /// Sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceService for FakeWorkspaceService {
    async fn create_workspace(
        &self,
        _request: &WorkspaceRequest,
    ) -> Result<String, WorkspaceServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if n <= self.fail_first {
            return Err(WorkspaceServiceError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(format!("ws-{n}"))
    }
}

// ---------------------------------------------------------------------------
// Proposal source
// ---------------------------------------------------------------------------

/// In-memory proposal service.
#[derive(Default)]
pub struct FakeProposalSource {
    proposals: Mutex<HashMap<DbId, Value>>,
}

impl FakeProposalSource {
    pub fn with(proposal_id: DbId, payload: Value) -> Self {
        let source = Self::default();
        source.put(proposal_id, payload);
        source
    }

    pub fn put(&self, proposal_id: DbId, payload: Value) {
        self.proposals.lock().unwrap().insert(proposal_id, payload);
    }

    pub fn status_of(&self, proposal_id: DbId) -> Option<String> {
        self.proposals
            .lock()
            .unwrap()
            .get(&proposal_id)
            .and_then(|p| p["status"].as_str().map(str::to_string))
    }
}

/// A proposal from the sample freelancer with the given status and bid.
pub fn proposal_payload(status: &str, bid: i64) -> Value {
    json!({
        "status": status,
        "freelancer": { "id": FREELANCER_ID, "name": "Fran Lancer" },
        "project": { "id": 5, "title": "Landing page", "category": "web" },
        "bid_amount": bid,
        "estimated_duration": "3 weeks"
    })
}

#[async_trait]
impl ProposalSource for FakeProposalSource {
    async fn fetch_proposal(&self, proposal_id: DbId) -> Result<Option<Value>, CoreError> {
        Ok(self.proposals.lock().unwrap().get(&proposal_id).cloned())
    }

    async fn mark_accepted(&self, proposal_id: DbId, _client_id: DbId) -> Result<(), CoreError> {
        let mut proposals = self.proposals.lock().unwrap();
        let proposal = proposals
            .get_mut(&proposal_id)
            .ok_or(CoreError::NotFound {
                entity: "Proposal",
                id: proposal_id,
            })?;
        proposal["status"] = json!("accepted");
        Ok(())
    }
}
