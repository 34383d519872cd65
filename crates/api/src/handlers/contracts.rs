//! Handlers for the contract lifecycle: drafting, editing, signatures,
//! transitions, and workspace provisioning.
//!
//! Every endpoint requires an authenticated party; the engine checks that
//! the caller is the client or freelancer on the contract and, where it
//! matters, which of the two.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use contractflow_core::contract::{Contract, ContractStatus, ContractView, Party};
use contractflow_core::engine::DraftOutcome;
use contractflow_core::lifecycle::DraftUpdate;
use contractflow_core::store::ListQuery;
use contractflow_core::types::{DbId, Money};
use contractflow_events::{ContractEvent, EventKind};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub proposal_id: DbId,
}

/// Query parameters for `GET /contracts`.
#[derive(Debug, Deserialize)]
pub struct ListContractsParams {
    /// Optional status filter, e.g. `?status=active`.
    pub status: Option<String>,
    /// Page size (default: 50, max: 200).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddPhaseRequest {
    pub title: String,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePhaseRequest {
    pub title: Option<String>,
    pub amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    /// Typed signature text, stored as given after trimming.
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Body is optional; a bare POST declines without a reason.
#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PhaseAdded {
    pub ordinal: u16,
    pub contract: ContractView,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub contract: ContractView,
    pub party: Party,
    /// True when the party replaced an earlier signature.
    pub resigned: bool,
    pub fully_signed: bool,
    pub activated: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub workspace_id: String,
    /// False when the contract already had a workspace.
    pub created: bool,
    pub contract: ContractView,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn contract_data(contract: Contract) -> Json<DataResponse<ContractView>> {
    Json(DataResponse {
        data: ContractView::from(contract),
    })
}

/// Respond to a draft request: 201 for a new draft, 200 when an open draft
/// for the same proposal was resumed.
pub(crate) fn draft_response(
    state: &AppState,
    auth: &AuthUser,
    outcome: DraftOutcome,
) -> (StatusCode, Json<DataResponse<ContractView>>) {
    if outcome.created {
        state.event_bus.publish(
            ContractEvent::new(EventKind::Drafted, &outcome.contract)
                .with_actor(auth.user_id)
                .with_detail("proposal_id", outcome.contract.proposal_id),
        );
        (StatusCode::CREATED, contract_data(outcome.contract))
    } else {
        (StatusCode::OK, contract_data(outcome.contract))
    }
}

// ---------------------------------------------------------------------------
// Drafting and queries
// ---------------------------------------------------------------------------

/// POST /contracts
///
/// Draft a contract from an accepted proposal, or resume the open one.
pub async fn create_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateContractRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ContractView>>)> {
    let outcome = state
        .engine
        .draft_from_proposal(input.proposal_id, &auth.identity())
        .await?;
    Ok(draft_response(&state, &auth, outcome))
}

/// GET /contracts
///
/// Contracts where the caller is a party, newest first.
pub async fn list_contracts(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListContractsParams>,
) -> AppResult<Json<DataResponse<Vec<ContractView>>>> {
    let status = params
        .status
        .as_deref()
        .map(ContractStatus::from_str_db)
        .transpose()?;
    let query = ListQuery::new(status, params.limit, params.offset);

    let contracts = state.engine.list(auth.user_id, query).await?;
    Ok(Json(DataResponse {
        data: contracts.into_iter().map(ContractView::from).collect(),
    }))
}

/// GET /contracts/{id}
pub async fn get_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.get(id, auth.user_id).await?;
    Ok(contract_data(contract))
}

// ---------------------------------------------------------------------------
// Draft editing (client only)
// ---------------------------------------------------------------------------

/// PUT /contracts/{id}
pub async fn update_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<DraftUpdate>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.update_draft(id, auth.user_id, input).await?;
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/phases
pub async fn add_phase(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AddPhaseRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PhaseAdded>>)> {
    let (contract, ordinal) = state
        .engine
        .add_phase(id, auth.user_id, &input.title, input.amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: PhaseAdded {
                ordinal,
                contract: contract.into(),
            },
        }),
    ))
}

/// PUT /contracts/{id}/phases/{ordinal}
pub async fn update_phase(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, ordinal)): Path<(DbId, u16)>,
    Json(input): Json<UpdatePhaseRequest>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state
        .engine
        .update_phase(id, auth.user_id, ordinal, input.title.as_deref(), input.amount)
        .await?;
    Ok(contract_data(contract))
}

/// DELETE /contracts/{id}/phases/{ordinal}
pub async fn remove_phase(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, ordinal)): Path<(DbId, u16)>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.remove_phase(id, auth.user_id, ordinal).await?;
    Ok(contract_data(contract))
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

/// POST /contracts/{id}/send
pub async fn send_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.send(id, auth.user_id).await?;
    state
        .event_bus
        .publish(ContractEvent::new(EventKind::Sent, &contract).with_actor(auth.user_id));
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/sign
///
/// Record the caller's signature. The second signature provisions the
/// workspace and activates the contract; if provisioning fails nothing is
/// saved and the error is returned.
pub async fn sign_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<SignRequest>,
) -> AppResult<Json<DataResponse<SignResponse>>> {
    let outcome = state.engine.sign(id, auth.user_id, &input.signature).await?;

    state.event_bus.publish(
        ContractEvent::new(EventKind::Signed, &outcome.contract)
            .with_actor(auth.user_id)
            .with_detail("party", outcome.receipt.party)
            .with_detail("resigned", outcome.receipt.resigned),
    );
    if outcome.workspace_created {
        state.event_bus.publish(
            ContractEvent::new(EventKind::WorkspaceAttached, &outcome.contract)
                .with_actor(auth.user_id)
                .with_detail("workspace_id", &outcome.contract.workspace_id),
        );
    }
    if outcome.activated {
        state.event_bus.publish(
            ContractEvent::new(EventKind::Activated, &outcome.contract).with_actor(auth.user_id),
        );
    }

    let fully_signed = outcome.contract.is_fully_signed();
    Ok(Json(DataResponse {
        data: SignResponse {
            party: outcome.receipt.party,
            resigned: outcome.receipt.resigned,
            fully_signed,
            activated: outcome.activated,
            contract: outcome.contract.into(),
        },
    }))
}

/// POST /contracts/{id}/request-changes
pub async fn request_changes(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ChangeRequest>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state
        .engine
        .request_changes(id, auth.user_id, &input.note)
        .await?;
    state.event_bus.publish(
        ContractEvent::new(EventKind::ChangesRequested, &contract)
            .with_actor(auth.user_id)
            .with_detail("note", &input.note),
    );
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/revise
pub async fn revise_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.revise(id, auth.user_id).await?;
    state
        .event_bus
        .publish(ContractEvent::new(EventKind::Revised, &contract).with_actor(auth.user_id));
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/decline
pub async fn decline_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    input: Option<Json<DeclineRequest>>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let reason = input.and_then(|Json(body)| body.reason);
    let contract = state
        .engine
        .decline(id, auth.user_id, reason.as_deref())
        .await?;
    state.event_bus.publish(
        ContractEvent::new(EventKind::Declined, &contract)
            .with_actor(auth.user_id)
            .with_detail("reason", &contract.status_reason),
    );
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/cancel
pub async fn cancel_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.cancel(id, auth.user_id, &input.reason).await?;
    state.event_bus.publish(
        ContractEvent::new(EventKind::Cancelled, &contract)
            .with_actor(auth.user_id)
            .with_detail("reason", &contract.status_reason),
    );
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/dispute
pub async fn dispute_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ReasonRequest>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.dispute(id, auth.user_id, &input.reason).await?;
    state.event_bus.publish(
        ContractEvent::new(EventKind::Disputed, &contract)
            .with_actor(auth.user_id)
            .with_detail("reason", &contract.status_reason),
    );
    Ok(contract_data(contract))
}

/// POST /contracts/{id}/complete
pub async fn complete_contract(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ContractView>>> {
    let contract = state.engine.complete(id, auth.user_id).await?;
    state
        .event_bus
        .publish(ContractEvent::new(EventKind::Completed, &contract).with_actor(auth.user_id));
    Ok(contract_data(contract))
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// POST /contracts/{id}/workspace
///
/// Return the contract's workspace, provisioning it first if an active
/// contract has none. Safe to call repeatedly.
pub async fn ensure_workspace(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WorkspaceResponse>>> {
    let (contract, provisioned) = state.engine.ensure_workspace(id, auth.user_id).await?;

    let created = provisioned.was_created();
    if created {
        state.event_bus.publish(
            ContractEvent::new(EventKind::WorkspaceAttached, &contract)
                .with_actor(auth.user_id)
                .with_detail("workspace_id", provisioned.workspace_id()),
        );
    }

    Ok(Json(DataResponse {
        data: WorkspaceResponse {
            workspace_id: provisioned.workspace_id().to_string(),
            created,
            contract: contract.into(),
        },
    }))
}
