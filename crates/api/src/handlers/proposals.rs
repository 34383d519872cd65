//! Accepting a proposal on behalf of the client.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use contractflow_core::contract::ContractView;
use contractflow_core::types::DbId;

use crate::error::AppResult;
use crate::handlers::contracts::draft_response;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /proposals/{proposal_id}/accept
///
/// Mark the proposal accepted upstream and draft its contract. Repeating
/// the call returns the same open draft.
pub async fn accept_proposal(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(proposal_id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<ContractView>>)> {
    let outcome = state
        .engine
        .accept_proposal(proposal_id, &auth.identity())
        .await?;
    Ok(draft_response(&state, &auth, outcome))
}
