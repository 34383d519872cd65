pub mod contracts;
pub mod health;
pub mod proposals;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /contracts                                         list, draft from proposal
/// /contracts/{id}                                    get, edit draft
/// /contracts/{id}/phases                             add phase
/// /contracts/{id}/phases/{ordinal}                   update, remove phase
/// /contracts/{id}/send                               send (POST)
/// /contracts/{id}/sign                               sign (POST)
/// /contracts/{id}/request-changes                    request changes (POST)
/// /contracts/{id}/revise                             back to draft (POST)
/// /contracts/{id}/decline                            decline (POST)
/// /contracts/{id}/cancel                             cancel (POST)
/// /contracts/{id}/dispute                            dispute (POST)
/// /contracts/{id}/complete                           complete (POST)
/// /contracts/{id}/workspace                          ensure workspace (POST)
/// /contracts/{id}/phases/{ordinal}/payment-confirmations  mark paid (payment_service)
///
/// /proposals/{proposal_id}/accept                    accept + draft (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/contracts", contracts::router())
        .nest("/proposals", proposals::router())
}
