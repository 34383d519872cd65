//! Route definitions for contracts.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{contracts, payments};
use crate::state::AppState;

/// Routes mounted at `/contracts`.
///
/// ```text
/// GET    /                                         -> list_contracts
/// POST   /                                         -> create_contract
/// GET    /{id}                                     -> get_contract
/// PUT    /{id}                                     -> update_contract
/// POST   /{id}/phases                              -> add_phase
/// PUT    /{id}/phases/{ordinal}                    -> update_phase
/// DELETE /{id}/phases/{ordinal}                    -> remove_phase
/// POST   /{id}/send                                -> send_contract
/// POST   /{id}/sign                                -> sign_contract
/// POST   /{id}/request-changes                     -> request_changes
/// POST   /{id}/revise                              -> revise_contract
/// POST   /{id}/decline                             -> decline_contract
/// POST   /{id}/cancel                              -> cancel_contract
/// POST   /{id}/dispute                             -> dispute_contract
/// POST   /{id}/complete                            -> complete_contract
/// POST   /{id}/workspace                           -> ensure_workspace
/// POST   /{id}/phases/{ordinal}/payment-confirmations -> confirm_payment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route(
            "/{id}",
            get(contracts::get_contract).put(contracts::update_contract),
        )
        .route("/{id}/phases", post(contracts::add_phase))
        .route(
            "/{id}/phases/{ordinal}",
            put(contracts::update_phase).delete(contracts::remove_phase),
        )
        .route("/{id}/send", post(contracts::send_contract))
        .route("/{id}/sign", post(contracts::sign_contract))
        .route("/{id}/request-changes", post(contracts::request_changes))
        .route("/{id}/revise", post(contracts::revise_contract))
        .route("/{id}/decline", post(contracts::decline_contract))
        .route("/{id}/cancel", post(contracts::cancel_contract))
        .route("/{id}/dispute", post(contracts::dispute_contract))
        .route("/{id}/complete", post(contracts::complete_contract))
        .route("/{id}/workspace", post(contracts::ensure_workspace))
        .route(
            "/{id}/phases/{ordinal}/payment-confirmations",
            post(payments::confirm_payment),
        )
}
