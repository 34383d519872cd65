//! Payment confirmations reported by the payment processor.
//!
//! Requires the `payment_service` role. Confirmations are idempotent per
//! `(phase, payment_ref)`: a repeat returns 200 with `already_recorded`.

use axum::extract::{Path, State};
use axum::Json;
use contractflow_core::contract::ContractView;
use contractflow_core::ledger::PaymentOutcome;
use contractflow_core::types::{DbId, Money};
use contractflow_events::{ContractEvent, EventKind};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::rbac::RequirePaymentService;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentConfirmationRequest {
    /// Processor-side reference of the settled payment.
    pub payment_ref: String,
    /// Settled amount in minor units; must equal the phase amount.
    pub amount: Money,
}

#[derive(Debug, Serialize)]
pub struct PaymentConfirmation {
    pub ordinal: u16,
    pub already_recorded: bool,
    pub contract: ContractView,
}

/// POST /contracts/{id}/phases/{ordinal}/payment-confirmations
pub async fn confirm_payment(
    RequirePaymentService(caller): RequirePaymentService,
    State(state): State<AppState>,
    Path((id, ordinal)): Path<(DbId, u16)>,
    Json(input): Json<PaymentConfirmationRequest>,
) -> AppResult<Json<DataResponse<PaymentConfirmation>>> {
    let receipt = state
        .engine
        .record_payment(id, ordinal, &input.payment_ref, input.amount)
        .await?;

    let already_recorded = receipt.outcome == PaymentOutcome::AlreadyRecorded;
    if !already_recorded {
        state.event_bus.publish(
            ContractEvent::new(EventKind::PhasePaid, &receipt.contract)
                .with_actor(caller.user_id)
                .with_detail("ordinal", ordinal)
                .with_detail("amount", input.amount)
                .with_detail("payment_ref", &input.payment_ref),
        );
    }

    Ok(Json(DataResponse {
        data: PaymentConfirmation {
            ordinal,
            already_recorded,
            contract: receipt.contract.into(),
        },
    }))
}
