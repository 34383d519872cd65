//! Contract lifecycle state machine.
//!
//! Owns the transition table and every guard that decides whether a
//! transition (or a draft edit) is legal. All functions validate first and
//! mutate last, so a returned error always leaves the contract untouched.
//!
//! ```text
//! draft -> sent -> pending_client | pending_freelancer -> active -> completed
//!            \____________ changes_requested ____/         \-> disputed
//!                               \-> draft
//! any non-terminal -> cancelled | declined | disputed
//! ```

use chrono::NaiveDate;
use serde::Deserialize;

use crate::contract::{
    validate_date_range, validate_terms_length, validate_title, Contract, ContractStatus, Party,
    MIN_TERMS_LENGTH,
};
use crate::error::CoreError;
use crate::ledger::{PaymentOutcome, PhaseLedger};
use crate::types::{DbId, Money, Timestamp};

use ContractStatus::*;

/// Maximum length (characters) of a cancel/decline/dispute reason.
pub const MAX_REASON_LENGTH: usize = 2_000;

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Returns the statuses that `from` may transition to.
pub fn allowed_transitions(from: ContractStatus) -> &'static [ContractStatus] {
    match from {
        Draft => &[Sent, Cancelled, Declined, Disputed],
        Sent => &[
            PendingClient,
            PendingFreelancer,
            ChangesRequested,
            Cancelled,
            Declined,
            Disputed,
        ],
        PendingClient | PendingFreelancer => {
            &[Active, ChangesRequested, Cancelled, Declined, Disputed]
        }
        ChangesRequested => &[Draft, Cancelled, Declined, Disputed],
        Active => &[Completed, Disputed, Cancelled, Declined],
        Completed | Cancelled | Declined | Disputed => &[],
    }
}

/// Validate that `contract` may move to `next`.
pub fn validate_transition(contract: &Contract, next: ContractStatus) -> Result<(), CoreError> {
    let allowed = allowed_transitions(contract.status);
    if allowed.contains(&next) {
        Ok(())
    } else if contract.status.is_terminal() {
        Err(CoreError::InvalidState(format!(
            "Contract {} is {} and accepts no further transitions",
            contract.id, contract.status
        )))
    } else {
        Err(CoreError::InvalidState(format!(
            "Contract {} cannot move from {} to {}",
            contract.id, contract.status, next
        )))
    }
}

fn apply(contract: &mut Contract, next: ContractStatus, reason: Option<String>) {
    tracing::debug!(
        contract_id = contract.id,
        from = %contract.status,
        to = %next,
        "Contract transition"
    );
    contract.status = next;
    contract.status_reason = reason;
}

// ---------------------------------------------------------------------------
// Party-driven transitions
// ---------------------------------------------------------------------------

/// `draft -> sent`. Owning client only; the contract must be complete
/// enough to be signed.
pub fn send(contract: &mut Contract, actor_id: DbId) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "send")?;
    validate_transition(contract, Sent)?;
    validate_ready_to_send(contract)?;
    apply(contract, Sent, None);
    Ok(())
}

/// Preconditions for sending a draft.
pub fn validate_ready_to_send(contract: &Contract) -> Result<(), CoreError> {
    let id = contract.id;
    if contract.budget <= 0 {
        return Err(CoreError::Validation(format!(
            "Contract {id} cannot be sent: budget must be greater than zero"
        )));
    }
    if !contract.phases.has_funded_phase() {
        return Err(CoreError::Validation(format!(
            "Contract {id} cannot be sent: at least one phase with a positive amount is required"
        )));
    }
    let allocated = contract.phases.checked_total_allocated()?;
    if allocated > contract.budget {
        return Err(CoreError::Validation(format!(
            "Contract {id} cannot be sent: phases allocate {allocated} \
             which exceeds the budget of {}",
            contract.budget
        )));
    }
    let terms_len = contract.terms.trim().chars().count();
    if terms_len < MIN_TERMS_LENGTH {
        return Err(CoreError::Validation(format!(
            "Contract {id} cannot be sent: terms must be at least {MIN_TERMS_LENGTH} \
             characters (got {terms_len})"
        )));
    }
    validate_date_range(contract.start_date, contract.end_date)?;
    Ok(())
}

/// `sent | pending_* -> changes_requested`. Either party; existing
/// signatures are cleared because the terms are about to change.
pub fn request_changes(
    contract: &mut Contract,
    actor_id: DbId,
    note: &str,
) -> Result<(), CoreError> {
    contract.require_party(actor_id)?;
    let note = require_reason(contract.id, note, "A change request")?;
    validate_transition(contract, ChangesRequested)?;
    contract.client_signature = None;
    contract.freelancer_signature = None;
    apply(contract, ChangesRequested, Some(note));
    Ok(())
}

/// `changes_requested -> draft`. Owning client reopens the draft for edits.
pub fn revise(contract: &mut Contract, actor_id: DbId) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "revise")?;
    validate_transition(contract, Draft)?;
    apply(contract, Draft, None);
    Ok(())
}

/// Any non-terminal status `-> cancelled`. Owning client, reason required.
pub fn cancel(contract: &mut Contract, actor_id: DbId, reason: &str) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "cancel")?;
    let reason = require_reason(contract.id, reason, "Cancellation")?;
    validate_transition(contract, Cancelled)?;
    apply(contract, Cancelled, Some(reason));
    Ok(())
}

/// Any non-terminal status `-> declined`. Freelancer only.
pub fn decline(
    contract: &mut Contract,
    actor_id: DbId,
    reason: Option<&str>,
) -> Result<(), CoreError> {
    if contract.require_party(actor_id)? != Party::Freelancer {
        return Err(CoreError::Forbidden(format!(
            "Only the freelancer may decline contract {}",
            contract.id
        )));
    }
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| check_reason_length(contract.id, r))
        .transpose()?;
    validate_transition(contract, Declined)?;
    apply(contract, Declined, reason);
    Ok(())
}

/// Any non-terminal status `-> disputed`. Either party reports an
/// irreconcilable disagreement.
pub fn dispute(contract: &mut Contract, actor_id: DbId, reason: &str) -> Result<(), CoreError> {
    contract.require_party(actor_id)?;
    let reason = require_reason(contract.id, reason, "A dispute")?;
    validate_transition(contract, Disputed)?;
    apply(contract, Disputed, Some(reason));
    Ok(())
}

/// `active -> completed`. Owning client; every phase must be paid.
pub fn complete(contract: &mut Contract, actor_id: DbId) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "complete")?;
    validate_transition(contract, Completed)?;
    if !contract.phases.all_paid() {
        return Err(CoreError::Validation(format!(
            "Contract {} cannot be completed: every phase must be paid ({}% done)",
            contract.id,
            contract.phases.progress_percent()
        )));
    }
    apply(contract, Completed, None);
    Ok(())
}

// ---------------------------------------------------------------------------
// Signature-driven transitions
// ---------------------------------------------------------------------------

/// Where signature collection stands after a signature was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStage {
    /// Freelancer signed, waiting on the client (`pending_client`).
    AwaitingClient,
    /// Client signed, waiting on the freelancer (`pending_freelancer`).
    AwaitingFreelancer,
    /// Both signed; the workspace must be provisioned before activation.
    ReadyToActivate,
}

/// Recompute the pending status from the signature slots.
///
/// When both parties have signed the status is left as-is; the caller
/// provisions the workspace and then calls [`activate`].
pub fn apply_signature_status(contract: &mut Contract) -> Result<SignatureStage, CoreError> {
    let (next, stage) = match (&contract.client_signature, &contract.freelancer_signature) {
        (Some(_), Some(_)) => return Ok(SignatureStage::ReadyToActivate),
        (None, Some(_)) => (PendingClient, SignatureStage::AwaitingClient),
        (Some(_), None) => (PendingFreelancer, SignatureStage::AwaitingFreelancer),
        (None, None) => {
            return Err(CoreError::Internal(format!(
                "Contract {} has no signatures to derive a status from",
                contract.id
            )))
        }
    };
    if contract.status != next {
        validate_transition(contract, next)?;
        apply(contract, next, None);
    }
    Ok(stage)
}

/// `pending_* -> active`. Requires both signatures and an attached workspace.
pub fn activate(contract: &mut Contract) -> Result<(), CoreError> {
    validate_transition(contract, Active)?;
    if !contract.is_fully_signed() {
        return Err(CoreError::InvalidState(format!(
            "Contract {} cannot become active before both parties sign",
            contract.id
        )));
    }
    if contract.workspace_id.is_none() {
        return Err(CoreError::InvalidState(format!(
            "Contract {} cannot become active without a provisioned workspace",
            contract.id
        )));
    }
    apply(contract, Active, None);
    Ok(())
}

// ---------------------------------------------------------------------------
// Draft editing
// ---------------------------------------------------------------------------

/// Editable draft fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub budget: Option<Money>,
    pub timeline: Option<String>,
    pub terms: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn require_draft(contract: &Contract, action: &str) -> Result<(), CoreError> {
    if contract.status == Draft {
        Ok(())
    } else {
        Err(CoreError::InvalidState(format!(
            "Cannot {action} on contract {} while it is {}; \
             phases and terms are editable only in draft",
            contract.id, contract.status
        )))
    }
}

/// Apply a [`DraftUpdate`]. Owning client, draft only.
pub fn update_draft(
    contract: &mut Contract,
    actor_id: DbId,
    update: DraftUpdate,
) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "edit")?;
    require_draft(contract, "edit terms")?;

    let title = update.title.as_deref().map(validate_title).transpose()?;
    if let Some(ref terms) = update.terms {
        validate_terms_length(terms)?;
    }
    let budget = update.budget.unwrap_or(contract.budget);
    if budget < 0 {
        return Err(CoreError::Validation(format!(
            "Budget must not be negative (got {budget})"
        )));
    }
    let allocated = contract.phases.checked_total_allocated()?;
    if allocated > budget {
        return Err(CoreError::Validation(format!(
            "Budget {budget} is below the {allocated} already allocated to phases of contract {}",
            contract.id
        )));
    }
    let start_date = update.start_date.or(contract.start_date);
    let end_date = update.end_date.or(contract.end_date);
    validate_date_range(start_date, end_date)?;

    if let Some(title) = title {
        contract.title = title;
    }
    if let Some(category) = update.category {
        contract.category = Some(category.trim().to_string()).filter(|c| !c.is_empty());
    }
    if let Some(timeline) = update.timeline {
        contract.timeline = Some(timeline.trim().to_string()).filter(|t| !t.is_empty());
    }
    if let Some(terms) = update.terms {
        contract.terms = terms;
    }
    contract.budget = budget;
    contract.start_date = start_date;
    contract.end_date = end_date;
    Ok(())
}

/// Append a phase to a draft. Returns the new phase's ordinal.
pub fn add_phase(
    contract: &mut Contract,
    actor_id: DbId,
    title: &str,
    amount: Money,
) -> Result<u16, CoreError> {
    contract.require_owner(actor_id, "edit phases of")?;
    require_draft(contract, "add a phase")?;
    check_phase_fits_budget(contract, amount)?;
    let mut ledger = contract.phases.clone();
    let ordinal = ledger.add_phase(title, amount)?.ordinal;
    commit_ledger(contract, ledger)?;
    Ok(ordinal)
}

/// Change a draft phase's title and/or amount.
pub fn update_phase(
    contract: &mut Contract,
    actor_id: DbId,
    ordinal: u16,
    title: Option<&str>,
    amount: Option<Money>,
) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "edit phases of")?;
    require_draft(contract, "update a phase")?;
    if let Some(amount) = amount {
        check_phase_fits_budget(contract, amount)?;
    }
    let mut ledger = contract.phases.clone();
    ledger.update_phase(ordinal, title, amount)?;
    commit_ledger(contract, ledger)
}

/// Remove a draft phase; remaining phases are renumbered.
pub fn remove_phase(
    contract: &mut Contract,
    actor_id: DbId,
    ordinal: u16,
) -> Result<(), CoreError> {
    contract.require_owner(actor_id, "edit phases of")?;
    require_draft(contract, "remove a phase")?;
    let mut ledger = contract.phases.clone();
    ledger.remove_phase(ordinal)?;
    contract.phases = ledger;
    Ok(())
}

/// Record an externally confirmed payment. Only legal while active.
pub fn record_payment(
    contract: &mut Contract,
    ordinal: u16,
    payment_ref: &str,
    amount: Money,
    at: Timestamp,
) -> Result<PaymentOutcome, CoreError> {
    if contract.status != Active {
        return Err(CoreError::InvalidState(format!(
            "Payments can only be recorded on an active contract; contract {} is {}",
            contract.id, contract.status
        )));
    }
    let mut ledger = contract.phases.clone();
    let outcome = ledger.mark_paid(ordinal, payment_ref, amount, at)?;
    contract.phases = ledger;
    Ok(outcome)
}

/// A single phase can never be worth more than the whole contract.
fn check_phase_fits_budget(contract: &Contract, amount: Money) -> Result<(), CoreError> {
    if amount > contract.budget {
        return Err(CoreError::Validation(format!(
            "Phase amount {amount} exceeds the budget of {} on contract {}",
            contract.budget, contract.id
        )));
    }
    Ok(())
}

/// Accept an edited ledger only if it stays within the budget.
fn commit_ledger(contract: &mut Contract, ledger: PhaseLedger) -> Result<(), CoreError> {
    let allocated = ledger.checked_total_allocated()?;
    if allocated > contract.budget {
        return Err(CoreError::Validation(format!(
            "Phases would allocate {allocated}, exceeding the budget of {} on contract {}",
            contract.budget, contract.id
        )));
    }
    contract.phases = ledger;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

fn require_reason(contract_id: DbId, reason: &str, what: &str) -> Result<String, CoreError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CoreError::Validation(format!(
            "{what} on contract {contract_id} requires a reason"
        )));
    }
    check_reason_length(contract_id, reason)
}

fn check_reason_length(contract_id: DbId, reason: &str) -> Result<String, CoreError> {
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(CoreError::Validation(format!(
            "Reason on contract {contract_id} exceeds {MAX_REASON_LENGTH} characters"
        )));
    }
    Ok(reason.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
