//! Two-party signature protocol.
//!
//! Each contract has exactly two signature slots. Recording a signature is
//! idempotent per party: signing again before the counterparty replaces the
//! party's record with a fresh timestamp instead of adding a second one.
//! Status recomputation is delegated to [`crate::lifecycle`].

use crate::contract::{Contract, Party, SignatureRecord};
use crate::error::CoreError;
use crate::lifecycle::{self, SignatureStage};
use crate::types::{DbId, Timestamp};

/// Maximum length (characters) of a signature attestation.
pub const MAX_SIGNATURE_LENGTH: usize = 500;

/// Result of recording one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureReceipt {
    pub party: Party,
    /// `true` when this party had already signed and only the record was
    /// refreshed.
    pub resigned: bool,
    pub stage: SignatureStage,
}

/// Validate and normalize signature text.
pub fn validate_signature_text(text: &str) -> Result<String, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::Validation("Signature text must not be empty".into()));
    }
    if text.chars().count() > MAX_SIGNATURE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Signature text exceeds maximum length of {MAX_SIGNATURE_LENGTH} characters"
        )));
    }
    Ok(text.to_string())
}

/// Record `signer_id`'s signature on `contract`.
///
/// Errors:
/// - [`CoreError::Validation`] for blank signature text.
/// - [`CoreError::Forbidden`] when the signer is not a party to the contract.
/// - [`CoreError::InvalidState`] unless the contract is `sent`,
///   `pending_client` or `pending_freelancer`.
pub fn record_signature(
    contract: &mut Contract,
    signer_id: DbId,
    text: &str,
    at: Timestamp,
) -> Result<SignatureReceipt, CoreError> {
    let text = validate_signature_text(text)?;
    let party = contract.require_party(signer_id)?;
    if !contract.status.is_awaiting_signatures() {
        return Err(CoreError::InvalidState(format!(
            "Contract {} is {} and cannot be signed",
            contract.id, contract.status
        )));
    }

    let mut updated = contract.clone();
    let slot = updated.signature_slot_mut(party);
    let resigned = slot.is_some();
    *slot = Some(SignatureRecord {
        party_id: signer_id,
        signature: text,
        signed_at: at,
    });
    let stage = lifecycle::apply_signature_status(&mut updated)?;

    *contract = updated;
    tracing::debug!(
        contract_id = contract.id,
        party = party.as_str(),
        resigned,
        status = %contract.status,
        "Signature recorded"
    );
    Ok(SignatureReceipt {
        party,
        resigned,
        stage,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
