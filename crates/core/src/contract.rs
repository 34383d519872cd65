//! Contract aggregate and its value types.
//!
//! A [`Contract`] is owned by the client that drafted it; the freelancer
//! holds a read/sign capability only. Transitions are applied by
//! [`crate::lifecycle`], signatures by [`crate::signature`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ledger::{LedgerSummary, PhaseLedger};
use crate::types::{DbId, Money, Timestamp};

/// Minimum trimmed length (characters) of the terms text before sending.
pub const MIN_TERMS_LENGTH: usize = 50;

/// Maximum length (characters) of the terms text.
pub const MAX_TERMS_LENGTH: usize = 20_000;

/// Maximum length (characters) of a contract title.
pub const MAX_TITLE_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    PendingClient,
    PendingFreelancer,
    Active,
    ChangesRequested,
    Completed,
    Cancelled,
    Declined,
    Disputed,
}

impl ContractStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ContractStatus; 10] = [
        Self::Draft,
        Self::Sent,
        Self::PendingClient,
        Self::PendingFreelancer,
        Self::Active,
        Self::ChangesRequested,
        Self::Completed,
        Self::Cancelled,
        Self::Declined,
        Self::Disputed,
    ];

    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid contract status '{s}'")))
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::PendingClient => "pending_client",
            Self::PendingFreelancer => "pending_freelancer",
            Self::Active => "active",
            Self::ChangesRequested => "changes_requested",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Declined => "declined",
            Self::Disputed => "disputed",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Declined | Self::Disputed
        )
    }

    /// Statuses in which signatures are collected.
    pub fn is_awaiting_signatures(self) -> bool {
        matches!(
            self,
            Self::Sent | Self::PendingClient | Self::PendingFreelancer
        )
    }

    /// A contract that was abandoned before or after signing. Such contracts
    /// do not block a fresh draft for the same proposal.
    pub fn is_abandoned(self) -> bool {
        matches!(self, Self::Cancelled | Self::Declined)
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parties
// ---------------------------------------------------------------------------

/// The two parties of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Client,
    Freelancer,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Freelancer => "freelancer",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Client => Self::Freelancer,
            Self::Freelancer => Self::Client,
        }
    }
}

/// Authenticated identity taken from the session context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyIdentity {
    pub user_id: DbId,
    pub display_name: String,
}

/// A party's non-cryptographic attestation of agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub party_id: DbId,
    pub signature: String,
    pub signed_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Fields of a contract that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub title: String,
    pub category: Option<String>,
    pub client_id: DbId,
    pub client_name: String,
    pub freelancer_id: DbId,
    pub freelancer_name: Option<String>,
    pub proposal_id: DbId,
    pub project_id: Option<DbId>,
    pub budget: Money,
    pub timeline: Option<String>,
    pub terms: String,
    pub phases: PhaseLedger,
}

/// A binding agreement between a client and a freelancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contract {
    pub id: DbId,
    pub title: String,
    pub category: Option<String>,
    pub client_id: DbId,
    pub client_name: String,
    pub freelancer_id: DbId,
    pub freelancer_name: Option<String>,
    pub proposal_id: DbId,
    pub project_id: Option<DbId>,
    pub budget: Money,
    pub timeline: Option<String>,
    pub terms: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: ContractStatus,
    /// Reason or note attached to the most recent cancel, decline, dispute,
    /// or change request.
    pub status_reason: Option<String>,
    pub phases: PhaseLedger,
    pub client_signature: Option<SignatureRecord>,
    pub freelancer_signature: Option<SignatureRecord>,
    pub workspace_id: Option<String>,
    /// Optimistic-concurrency counter, bumped on every persisted change.
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Contract {
    /// Which party `user_id` is on this contract, if any.
    pub fn party_of(&self, user_id: DbId) -> Option<Party> {
        if user_id == self.client_id {
            Some(Party::Client)
        } else if user_id == self.freelancer_id {
            Some(Party::Freelancer)
        } else {
            None
        }
    }

    /// Resolve the acting party or fail with an authorization error.
    pub fn require_party(&self, user_id: DbId) -> Result<Party, CoreError> {
        self.party_of(user_id).ok_or_else(|| {
            CoreError::Forbidden(format!(
                "User {user_id} is not a party to contract {}",
                self.id
            ))
        })
    }

    /// Only the owning client may perform `action`.
    pub fn require_owner(&self, user_id: DbId, action: &str) -> Result<(), CoreError> {
        if user_id == self.client_id {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "Only the owning client may {action} contract {}",
                self.id
            )))
        }
    }

    pub fn signature(&self, party: Party) -> Option<&SignatureRecord> {
        match party {
            Party::Client => self.client_signature.as_ref(),
            Party::Freelancer => self.freelancer_signature.as_ref(),
        }
    }

    pub(crate) fn signature_slot_mut(&mut self, party: Party) -> &mut Option<SignatureRecord> {
        match party {
            Party::Client => &mut self.client_signature,
            Party::Freelancer => &mut self.freelancer_signature,
        }
    }

    /// Both signature records are present.
    pub fn is_fully_signed(&self) -> bool {
        self.client_signature.is_some() && self.freelancer_signature.is_some()
    }

    pub fn ledger_summary(&self) -> LedgerSummary {
        self.phases.summary(self.budget)
    }
}

/// Query view of a contract: the aggregate plus derived ledger figures.
#[derive(Debug, Clone, Serialize)]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub ledger: LedgerSummary,
}

impl From<Contract> for ContractView {
    fn from(contract: Contract) -> Self {
        let ledger = contract.ledger_summary();
        Self { contract, ledger }
    }
}

// ---------------------------------------------------------------------------
// Draft field validation
// ---------------------------------------------------------------------------

/// Validate and normalize a contract title.
pub fn validate_title(title: &str) -> Result<String, CoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::Validation("Contract title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Contract title exceeds maximum length of {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

/// Terms may be edited freely in draft up to [`MAX_TERMS_LENGTH`]; the
/// minimum length is only enforced when sending.
pub fn validate_terms_length(terms: &str) -> Result<(), CoreError> {
    if terms.chars().count() > MAX_TERMS_LENGTH {
        return Err(CoreError::Validation(format!(
            "Terms exceed maximum length of {MAX_TERMS_LENGTH} characters"
        )));
    }
    Ok(())
}

/// The end date, when both are present, must not precede the start date.
pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), CoreError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(CoreError::Validation(format!(
            "End date {end} is before start date {start}"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_round_trips_through_db_string() {
        for status in ContractStatus::ALL {
            assert_eq!(ContractStatus::from_str_db(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_matches!(
            ContractStatus::from_str_db("signed"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = ContractStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                ContractStatus::Completed,
                ContractStatus::Cancelled,
                ContractStatus::Declined,
                ContractStatus::Disputed,
            ]
        );
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(ContractStatus::PendingFreelancer).unwrap();
        assert_eq!(json, "pending_freelancer");
    }

    #[test]
    fn date_range_rejects_end_before_start() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10);
        let end = NaiveDate::from_ymd_opt(2026, 3, 1);
        assert_matches!(validate_date_range(start, end), Err(CoreError::Validation(_)));
        assert!(validate_date_range(start, None).is_ok());
        assert!(validate_date_range(end, start).is_ok());
    }

    #[test]
    fn title_is_trimmed_and_required() {
        assert_eq!(validate_title("  Logo design ").unwrap(), "Logo design");
        assert_matches!(validate_title(" "), Err(CoreError::Validation(_)));
    }
}
