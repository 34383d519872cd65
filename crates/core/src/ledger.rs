//! Phased-payment ledger for a contract.
//!
//! A [`PhaseLedger`] is the ordered list of milestone phases carved out of a
//! contract's budget. It computes allocation and payment totals, the current
//! phase, and progress. Lifecycle gating (draft-only edits, active-only
//! payments) lives in [`crate::lifecycle`]; the ledger itself only enforces
//! amount and ordinal invariants.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Money, Timestamp};

/// Number of phases created for a fresh draft.
pub const DEFAULT_PHASE_COUNT: usize = 3;

/// Titles used for the default phases of a fresh draft.
pub const DEFAULT_PHASE_TITLES: [&str; DEFAULT_PHASE_COUNT] =
    ["Project kickoff", "Midpoint delivery", "Final delivery"];

/// Maximum length for a phase title (characters).
pub const MAX_PHASE_TITLE_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Phase status
// ---------------------------------------------------------------------------

/// Work/payment status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Paid,
}

impl PhaseStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "paid" => Ok(Self::Paid),
            _ => Err(CoreError::Validation(format!(
                "Invalid phase status '{s}'. Must be one of: pending, in_progress, completed, paid"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Paid => "paid",
        }
    }

    /// Phases still awaiting work or payment.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// A milestone-sized slice of the contract budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based position, contiguous within the contract.
    pub ordinal: u16,
    pub title: String,
    pub amount: Money,
    pub status: PhaseStatus,
    /// Transaction reference of the payment confirmation, once paid.
    pub payment_ref: Option<String>,
    pub paid_at: Option<Timestamp>,
}

/// Outcome of applying a payment confirmation to a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The phase moved to `paid`.
    Recorded,
    /// The same confirmation was delivered again; nothing changed.
    AlreadyRecorded,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ordered list of payment phases for one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseLedger {
    phases: Vec<Phase>,
}

impl PhaseLedger {
    /// Rebuild a ledger from persisted phases, ordered by ordinal.
    ///
    /// Fails if the ordinals are not exactly `1..=n`.
    pub fn from_phases(mut phases: Vec<Phase>) -> Result<Self, CoreError> {
        phases.sort_by_key(|p| p.ordinal);
        for (idx, phase) in phases.iter().enumerate() {
            if usize::from(phase.ordinal) != idx + 1 {
                return Err(CoreError::DataIntegrity(format!(
                    "Phase ordinals must be contiguous from 1; found {} at position {}",
                    phase.ordinal,
                    idx + 1
                )));
            }
        }
        Ok(Self { phases })
    }

    /// Build the default draft ledger: the total split evenly (integer floor)
    /// across [`DEFAULT_PHASE_COUNT`] phases. The remainder is left
    /// unallocated.
    pub fn split_evenly(total: Money) -> Self {
        let share = total.max(0) / DEFAULT_PHASE_COUNT as Money;
        let phases = DEFAULT_PHASE_TITLES
            .iter()
            .enumerate()
            .map(|(idx, title)| Phase {
                ordinal: (idx + 1) as u16,
                title: (*title).to_string(),
                amount: share,
                status: PhaseStatus::Pending,
                payment_ref: None,
                paid_at: None,
            })
            .collect();
        Self { phases }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, ordinal: u16) -> Option<&Phase> {
        ordinal
            .checked_sub(1)
            .and_then(|idx| self.phases.get(usize::from(idx)))
    }

    /// Append a phase with the next ordinal.
    pub fn add_phase(&mut self, title: &str, amount: Money) -> Result<&Phase, CoreError> {
        let title = validate_phase_title(title)?;
        validate_phase_amount(amount)?;
        let ordinal = u16::try_from(self.phases.len() + 1)
            .map_err(|_| CoreError::Validation("Too many phases on one contract".into()))?;
        self.phases.push(Phase {
            ordinal,
            title,
            amount,
            status: PhaseStatus::Pending,
            payment_ref: None,
            paid_at: None,
        });
        Ok(&self.phases[self.phases.len() - 1])
    }

    /// Change the title and/or amount of an existing phase.
    pub fn update_phase(
        &mut self,
        ordinal: u16,
        title: Option<&str>,
        amount: Option<Money>,
    ) -> Result<&Phase, CoreError> {
        let title = title.map(validate_phase_title).transpose()?;
        if let Some(amount) = amount {
            validate_phase_amount(amount)?;
        }
        let phase = self.get_mut(ordinal)?;
        if let Some(title) = title {
            phase.title = title;
        }
        if let Some(amount) = amount {
            phase.amount = amount;
        }
        Ok(phase)
    }

    /// Remove a phase and renumber the remaining ones contiguously.
    pub fn remove_phase(&mut self, ordinal: u16) -> Result<Phase, CoreError> {
        let idx = self.index_of(ordinal)?;
        if self.phases[idx].status == PhaseStatus::Paid {
            return Err(CoreError::InvalidState(format!(
                "Phase {ordinal} has a recorded payment and cannot be removed"
            )));
        }
        let removed = self.phases.remove(idx);
        for (i, phase) in self.phases.iter_mut().enumerate() {
            phase.ordinal = (i + 1) as u16;
        }
        Ok(removed)
    }

    /// Record a confirmed payment against a phase.
    ///
    /// The confirmed amount must match the phase amount. Redelivery of a
    /// confirmation with the same reference is a no-op.
    pub fn mark_paid(
        &mut self,
        ordinal: u16,
        payment_ref: &str,
        confirmed_amount: Money,
        at: Timestamp,
    ) -> Result<PaymentOutcome, CoreError> {
        let payment_ref = payment_ref.trim();
        if payment_ref.is_empty() {
            return Err(CoreError::Validation(
                "Payment confirmation requires a transaction reference".into(),
            ));
        }
        let phase = self.get_mut(ordinal)?;

        if phase.status == PhaseStatus::Paid {
            return if phase.payment_ref.as_deref() == Some(payment_ref) {
                Ok(PaymentOutcome::AlreadyRecorded)
            } else {
                Err(CoreError::InvalidState(format!(
                    "Phase {ordinal} is already paid under a different transaction reference"
                )))
            };
        }
        if confirmed_amount != phase.amount {
            return Err(CoreError::DataIntegrity(format!(
                "Payment confirmation for phase {ordinal} is {confirmed_amount} \
                 but the phase amount is {}",
                phase.amount
            )));
        }

        phase.status = PhaseStatus::Paid;
        phase.payment_ref = Some(payment_ref.to_string());
        phase.paid_at = Some(at);
        Ok(PaymentOutcome::Recorded)
    }

    /// Sum of all phase amounts, saturating at `Money::MAX`.
    ///
    /// Use [`checked_total_allocated`](Self::checked_total_allocated) when
    /// the sum gates a write.
    pub fn total_allocated(&self) -> Money {
        self.phases
            .iter()
            .fold(0, |acc: Money, p| acc.saturating_add(p.amount))
    }

    /// Sum of all phase amounts, or a validation error if it overflows.
    pub fn checked_total_allocated(&self) -> Result<Money, CoreError> {
        self.phases
            .iter()
            .try_fold(0, |acc: Money, p| acc.checked_add(p.amount))
            .ok_or_else(|| {
                CoreError::Validation("Phase amounts overflow the representable total".into())
            })
    }

    /// Sum of amounts for phases in `paid` status.
    pub fn total_paid(&self) -> Money {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Paid)
            .fold(0, |acc: Money, p| acc.saturating_add(p.amount))
    }

    /// Budget minus everything paid so far.
    ///
    /// Not clamped: a negative value means more was paid than budgeted and
    /// must be surfaced as a data-integrity signal.
    pub fn balance_due(&self, budget: Money) -> Money {
        budget.saturating_sub(self.total_paid())
    }

    /// Budget not assigned to any phase. Negative means over-allocation.
    pub fn unallocated(&self, budget: Money) -> Money {
        budget.saturating_sub(self.total_allocated())
    }

    /// First phase still pending or in progress.
    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.status.is_open())
    }

    /// Share of phases completed or paid, as a rounded whole percentage.
    pub fn progress_percent(&self) -> u8 {
        if self.phases.is_empty() {
            return 0;
        }
        let done = self
            .phases
            .iter()
            .filter(|p| matches!(p.status, PhaseStatus::Completed | PhaseStatus::Paid))
            .count();
        let pct = (done as f64 / self.phases.len() as f64) * 100.0;
        pct.round() as u8
    }

    /// `true` when there is at least one phase and every phase is paid.
    pub fn all_paid(&self) -> bool {
        !self.phases.is_empty() && self.phases.iter().all(|p| p.status == PhaseStatus::Paid)
    }

    /// `true` when at least one phase carries a positive amount.
    pub fn has_funded_phase(&self) -> bool {
        self.phases.iter().any(|p| p.amount > 0)
    }

    /// Snapshot of every derived figure for query responses.
    pub fn summary(&self, budget: Money) -> LedgerSummary {
        LedgerSummary {
            budget,
            total_allocated: self.total_allocated(),
            total_paid: self.total_paid(),
            balance_due: self.balance_due(budget),
            unallocated: self.unallocated(budget),
            over_allocated: self.total_allocated() > budget,
            current_phase: self.current_phase().map(|p| p.ordinal),
            progress_percent: self.progress_percent(),
            phase_count: self.phases.len(),
        }
    }

    fn index_of(&self, ordinal: u16) -> Result<usize, CoreError> {
        self.phases
            .iter()
            .position(|p| p.ordinal == ordinal)
            .ok_or(CoreError::NotFound {
                entity: "Phase",
                id: i64::from(ordinal),
            })
    }

    fn get_mut(&mut self, ordinal: u16) -> Result<&mut Phase, CoreError> {
        let idx = self.index_of(ordinal)?;
        Ok(&mut self.phases[idx])
    }
}

/// Derived financial view of a ledger against its contract budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub budget: Money,
    pub total_allocated: Money,
    pub total_paid: Money,
    pub balance_due: Money,
    pub unallocated: Money,
    pub over_allocated: bool,
    pub current_phase: Option<u16>,
    pub progress_percent: u8,
    pub phase_count: usize,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate and normalize a phase title.
pub fn validate_phase_title(title: &str) -> Result<String, CoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::Validation("Phase title must not be empty".into()));
    }
    if title.chars().count() > MAX_PHASE_TITLE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Phase title exceeds maximum length of {MAX_PHASE_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

/// Phase amounts are non-negative.
pub fn validate_phase_amount(amount: Money) -> Result<(), CoreError> {
    if amount < 0 {
        return Err(CoreError::Validation(format!(
            "Phase amount must not be negative (got {amount})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn ledger(amounts: &[Money]) -> PhaseLedger {
        let mut ledger = PhaseLedger::default();
        for (i, amount) in amounts.iter().enumerate() {
            ledger.add_phase(&format!("Phase {}", i + 1), *amount).unwrap();
        }
        ledger
    }

    #[test]
    fn split_evenly_divides_exactly() {
        let ledger = PhaseLedger::split_evenly(9000);
        let amounts: Vec<Money> = ledger.phases().iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![3000, 3000, 3000]);
        assert_eq!(ledger.unallocated(9000), 0);
    }

    #[test]
    fn split_evenly_leaves_remainder_unallocated() {
        let ledger = PhaseLedger::split_evenly(10_000);
        let amounts: Vec<Money> = ledger.phases().iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![3333, 3333, 3333]);
        assert_eq!(ledger.total_allocated(), 9999);
        assert_eq!(ledger.unallocated(10_000), 1);
    }

    #[test]
    fn add_phase_assigns_next_ordinal() {
        let mut ledger = ledger(&[100, 200]);
        let phase = ledger.add_phase("Polish", 50).unwrap();
        assert_eq!(phase.ordinal, 3);
        assert_eq!(phase.status, PhaseStatus::Pending);
    }

    #[test]
    fn add_phase_rejects_negative_amount() {
        let mut ledger = PhaseLedger::default();
        assert_matches!(ledger.add_phase("Bad", -1), Err(CoreError::Validation(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn add_phase_rejects_blank_title() {
        let mut ledger = PhaseLedger::default();
        assert_matches!(ledger.add_phase("   ", 10), Err(CoreError::Validation(_)));
    }

    #[test]
    fn remove_phase_renumbers_contiguously() {
        let mut ledger = ledger(&[100, 200, 300, 400]);
        let removed = ledger.remove_phase(2).unwrap();
        assert_eq!(removed.amount, 200);
        let ordinals: Vec<u16> = ledger.phases().iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(ledger.get(2).unwrap().amount, 300);
    }

    #[test]
    fn remove_unknown_phase_is_not_found() {
        let mut ledger = ledger(&[100]);
        assert_matches!(ledger.remove_phase(5), Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn totals_and_balance() {
        let mut ledger = ledger(&[1000, 2000, 3000]);
        ledger.mark_paid(1, "tx-1", 1000, Utc::now()).unwrap();
        assert_eq!(ledger.total_allocated(), 6000);
        assert_eq!(ledger.total_paid(), 1000);
        assert_eq!(ledger.balance_due(7000), 6000);
    }

    #[test]
    fn overflowing_total_is_detected() {
        let ledger = ledger(&[Money::MAX, 1]);
        assert_matches!(
            ledger.checked_total_allocated(),
            Err(CoreError::Validation(_))
        );
        assert_eq!(ledger.total_allocated(), Money::MAX);
        assert!(ledger.summary(10_000).over_allocated);
        assert_eq!(ledger.unallocated(10_000), 10_000 - Money::MAX);
    }

    #[test]
    fn balance_due_is_not_clamped() {
        let mut ledger = ledger(&[5000]);
        ledger.mark_paid(1, "tx-1", 5000, Utc::now()).unwrap();
        assert_eq!(ledger.balance_due(4000), -1000);
        assert!(ledger.summary(4000).over_allocated);
    }

    #[test]
    fn current_phase_skips_paid_and_completed() {
        let mut ledger = ledger(&[100, 200, 300]);
        ledger.mark_paid(1, "tx-1", 100, Utc::now()).unwrap();
        ledger.phases[1].status = PhaseStatus::Completed;
        assert_eq!(ledger.current_phase().map(|p| p.ordinal), Some(3));

        ledger.mark_paid(3, "tx-3", 300, Utc::now()).unwrap();
        assert!(ledger.current_phase().is_none());
    }

    #[test]
    fn progress_is_zero_without_phases() {
        assert_eq!(PhaseLedger::default().progress_percent(), 0);
    }

    #[test]
    fn progress_rounds_to_nearest() {
        let mut ledger = ledger(&[100, 100, 100]);
        ledger.mark_paid(1, "tx-1", 100, Utc::now()).unwrap();
        assert_eq!(ledger.progress_percent(), 33);
        ledger.mark_paid(2, "tx-2", 100, Utc::now()).unwrap();
        assert_eq!(ledger.progress_percent(), 67);
    }

    #[test]
    fn progress_is_monotonic_and_reaches_exactly_100() {
        let mut ledger = ledger(&[10, 20, 30, 40, 50, 60, 70]);
        let mut last = ledger.progress_percent();
        for ordinal in 1..=7u16 {
            let amount = ledger.get(ordinal).unwrap().amount;
            ledger
                .mark_paid(ordinal, &format!("tx-{ordinal}"), amount, Utc::now())
                .unwrap();
            let now = ledger.progress_percent();
            assert!(now >= last);
            if ordinal < 7 {
                assert!(now < 100);
            }
            last = now;
        }
        assert_eq!(last, 100);
        assert!(ledger.all_paid());
    }

    #[test]
    fn total_paid_never_exceeds_budget_when_allocation_fits() {
        let budget = 10_000;
        let mut ledger = PhaseLedger::split_evenly(budget);
        for ordinal in 1..=3u16 {
            ledger
                .mark_paid(ordinal, &format!("tx-{ordinal}"), 3333, Utc::now())
                .unwrap();
            assert!(ledger.total_paid() <= budget);
        }
        assert_eq!(ledger.balance_due(budget), 1);
    }

    #[test]
    fn mark_paid_requires_matching_amount() {
        let mut ledger = ledger(&[500]);
        assert_matches!(
            ledger.mark_paid(1, "tx-1", 400, Utc::now()),
            Err(CoreError::DataIntegrity(_))
        );
        assert_eq!(ledger.get(1).unwrap().status, PhaseStatus::Pending);
    }

    #[test]
    fn mark_paid_is_idempotent_per_reference() {
        let mut ledger = ledger(&[500]);
        assert_eq!(
            ledger.mark_paid(1, "tx-1", 500, Utc::now()).unwrap(),
            PaymentOutcome::Recorded
        );
        assert_eq!(
            ledger.mark_paid(1, "tx-1", 500, Utc::now()).unwrap(),
            PaymentOutcome::AlreadyRecorded
        );
        assert_matches!(
            ledger.mark_paid(1, "tx-2", 500, Utc::now()),
            Err(CoreError::InvalidState(_))
        );
    }

    #[test]
    fn paid_phase_cannot_be_removed() {
        let mut ledger = ledger(&[500, 600]);
        ledger.mark_paid(1, "tx-1", 500, Utc::now()).unwrap();
        assert_matches!(ledger.remove_phase(1), Err(CoreError::InvalidState(_)));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn from_phases_rejects_gaps() {
        let mut phases = ledger(&[1, 2, 3]).phases().to_vec();
        phases.remove(1);
        assert_matches!(PhaseLedger::from_phases(phases), Err(CoreError::DataIntegrity(_)));
    }

    #[test]
    fn from_phases_sorts_by_ordinal() {
        let mut phases = ledger(&[1, 2, 3]).phases().to_vec();
        phases.reverse();
        let rebuilt = PhaseLedger::from_phases(phases).unwrap();
        assert_eq!(rebuilt.get(1).unwrap().amount, 1);
    }

    #[test]
    fn update_phase_changes_title_and_amount() {
        let mut ledger = ledger(&[100]);
        let phase = ledger.update_phase(1, Some("Design"), Some(250)).unwrap();
        assert_eq!(phase.title, "Design");
        assert_eq!(phase.amount, 250);
        assert_matches!(
            ledger.update_phase(1, None, Some(-5)),
            Err(CoreError::Validation(_))
        );
    }
}
