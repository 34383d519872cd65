//! Accepted proposal to draft contract.
//!
//! Upstream proposal payloads are loosely shaped: parties and projects may
//! arrive as nested objects, bare identifiers, or flat keys, and amounts may
//! be numbers or numeric strings. [`ProposalFacts::extract`] normalizes all
//! of those into one immutable record. [`draft_from_proposal`] turns the
//! facts plus the authenticated client identity into a [`NewContract`].
//!
//! The client's identity is taken only from the session. Any client fields
//! embedded in the proposal are ignored.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::contract::{NewContract, PartyIdentity};
use crate::error::CoreError;
use crate::ledger::{PhaseLedger, DEFAULT_PHASE_COUNT};
use crate::types::{DbId, Money};

// ---------------------------------------------------------------------------
// Proposal status
// ---------------------------------------------------------------------------

/// Status of a proposal in the proposal service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Submitted,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ProposalStatus {
    /// Parse an upstream status string (case-insensitive). `pending` is an
    /// alias of `submitted`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" | "pending" => Some(Self::Submitted),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }
}

// ---------------------------------------------------------------------------
// Extracted facts
// ---------------------------------------------------------------------------

/// Normalized, immutable facts taken from a proposal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalFacts {
    pub proposal_id: DbId,
    pub status: Option<ProposalStatus>,
    pub freelancer_id: Option<DbId>,
    pub freelancer_name: Option<String>,
    pub project_id: Option<DbId>,
    pub project_title: Option<String>,
    pub category: Option<String>,
    pub bid_amount: Option<Money>,
    pub estimated_duration: Option<String>,
    pub cover_text: Option<String>,
}

impl ProposalFacts {
    /// Extract facts from an upstream proposal payload.
    ///
    /// Missing optional data is tolerated; structurally impossible values
    /// (negative or fractional bids, non-object payloads) are
    /// [`CoreError::DataIntegrity`].
    pub fn extract(proposal_id: DbId, payload: &Value) -> Result<Self, CoreError> {
        let obj = unwrap_envelope(payload).ok_or_else(|| {
            CoreError::DataIntegrity(format!("Proposal {proposal_id} payload is not a JSON object"))
        })?;

        let status = first_str(obj, &["status", "proposal_status"]).and_then(ProposalStatus::parse);

        let freelancer = obj.get("freelancer");
        let freelancer_id = freelancer
            .and_then(reference_id)
            .or_else(|| first_id(obj, &["freelancer_id", "freelancerId", "user_id"]));
        let freelancer_name = freelancer
            .and_then(|f| f.as_object())
            .and_then(|f| first_str(f, &["name", "display_name", "full_name", "username"]))
            .or_else(|| first_str(obj, &["freelancer_name", "freelancerName"]))
            .map(str::to_string);

        let project = obj.get("project");
        let project_obj = project.and_then(|p| p.as_object());
        let project_id = project
            .and_then(reference_id)
            .or_else(|| first_id(obj, &["project_id", "projectId"]));
        let project_title = project_obj
            .and_then(|p| first_str(p, &["title", "name"]))
            .or_else(|| first_str(obj, &["project_title", "projectTitle"]))
            .map(str::to_string);
        let category = project_obj
            .and_then(|p| first_str(p, &["category", "service_category"]))
            .or_else(|| first_str(obj, &["category", "service_category"]))
            .map(str::to_string);

        let bid_amount = match first_present(obj, &["bid_amount", "bidAmount", "amount"]) {
            Some(value) => Some(parse_amount(proposal_id, value)?),
            None => None,
        };

        let estimated_duration = first_present(
            obj,
            &["estimated_duration", "estimatedDuration", "duration"],
        )
        .and_then(describe_duration);

        let cover_text = first_str(obj, &["cover_letter", "cover_text", "coverLetter"])
            .map(str::to_string);

        Ok(Self {
            proposal_id,
            status,
            freelancer_id,
            freelancer_name,
            project_id,
            project_title,
            category,
            bid_amount,
            estimated_duration,
            cover_text,
        })
    }
}

// ---------------------------------------------------------------------------
// Drafting
// ---------------------------------------------------------------------------

/// Build a draft contract from accepted proposal facts.
///
/// Fails with [`CoreError::DataIntegrity`] when the proposal is not
/// accepted, no freelancer can be resolved, or the freelancer's identity
/// collides with the session client's.
pub fn draft_from_proposal(
    facts: &ProposalFacts,
    client: &PartyIdentity,
) -> Result<NewContract, CoreError> {
    let proposal_id = facts.proposal_id;

    if facts.status != Some(ProposalStatus::Accepted) {
        let status = facts.status.map_or("unknown", |s| s.as_str());
        return Err(CoreError::DataIntegrity(format!(
            "Proposal {proposal_id} is {status}; only accepted proposals can become contracts"
        )));
    }

    let freelancer_id = facts.freelancer_id.ok_or_else(|| {
        CoreError::DataIntegrity(format!(
            "Proposal {proposal_id} does not identify a freelancer"
        ))
    })?;

    if freelancer_id == client.user_id {
        return Err(CoreError::DataIntegrity(format!(
            "Proposal {proposal_id} names the session client {freelancer_id} as its freelancer"
        )));
    }
    let client_name = client.display_name.trim().to_string();
    if let Some(name) = &facts.freelancer_name {
        if !client_name.is_empty() && name.trim().eq_ignore_ascii_case(&client_name) {
            return Err(CoreError::DataIntegrity(format!(
                "Proposal {proposal_id} attributes the name '{client_name}' to both parties"
            )));
        }
    }

    let budget = facts.bid_amount.unwrap_or(0);
    let title = facts
        .project_title
        .clone()
        .unwrap_or_else(|| format!("Contract for proposal #{proposal_id}"));
    let freelancer_label = facts
        .freelancer_name
        .clone()
        .unwrap_or_else(|| format!("freelancer #{freelancer_id}"));
    let terms = default_terms(&title, &client_name, &freelancer_label, budget);

    Ok(NewContract {
        title,
        category: facts.category.clone(),
        client_id: client.user_id,
        client_name,
        freelancer_id,
        freelancer_name: facts.freelancer_name.clone(),
        proposal_id,
        project_id: facts.project_id,
        budget,
        timeline: facts.estimated_duration.clone(),
        terms,
        phases: PhaseLedger::split_evenly(budget),
    })
}

/// Starting terms text for a fresh draft; the client edits it before sending.
pub fn default_terms(title: &str, client: &str, freelancer: &str, budget: Money) -> String {
    format!(
        "This agreement covers \"{title}\" between {client} (client) and {freelancer} \
         (freelancer) for a total budget of {budget}, released across {DEFAULT_PHASE_COUNT} \
         phases as each milestone is delivered and approved."
    )
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

/// Accept both a bare object and a `{ "data": { ... } }` envelope.
fn unwrap_envelope(payload: &Value) -> Option<&Map<String, Value>> {
    let obj = payload.as_object()?;
    match obj.get("data") {
        Some(Value::Object(inner)) => Some(inner),
        _ => Some(obj),
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn first_id(obj: &Map<String, Value>, keys: &[&str]) -> Option<DbId> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(parse_id)
}

/// An id given as a number, a numeric string, or an object with an id key.
fn reference_id(value: &Value) -> Option<DbId> {
    match value {
        Value::Object(obj) => first_id(obj, &["id", "_id", "user_id"]),
        other => parse_id(other),
    }
}

fn parse_id(value: &Value) -> Option<DbId> {
    match value {
        Value::Number(n) => n.as_i64().filter(|id| *id > 0),
        Value::String(s) => s.trim().parse::<DbId>().ok().filter(|id| *id > 0),
        _ => None,
    }
}

fn parse_amount(proposal_id: DbId, value: &Value) -> Result<Money, CoreError> {
    let amount = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<Money>().ok()
        }
        _ => None,
    };
    match amount {
        Some(amount) if amount >= 0 => Ok(amount),
        Some(amount) => Err(CoreError::DataIntegrity(format!(
            "Proposal {proposal_id} has a negative bid amount ({amount})"
        ))),
        None => Err(CoreError::DataIntegrity(format!(
            "Proposal {proposal_id} bid amount {value} is not a whole currency amount"
        ))),
    }
}

/// Render a duration given as text, a number of days, or `{value, unit}`.
fn describe_duration(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => n.as_u64().map(|days| plural(days, "day")),
        Value::Object(obj) => {
            let amount = obj.get("value").and_then(Value::as_u64)?;
            let unit = obj
                .get("unit")
                .and_then(Value::as_str)
                .map(|u| u.trim().trim_end_matches('s').to_ascii_lowercase())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "day".to_string());
            Some(plural(amount, &unit))
        }
        _ => None,
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::testing::{client_identity, CLIENT_ID, FREELANCER_ID};

    fn accepted(bid: Value) -> Value {
        json!({
            "id": 77,
            "status": "accepted",
            "freelancer": { "id": FREELANCER_ID, "name": "Fran Lancer" },
            "project": { "id": 5, "title": "Landing page", "category": "web" },
            "bid_amount": bid,
            "estimated_duration": "3 weeks",
            "cover_letter": "I can do this."
        })
    }

    fn amounts(draft: &NewContract) -> Vec<Money> {
        draft.phases.phases().iter().map(|p| p.amount).collect()
    }

    #[test]
    fn nested_payload_is_extracted() {
        let facts = ProposalFacts::extract(77, &accepted(json!(9000))).unwrap();
        assert_eq!(facts.status, Some(ProposalStatus::Accepted));
        assert_eq!(facts.freelancer_id, Some(FREELANCER_ID));
        assert_eq!(facts.freelancer_name.as_deref(), Some("Fran Lancer"));
        assert_eq!(facts.project_id, Some(5));
        assert_eq!(facts.project_title.as_deref(), Some("Landing page"));
        assert_eq!(facts.category.as_deref(), Some("web"));
        assert_eq!(facts.bid_amount, Some(9000));
        assert_eq!(facts.estimated_duration.as_deref(), Some("3 weeks"));
    }

    #[test]
    fn bare_identifiers_are_extracted() {
        let payload = json!({
            "status": "Accepted",
            "freelancer": "12",
            "project": 5,
            "project_title": "Logo",
            "bidAmount": "1,500",
            "duration": { "value": 2, "unit": "weeks" }
        });
        let facts = ProposalFacts::extract(1, &payload).unwrap();
        assert_eq!(facts.freelancer_id, Some(12));
        assert!(facts.freelancer_name.is_none());
        assert_eq!(facts.project_id, Some(5));
        assert_eq!(facts.project_title.as_deref(), Some("Logo"));
        assert_eq!(facts.bid_amount, Some(1500));
        assert_eq!(facts.estimated_duration.as_deref(), Some("2 weeks"));
    }

    #[test]
    fn flat_keys_and_envelope_are_extracted() {
        let payload = json!({
            "data": {
                "status": "accepted",
                "freelancer_id": 12,
                "freelancer_name": "Fran",
                "amount": 300,
                "duration": 1
            }
        });
        let facts = ProposalFacts::extract(1, &payload).unwrap();
        assert_eq!(facts.freelancer_id, Some(12));
        assert_eq!(facts.freelancer_name.as_deref(), Some("Fran"));
        assert_eq!(facts.bid_amount, Some(300));
        assert_eq!(facts.estimated_duration.as_deref(), Some("1 day"));
    }

    #[test]
    fn fractional_or_negative_bids_are_integrity_errors() {
        assert_matches!(
            ProposalFacts::extract(1, &accepted(json!(10.5))),
            Err(CoreError::DataIntegrity(_))
        );
        assert_matches!(
            ProposalFacts::extract(1, &accepted(json!(-10))),
            Err(CoreError::DataIntegrity(_))
        );
        assert_eq!(
            ProposalFacts::extract(1, &accepted(json!(900.0)))
                .unwrap()
                .bid_amount,
            Some(900)
        );
    }

    #[test]
    fn non_object_payload_is_integrity_error() {
        assert_matches!(
            ProposalFacts::extract(1, &json!([1, 2])),
            Err(CoreError::DataIntegrity(_))
        );
    }

    #[test]
    fn budget_9000_splits_into_three_equal_phases() {
        let facts = ProposalFacts::extract(77, &accepted(json!(9000))).unwrap();
        let draft = draft_from_proposal(&facts, &client_identity()).unwrap();
        assert_eq!(amounts(&draft), vec![3000, 3000, 3000]);
        assert_eq!(draft.phases.unallocated(draft.budget), 0);
    }

    #[test]
    fn budget_10000_exposes_one_unit_balance() {
        let facts = ProposalFacts::extract(77, &accepted(json!(10_000))).unwrap();
        let draft = draft_from_proposal(&facts, &client_identity()).unwrap();
        assert_eq!(amounts(&draft), vec![3333, 3333, 3333]);
        assert_eq!(draft.budget, 10_000);
        assert_eq!(draft.phases.unallocated(draft.budget), 1);
    }

    #[test]
    fn client_identity_comes_from_session() {
        let mut payload = accepted(json!(9000));
        payload["client"] = json!({ "id": 999, "name": "Someone Else" });
        payload["client_name"] = json!("Someone Else");
        let facts = ProposalFacts::extract(77, &payload).unwrap();
        let draft = draft_from_proposal(&facts, &client_identity()).unwrap();
        assert_eq!(draft.client_id, CLIENT_ID);
        assert_eq!(draft.client_name, "Cli Ent");
        assert_eq!(draft.freelancer_id, FREELANCER_ID);
        assert_eq!(draft.proposal_id, 77);
        assert_eq!(draft.title, "Landing page");
        assert_eq!(draft.timeline.as_deref(), Some("3 weeks"));
    }

    #[test]
    fn default_terms_meet_minimum_length() {
        let facts = ProposalFacts::extract(77, &accepted(json!(9000))).unwrap();
        let draft = draft_from_proposal(&facts, &client_identity()).unwrap();
        assert!(draft.terms.chars().count() >= crate::contract::MIN_TERMS_LENGTH);
    }

    #[test]
    fn unaccepted_proposal_is_rejected() {
        for status in ["submitted", "rejected", "withdrawn", "bogus"] {
            let mut payload = accepted(json!(9000));
            payload["status"] = json!(status);
            let facts = ProposalFacts::extract(77, &payload).unwrap();
            assert_matches!(
                draft_from_proposal(&facts, &client_identity()),
                Err(CoreError::DataIntegrity(_)),
                "{status}"
            );
        }
    }

    #[test]
    fn missing_freelancer_is_rejected() {
        let payload = json!({ "status": "accepted", "bid_amount": 100 });
        let facts = ProposalFacts::extract(77, &payload).unwrap();
        assert_matches!(
            draft_from_proposal(&facts, &client_identity()),
            Err(CoreError::DataIntegrity(ref msg)) if msg.contains("freelancer")
        );
    }

    #[test]
    fn colliding_names_are_rejected() {
        let mut payload = accepted(json!(9000));
        payload["freelancer"]["name"] = json!("  cli ent ");
        let facts = ProposalFacts::extract(77, &payload).unwrap();
        assert_matches!(
            draft_from_proposal(&facts, &client_identity()),
            Err(CoreError::DataIntegrity(_))
        );
    }

    #[test]
    fn client_cannot_be_the_freelancer() {
        let mut payload = accepted(json!(9000));
        payload["freelancer"]["id"] = json!(CLIENT_ID);
        let facts = ProposalFacts::extract(77, &payload).unwrap();
        assert_matches!(
            draft_from_proposal(&facts, &client_identity()),
            Err(CoreError::DataIntegrity(_))
        );
    }

    #[test]
    fn missing_bid_drafts_with_zero_budget() {
        let payload = json!({ "status": "accepted", "freelancer_id": FREELANCER_ID });
        let facts = ProposalFacts::extract(77, &payload).unwrap();
        let draft = draft_from_proposal(&facts, &client_identity()).unwrap();
        assert_eq!(draft.budget, 0);
        assert_eq!(amounts(&draft), vec![0, 0, 0]);
        assert_eq!(draft.title, "Contract for proposal #77");
    }
}
