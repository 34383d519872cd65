//! Repository for the `contracts` table.

use contractflow_core::contract::{Contract, ContractStatus, NewContract};
use contractflow_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::contract::ContractRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, title, category, client_id, client_name, freelancer_id, \
    freelancer_name, proposal_id, project_id, budget, timeline, terms, start_date, end_date, \
    status, status_reason, client_signature, client_signed_at, freelancer_signature, \
    freelancer_signed_at, workspace_id, version, created_at, updated_at";

/// Provides CRUD operations for contracts.
pub struct ContractRepo;

impl ContractRepo {
    /// Insert a new draft contract, returning the created row.
    ///
    /// Violates `uq_contracts_open_proposal` when the proposal already has an
    /// open contract.
    pub async fn insert(
        conn: &mut PgConnection,
        new: &NewContract,
    ) -> Result<ContractRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO contracts \
                (title, category, client_id, client_name, freelancer_id, freelancer_name, \
                 proposal_id, project_id, budget, timeline, terms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContractRow>(&query)
            .bind(&new.title)
            .bind(&new.category)
            .bind(new.client_id)
            .bind(&new.client_name)
            .bind(new.freelancer_id)
            .bind(&new.freelancer_name)
            .bind(new.proposal_id)
            .bind(new.project_id)
            .bind(new.budget)
            .bind(&new.timeline)
            .bind(&new.terms)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find a contract by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ContractRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM contracts WHERE id = $1");
        sqlx::query_as::<_, ContractRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the proposal's contract that is neither cancelled nor declined.
    pub async fn find_open_by_proposal(
        pool: &PgPool,
        proposal_id: DbId,
    ) -> Result<Option<ContractRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM contracts \
             WHERE proposal_id = $1 AND status NOT IN ('cancelled', 'declined')"
        );
        sqlx::query_as::<_, ContractRow>(&query)
            .bind(proposal_id)
            .fetch_optional(pool)
            .await
    }

    /// List contracts where the user is either party, newest first.
    pub async fn list_for_party(
        pool: &PgPool,
        user_id: DbId,
        status: Option<ContractStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContractRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM contracts \
             WHERE (client_id = $1 OR freelancer_id = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, ContractRow>(&query)
            .bind(user_id)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Write every mutable column if the stored version still matches, and
    /// bump the version.
    ///
    /// Returns `None` when no row matched (missing or stale version).
    pub async fn update_versioned(
        conn: &mut PgConnection,
        contract: &Contract,
    ) -> Result<Option<ContractRow>, sqlx::Error> {
        let (client_signature, client_signed_at) = match &contract.client_signature {
            Some(s) => (Some(s.signature.as_str()), Some(s.signed_at)),
            None => (None, None),
        };
        let (freelancer_signature, freelancer_signed_at) = match &contract.freelancer_signature {
            Some(s) => (Some(s.signature.as_str()), Some(s.signed_at)),
            None => (None, None),
        };

        let query = format!(
            "UPDATE contracts SET \
                title = $2, \
                category = $3, \
                budget = $4, \
                timeline = $5, \
                terms = $6, \
                start_date = $7, \
                end_date = $8, \
                status = $9, \
                status_reason = $10, \
                client_signature = $11, \
                client_signed_at = $12, \
                freelancer_signature = $13, \
                freelancer_signed_at = $14, \
                workspace_id = $15, \
                version = version + 1 \
             WHERE id = $1 AND version = $16 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ContractRow>(&query)
            .bind(contract.id)
            .bind(&contract.title)
            .bind(&contract.category)
            .bind(contract.budget)
            .bind(&contract.timeline)
            .bind(&contract.terms)
            .bind(contract.start_date)
            .bind(contract.end_date)
            .bind(contract.status.as_str())
            .bind(&contract.status_reason)
            .bind(client_signature)
            .bind(client_signed_at)
            .bind(freelancer_signature)
            .bind(freelancer_signed_at)
            .bind(&contract.workspace_id)
            .bind(contract.version)
            .fetch_optional(&mut *conn)
            .await
    }
}
