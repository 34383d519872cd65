//! Client for the proposal service.

use async_trait::async_trait;
use contractflow_core::error::CoreError;
use contractflow_core::store::ProposalSource;
use contractflow_core::types::DbId;
use reqwest::StatusCode;
use serde_json::Value;

use crate::http::{endpoint, ensure_success, ServiceApiError};

const SERVICE: &str = "proposal service";

/// HTTP client for `/v1/proposals`.
pub struct HttpProposalSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProposalSource {
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing client (shared pool, configured timeouts).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// `GET /v1/proposals/{id}`; `None` on 404.
    pub async fn get_proposal(&self, proposal_id: DbId) -> Result<Option<Value>, ServiceApiError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("/v1/proposals/{proposal_id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(SERVICE, response).await?;
        Ok(Some(response.json::<Value>().await?))
    }

    /// `POST /v1/proposals/{id}/accept`.
    pub async fn accept_proposal(
        &self,
        proposal_id: DbId,
        client_id: DbId,
    ) -> Result<(), ServiceApiError> {
        let response = self
            .client
            .post(endpoint(
                &self.base_url,
                &format!("/v1/proposals/{proposal_id}/accept"),
            ))
            .json(&serde_json::json!({ "client_id": client_id }))
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}

fn dependency(proposal_id: DbId, err: ServiceApiError) -> CoreError {
    tracing::warn!(proposal_id, error = %err, "Proposal service call failed");
    CoreError::Dependency(format!("Proposal service failed for proposal {proposal_id}: {err}"))
}

#[async_trait]
impl ProposalSource for HttpProposalSource {
    async fn fetch_proposal(&self, proposal_id: DbId) -> Result<Option<Value>, CoreError> {
        self.get_proposal(proposal_id)
            .await
            .map_err(|e| dependency(proposal_id, e))
    }

    async fn mark_accepted(&self, proposal_id: DbId, client_id: DbId) -> Result<(), CoreError> {
        match self.accept_proposal(proposal_id, client_id).await {
            Ok(()) => Ok(()),
            Err(e) => Err(match e.status() {
                Some(404) => CoreError::NotFound {
                    entity: "Proposal",
                    id: proposal_id,
                },
                Some(403) => CoreError::Forbidden(format!(
                    "User {client_id} may not accept proposal {proposal_id}"
                )),
                Some(409) => CoreError::InvalidState(format!(
                    "Proposal {proposal_id} can no longer be accepted"
                )),
                _ => dependency(proposal_id, e),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::test_support::spawn;

    async fn service() -> HttpProposalSource {
        let router = Router::new()
            .route(
                "/v1/proposals/{id}",
                get(|Path(id): Path<i64>| async move {
                    match id {
                        1 => Ok(Json(json!({ "data": { "id": 1, "status": "accepted" } }))),
                        2 => Err(StatusCode::INTERNAL_SERVER_ERROR),
                        _ => Err(StatusCode::NOT_FOUND),
                    }
                }),
            )
            .route(
                "/v1/proposals/{id}/accept",
                post(|Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    match (id, body["client_id"].as_i64()) {
                        (1, Some(10)) => StatusCode::NO_CONTENT,
                        (1, _) => StatusCode::FORBIDDEN,
                        (3, _) => StatusCode::CONFLICT,
                        _ => StatusCode::NOT_FOUND,
                    }
                }),
            );
        HttpProposalSource::new(spawn(router).await)
    }

    #[tokio::test]
    async fn fetch_returns_payload() {
        let payload = service().await.fetch_proposal(1).await.unwrap().unwrap();
        assert_eq!(payload["data"]["status"], "accepted");
    }

    #[tokio::test]
    async fn fetch_unknown_is_none() {
        assert!(service().await.fetch_proposal(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_server_error_is_dependency() {
        assert_matches!(
            service().await.fetch_proposal(2).await,
            Err(CoreError::Dependency(_))
        );
    }

    #[tokio::test]
    async fn accept_maps_statuses() {
        let service = service().await;
        assert!(service.mark_accepted(1, 10).await.is_ok());
        assert_matches!(service.mark_accepted(1, 11).await, Err(CoreError::Forbidden(_)));
        assert_matches!(service.mark_accepted(3, 10).await, Err(CoreError::InvalidState(_)));
        assert_matches!(
            service.mark_accepted(99, 10).await,
            Err(CoreError::NotFound { entity: "Proposal", id: 99 })
        );
    }
}
