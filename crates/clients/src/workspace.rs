//! Client for the workspace service.

use async_trait::async_trait;
use contractflow_core::provisioning::{WorkspaceRequest, WorkspaceService, WorkspaceServiceError};
use serde_json::Value;

use crate::http::{endpoint, ensure_success, ServiceApiError};

const SERVICE: &str = "workspace service";

/// Header that lets the service collapse retried creates.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// HTTP client for `POST /v1/workspaces`.
pub struct HttpWorkspaceService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkspaceService {
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing client (shared pool, configured timeouts).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn post_workspace(&self, request: &WorkspaceRequest) -> Result<Value, ServiceApiError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "/v1/workspaces"))
            .header(IDEMPOTENCY_KEY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await?;
        let response = ensure_success(SERVICE, response).await?;
        Ok(response.json::<Value>().await?)
    }
}

/// Pull the workspace id out of `{id}`, `{workspace_id}`, or a `{data: ...}`
/// envelope. Numeric ids are accepted and rendered as strings.
fn workspace_id(body: &Value) -> Option<String> {
    let obj = match body.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    };
    ["id", "workspace_id", "workspaceId"]
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[async_trait]
impl WorkspaceService for HttpWorkspaceService {
    async fn create_workspace(
        &self,
        request: &WorkspaceRequest,
    ) -> Result<String, WorkspaceServiceError> {
        let body = self.post_workspace(request).await.map_err(|e| match e {
            ServiceApiError::ApiError { status, body, .. } => {
                WorkspaceServiceError::Rejected { status, body }
            }
            ServiceApiError::Request(e) => WorkspaceServiceError::Request(e.to_string()),
        })?;

        let id = workspace_id(&body).ok_or_else(|| {
            WorkspaceServiceError::InvalidResponse(format!("no workspace id in response: {body}"))
        })?;
        tracing::debug!(
            contract_id = request.contract_id,
            workspace_id = %id,
            "Workspace service created workspace"
        );
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::test_support::spawn;

    fn request() -> WorkspaceRequest {
        WorkspaceRequest {
            contract_id: 9,
            title: "Landing page".into(),
            client_id: 10,
            freelancer_id: 20,
            idempotency_key: "contract-workspace-9".into(),
        }
    }

    #[test]
    fn workspace_id_shapes() {
        assert_eq!(workspace_id(&json!({"id": "ws-1"})).as_deref(), Some("ws-1"));
        assert_eq!(workspace_id(&json!({"workspace_id": 7})).as_deref(), Some("7"));
        assert_eq!(
            workspace_id(&json!({"data": {"id": "ws-2"}})).as_deref(),
            Some("ws-2")
        );
        assert_eq!(workspace_id(&json!({"id": "  "})), None);
        assert_eq!(workspace_id(&json!({})), None);
    }

    #[tokio::test]
    async fn sends_idempotency_key_and_payload() {
        let router = Router::new().route(
            "/v1/workspaces",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let key = headers
                    .get(IDEMPOTENCY_KEY_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "data": { "id": format!("{key}:{}", body["contract_id"]) } }))
            }),
        );
        let service = HttpWorkspaceService::new(spawn(router).await);

        let id = service.create_workspace(&request()).await.unwrap();
        assert_eq!(id, "contract-workspace-9:9");
    }

    #[tokio::test]
    async fn non_success_is_rejected() {
        let router = Router::new().route(
            "/v1/workspaces",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let service = HttpWorkspaceService::new(spawn(router).await);

        assert_matches!(
            service.create_workspace(&request()).await,
            Err(WorkspaceServiceError::Rejected { status: 503, ref body }) if body == "down"
        );
    }

    #[tokio::test]
    async fn missing_id_is_invalid_response() {
        let router = Router::new().route(
            "/v1/workspaces",
            post(|| async { Json(json!({ "ok": true })) }),
        );
        let service = HttpWorkspaceService::new(spawn(router).await);

        assert_matches!(
            service.create_workspace(&request()).await,
            Err(WorkspaceServiceError::InvalidResponse(_))
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_request_error() {
        let service = HttpWorkspaceService::new("http://127.0.0.1:1".into());
        assert_matches!(
            service.create_workspace(&request()).await,
            Err(WorkspaceServiceError::Request(_))
        );
    }
}
