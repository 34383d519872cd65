#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use contractflow_api::auth::jwt::{generate_access_token, JwtConfig};
use contractflow_api::config::ServerConfig;
use contractflow_api::router::build_app_router;
use contractflow_api::state::AppState;
use contractflow_core::engine::ContractEngine;
use contractflow_core::error::CoreError;
use contractflow_core::provisioning::{WorkspaceRequest, WorkspaceService, WorkspaceServiceError};
use contractflow_core::roles::{ROLE_PAYMENT_SERVICE, ROLE_USER};
use contractflow_core::store::{InMemoryContractStore, ProposalSource};
use contractflow_core::types::DbId;
use contractflow_events::EventBus;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const CLIENT_ID: DbId = 10;
pub const FREELANCER_ID: DbId = 20;
pub const STRANGER_ID: DbId = 30;
pub const PAYMENT_SERVICE_ID: DbId = 900;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        proposal_service_url: "http://proposals.invalid".to_string(),
        proposal_timeout_secs: 10,
        workspace_service_url: "http://workspaces.invalid".to_string(),
        workspace_timeout_secs: 2,
        contract_lock_timeout_ms: 2000,
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// In-memory proposal service.
#[derive(Default)]
pub struct FakeProposals {
    proposals: Mutex<HashMap<DbId, Value>>,
}

impl FakeProposals {
    pub fn put(&self, proposal_id: DbId, payload: Value) {
        self.proposals.lock().unwrap().insert(proposal_id, payload);
    }

    pub fn status_of(&self, proposal_id: DbId) -> Option<String> {
        self.proposals
            .lock()
            .unwrap()
            .get(&proposal_id)
            .and_then(|p| p["status"].as_str().map(str::to_string))
    }
}

#[async_trait]
impl ProposalSource for FakeProposals {
    async fn fetch_proposal(&self, proposal_id: DbId) -> Result<Option<Value>, CoreError> {
        Ok(self.proposals.lock().unwrap().get(&proposal_id).cloned())
    }

    async fn mark_accepted(&self, proposal_id: DbId, _client_id: DbId) -> Result<(), CoreError> {
        let mut proposals = self.proposals.lock().unwrap();
        let proposal = proposals.get_mut(&proposal_id).ok_or(CoreError::NotFound {
            entity: "Proposal",
            id: proposal_id,
        })?;
        proposal["status"] = json!("accepted");
        Ok(())
    }
}

/// Workspace service handing out `ws-<n>`; can be switched to failing.
#[derive(Default)]
pub struct FakeWorkspaces {
    calls: AtomicU32,
    failing: Mutex<bool>,
}

impl FakeWorkspaces {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceService for FakeWorkspaces {
    async fn create_workspace(
        &self,
        _request: &WorkspaceRequest,
    ) -> Result<String, WorkspaceServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.failing.lock().unwrap() {
            return Err(WorkspaceServiceError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(format!("ws-{n}"))
    }
}

/// A proposal from the test freelancer.
pub fn proposal_payload(status: &str, bid: i64) -> Value {
    json!({
        "status": status,
        "freelancer": { "id": FREELANCER_ID, "name": "Fran Lancer" },
        "project": { "id": 5, "title": "Landing page", "category": "web" },
        "bid_amount": bid,
        "estimated_duration": "3 weeks"
    })
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub proposals: Arc<FakeProposals>,
    pub workspaces: Arc<FakeWorkspaces>,
    pub event_bus: Arc<EventBus>,
}

/// Build the full application router over the in-memory store and fake
/// collaborators, with the production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let proposals = Arc::new(FakeProposals::default());
    let workspaces = Arc::new(FakeWorkspaces::default());
    let event_bus = Arc::new(EventBus::default());

    let engine = ContractEngine::new(
        Arc::new(InMemoryContractStore::new()),
        proposals.clone(),
        workspaces.clone(),
        config.engine_config(),
    );

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        engine: Arc::new(engine),
        event_bus: Arc::clone(&event_bus),
    };

    TestApp {
        router: build_app_router(state, &config),
        proposals,
        workspaces,
        event_bus,
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub fn token_for(user_id: DbId, name: &str, role: &str) -> String {
    generate_access_token(user_id, name, role, &test_config().jwt)
        .expect("token generation should succeed")
}

pub fn client_token() -> String {
    token_for(CLIENT_ID, "Cli Ent", ROLE_USER)
}

pub fn freelancer_token() -> String {
    token_for(FREELANCER_ID, "Fran Lancer", ROLE_USER)
}

pub fn stranger_token() -> String {
    token_for(STRANGER_ID, "Some One", ROLE_USER)
}

pub fn payment_token() -> String {
    token_for(PAYMENT_SERVICE_ID, "Payments", ROLE_PAYMENT_SERVICE)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn post_json_auth(app: &Router, uri: &str, body: Value, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json_auth(app: &Router, uri: &str, body: Value, token: &str) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
