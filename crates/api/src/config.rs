use std::time::Duration;

use contractflow_core::engine::EngineConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for background tasks after the listener stops (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT validation configuration.
    pub jwt: JwtConfig,
    /// Base URL of the proposal service.
    pub proposal_service_url: String,
    /// Per-request timeout for the proposal service (default: `10`).
    pub proposal_timeout_secs: u64,
    /// Base URL of the workspace service.
    pub workspace_service_url: String,
    /// Upper bound for one workspace create call (default: `10`).
    pub workspace_timeout_secs: u64,
    /// Bounded wait for a per-contract lock (default: `5000`).
    pub contract_lock_timeout_ms: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `HOST`                     | `0.0.0.0`                |
    /// | `PORT`                     | `3000`                   |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                     |
    /// | `PROPOSAL_SERVICE_URL`     | `http://localhost:4001`  |
    /// | `PROPOSAL_TIMEOUT_SECS`    | `10`                     |
    /// | `WORKSPACE_SERVICE_URL`    | `http://localhost:4002`  |
    /// | `WORKSPACE_TIMEOUT_SECS`   | `10`                     |
    /// | `CONTRACT_LOCK_TIMEOUT_MS` | `5000`                   |
    ///
    /// # Panics
    ///
    /// Panics on unparsable values and when `JWT_SECRET` is missing, so
    /// misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            jwt: JwtConfig::from_env(),
            proposal_service_url: std::env::var("PROPOSAL_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:4001".into()),
            proposal_timeout_secs: env_or("PROPOSAL_TIMEOUT_SECS", 10),
            workspace_service_url: std::env::var("WORKSPACE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:4002".into()),
            workspace_timeout_secs: env_or("WORKSPACE_TIMEOUT_SECS", 10),
            contract_lock_timeout_ms: env_or("CONTRACT_LOCK_TIMEOUT_MS", 5000),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_timeout: Duration::from_millis(self.contract_lock_timeout_ms),
            provision_timeout: Duration::from_secs(self.workspace_timeout_secs),
        }
    }
}
