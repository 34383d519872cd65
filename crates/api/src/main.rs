use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use contractflow_api::config::ServerConfig;
use contractflow_api::router::build_app_router;
use contractflow_api::state::AppState;
use contractflow_clients::proposal::HttpProposalSource;
use contractflow_clients::workspace::HttpWorkspaceService;
use contractflow_core::engine::ContractEngine;
use contractflow_db::PgContractStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contractflow_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = contractflow_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    contractflow_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    contractflow_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Upstream services ---
    let proposal_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.proposal_timeout_secs))
        .build()
        .expect("Failed to build proposal service client");
    let proposals = HttpProposalSource::with_client(
        proposal_client,
        config.proposal_service_url.clone(),
    );

    // The provisioner enforces its own deadline; the client timeout only
    // guards against a hung connection.
    let workspace_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.workspace_timeout_secs + 1))
        .build()
        .expect("Failed to build workspace service client");
    let workspaces = HttpWorkspaceService::with_client(
        workspace_client,
        config.workspace_service_url.clone(),
    );
    tracing::info!(
        proposal_service = %config.proposal_service_url,
        workspace_service = %config.workspace_service_url,
        "Upstream clients configured"
    );

    // --- Engine ---
    let engine = ContractEngine::new(
        Arc::new(PgContractStore::new(pool.clone())),
        Arc::new(proposals),
        Arc::new(workspaces),
        config.engine_config(),
    );

    // --- Event bus ---
    let event_bus = Arc::new(contractflow_events::EventBus::default());
    let persistence_handle = tokio::spawn(contractflow_events::EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));
    tracing::info!("Event persistence started");

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        engine: Arc::new(engine),
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Dropping the last sender closes the channel and ends persistence.
    drop(event_bus);
    let _ = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        persistence_handle,
    )
    .await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
