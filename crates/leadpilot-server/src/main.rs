//! Leadpilot server entry point.

use std::sync::Arc;

use leadpilot_auth::SessionStore;
use leadpilot_db::DbManager;
use leadpilot_db::repository::{
    SurrealPrincipalRepository, SurrealRpcGateway, SurrealSessionRepository,
    SurrealVerificationRepository,
};
use leadpilot_server::{ConfirmState, ServerConfig};
use leadpilot_tenancy::ApprovalChecker;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("leadpilot=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("Starting Leadpilot server...");

    let config = ServerConfig::from_env();

    let manager = match DbManager::open(&config.db).await {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open the tenancy store");
            std::process::exit(1);
        }
    };
    let db = manager.client().clone();

    let principals = match &config.auth.pepper {
        Some(pepper) => SurrealPrincipalRepository::with_pepper(db.clone(), pepper.clone()),
        None => SurrealPrincipalRepository::new(db.clone()),
    };
    let store = SessionStore::new(
        principals,
        SurrealSessionRepository::new(db.clone()),
        SurrealVerificationRepository::new(db.clone()),
        ApprovalChecker::new(SurrealRpcGateway::new(db.clone())),
        config.auth.clone(),
    );

    let app = leadpilot_server::router(Arc::new(ConfirmState {
        verifier: store,
        success_path: config.confirm_success_path.clone(),
        error_path: config.confirm_error_path.clone(),
    }));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(%addr, "Leadpilot server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    tracing::info!("Leadpilot server stopped.");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
