pub mod accounts;
pub mod health;
pub mod lock_management;
pub mod openapi;
pub mod schemas;
pub mod transfer;
pub mod withdraw;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vaultlock_bank::BankOrchestrator;
use vaultlock_lock::LockTelemetry;

use crate::registry::LockRegistry;

use self::openapi::ApiDoc;

/// Shared application state passed to every handler (C9, spec §4.6-§4.8).
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BankOrchestrator>,
    pub accounts: Arc<dyn vaultlock_bank::AccountStore>,
    pub registry: Arc<LockRegistry>,
    pub telemetry: Arc<LockTelemetry>,
}

/// Build the Axum router with all API routes, Swagger UI, tracing and CORS
/// middleware (spec §6).
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/transfer", post(transfer::transfer))
        .route("/withdraw", post(withdraw::withdraw))
        .route("/accounts/{id}/balance", get(accounts::balance))
        .route("/lock-management/status", get(lock_management::status))
        .route("/lock-management/switch", post(lock_management::switch))
        .route("/lock-management/providers", get(lock_management::providers))
        .route("/actuator/health", get(health::health));

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
