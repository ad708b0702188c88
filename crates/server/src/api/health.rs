use std::collections::HashMap;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use vaultlock_core::LockKey;
use vaultlock_lock::backend::AcquireOutcome;

use super::schemas::{ComponentHealth, HealthResponse};
use super::AppState;

/// Budgets for the liveness check itself (spec §4.8: "a small waitBudget...
/// released within a small roundtrip budget"). Deliberately tighter than
/// the configured `lock.default*` budgets.
const LIVENESS_WAIT: Duration = Duration::from_millis(200);
const LIVENESS_LEASE: Duration = Duration::from_secs(2);

async fn probe(backend: &dyn vaultlock_lock::LockBackend) -> ComponentHealth {
    let key = LockKey::new("__health_probe__");
    match backend.try_acquire(&key, LIVENESS_WAIT, LIVENESS_LEASE).await {
        Ok(AcquireOutcome::Acquired(handle)) => match handle.release().await {
            Ok(_) => ComponentHealth { status: "UP".into(), detail: None },
            Err(err) => ComponentHealth { status: "DOWN".into(), detail: Some(err.client_message()) },
        },
        Ok(AcquireOutcome::WaitTimeout) => ComponentHealth { status: "DOWN".into(), detail: Some("liveness probe timed out".into()) },
        Ok(AcquireOutcome::Interrupted) => ComponentHealth { status: "DOWN".into(), detail: Some("liveness probe interrupted".into()) },
        Err(err) => ComponentHealth { status: "DOWN".into(), detail: Some(err.client_message()) },
    }
}

/// `GET /actuator/health` -- composite probe: UP iff the currently-selected
/// backend is UP (spec §4.8, §6).
#[utoipa::path(
    get,
    path = "/actuator/health",
    tag = "Health",
    summary = "Composite health probe",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    let current = state.registry.current();

    for kind in state.registry.configured() {
        if kind == current {
            let backend = state.registry.current_backend();
            components.insert(kind.as_str().to_string(), probe(backend.as_ref()).await);
        }
    }

    let overall_up = components.get(current.as_str()).is_some_and(|c| c.status == "UP");
    let body = HealthResponse { status: if overall_up { "UP".into() } else { "DOWN".into() }, components };
    let code = if overall_up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (code, Json(body))
}
