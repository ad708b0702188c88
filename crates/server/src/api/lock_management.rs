use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use vaultlock_core::{LockBackendKind, VaultError};

use crate::error::{ApiError, ok_envelope};

use super::schemas::{
    BackendStatistics, LockStatusResponse, ProviderAvailability, ProvidersResponse, SwitchRequest, SwitchResponse,
};
use super::AppState;

fn availability(state: &AppState) -> Vec<ProviderAvailability> {
    LockBackendKind::all().iter().map(|kind| ProviderAvailability { provider: *kind, available: state.registry.available(*kind) }).collect()
}

/// `GET /lock-management/status` (spec §4.7, §6).
#[utoipa::path(
    get,
    path = "/lock-management/status",
    tag = "Lock Management",
    summary = "Current lock backend status and telemetry",
    responses((status = 200, description = "Backend status and statistics", body = LockStatusResponse))
)]
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let current = state.registry.current();
    let statistics: Vec<BackendStatistics> = state
        .registry
        .configured()
        .map(|backend| {
            let snap = state.telemetry.snapshot(backend);
            BackendStatistics {
                backend,
                acquire_attempts: snap.acquire_attempts,
                acquire_success: snap.acquire_success,
                active_locks: snap.active_locks,
                contention_ratio: snap.contention_ratio,
                avg_acquire_latency_micros: u64::try_from(snap.avg_acquire_latency.as_micros()).unwrap_or(u64::MAX),
            }
        })
        .collect();

    let active_locks = state.telemetry.snapshot(current).active_locks;

    Ok(ok_envelope(LockStatusResponse {
        current_provider: current,
        active_locks,
        availability: availability(&state),
        efficiency: state.telemetry.efficiency(),
        efficiency_grade: state.telemetry.efficiency_grade().as_str().to_string(),
        statistics,
    }))
}

/// `POST /lock-management/switch` -- drain the outgoing backend and install
/// the requested one (spec §4.4, §6).
#[utoipa::path(
    post,
    path = "/lock-management/switch",
    tag = "Lock Management",
    summary = "Switch the active lock backend",
    request_body = SwitchRequest,
    responses(
        (status = 200, description = "Switch completed", body = SwitchResponse),
        (status = 400, description = "Unknown provider name"),
        (status = 503, description = "Requested provider unavailable or drain incomplete")
    )
)]
pub async fn switch(State(state): State<AppState>, Json(body): Json<SwitchRequest>) -> Result<impl IntoResponse, ApiError> {
    let target = LockBackendKind::parse(&body.provider).ok_or_else(|| VaultError::UnsupportedBackend(body.provider.clone()))?;
    let outcome = state.registry.switch_to(target).await?;
    Ok(ok_envelope(SwitchResponse { previous_provider: outcome.previous, current_provider: outcome.current }))
}

/// `GET /lock-management/providers` (spec §6).
#[utoipa::path(
    get,
    path = "/lock-management/providers",
    tag = "Lock Management",
    summary = "List supported lock providers and their availability",
    responses((status = 200, description = "Supported providers", body = ProvidersResponse))
)]
pub async fn providers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(ok_envelope(ProvidersResponse {
        supported_providers: LockBackendKind::all().to_vec(),
        current: state.registry.current(),
        availability: availability(&state),
    }))
}
