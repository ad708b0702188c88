use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use vaultlock_core::AccountId;

use crate::error::{ApiError, ok_envelope};

use super::schemas::TransferRequest;
use super::AppState;

/// `POST /transfer` -- move funds between two accounts under C5's
/// multi-lock coordinator (spec §4.6, §6).
#[utoipa::path(
    post,
    path = "/transfer",
    tag = "Bank",
    summary = "Transfer funds between two accounts",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer completed", body = vaultlock_core::TransactionRecord),
        (status = 400, description = "Validation or insufficient funds"),
        (status = 404, description = "Account not found"),
        (status = 503, description = "Lock system unavailable")
    )
)]
pub async fn transfer(State(state): State<AppState>, Json(body): Json<TransferRequest>) -> Result<impl IntoResponse, ApiError> {
    let from = AccountId::parse(body.from)?;
    let to = AccountId::parse(body.to)?;
    let record = vaultlock_lock::with_caller_scope(state.orchestrator.transfer(from, to, body.amount)).await?;
    Ok(ok_envelope(record))
}
