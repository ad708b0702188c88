use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use vaultlock_core::AccountId;

use crate::error::{ApiError, ok_envelope};

use super::schemas::WithdrawRequest;
use super::AppState;

/// `POST /withdraw` -- debit a single account under a single-key C5 section
/// (spec §4.6, §6).
#[utoipa::path(
    post,
    path = "/withdraw",
    tag = "Bank",
    summary = "Withdraw funds from an account",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal completed", body = vaultlock_core::TransactionRecord),
        (status = 400, description = "Validation or insufficient funds"),
        (status = 404, description = "Account not found"),
        (status = 503, description = "Lock system unavailable")
    )
)]
pub async fn withdraw(State(state): State<AppState>, Json(body): Json<WithdrawRequest>) -> Result<impl IntoResponse, ApiError> {
    let account = AccountId::parse(body.account_number)?;
    let record = vaultlock_lock::with_caller_scope(state.orchestrator.withdraw(account, body.amount)).await?;
    Ok(ok_envelope(record))
}
