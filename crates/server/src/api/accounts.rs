use axum::extract::{Path, State};
use axum::response::IntoResponse;

use vaultlock_core::AccountId;

use crate::error::{ApiError, ok_envelope};

use super::schemas::BalanceResponse;
use super::AppState;

/// `GET /accounts/{id}/balance` (spec §6).
#[utoipa::path(
    get,
    path = "/accounts/{id}/balance",
    tag = "Bank",
    summary = "Get account balance",
    params(("id" = String, Path, description = "Account number")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 404, description = "Account not found")
    )
)]
pub async fn balance(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let id = AccountId::parse(id)?;
    let account = state.accounts.get_account(&id).await?;

    Ok(ok_envelope(BalanceResponse {
        account_number: account.id.as_str().to_string(),
        balance: account.balance,
        status: account.status.to_string(),
        last_updated: chrono::Utc::now(),
    }))
}
