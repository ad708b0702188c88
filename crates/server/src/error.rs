use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

use vaultlock_core::VaultError;

/// Wraps [`VaultError`] so it can be returned directly from a handler and
/// mapped to the uniform `{ success, message, data, timestamp }` envelope
/// (spec §6) with the status code table of spec §7.
pub struct ApiError(pub VaultError);

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VaultError::Validation { .. }
            | VaultError::InsufficientFunds { .. }
            | VaultError::AccountState { .. }
            | VaultError::UnsupportedBackend(_) => StatusCode::BAD_REQUEST,
            VaultError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
            VaultError::LockWaitTimeout
            | VaultError::Interrupted
            | VaultError::LockBackendError { .. }
            | VaultError::LockLost { .. }
            | VaultError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::StorageConflict { .. } | VaultError::Internal(_) | VaultError::SwitchIncomplete => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed with an internal error");
        }

        let body = json!({
            "success": false,
            "message": self.0.client_message(),
            "data": null,
            "timestamp": Utc::now().to_rfc3339(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

/// Wrap a successful payload in the uniform envelope (spec §6).
pub fn ok_envelope<T: serde::Serialize>(data: T) -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "success": true,
        "message": "ok",
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
