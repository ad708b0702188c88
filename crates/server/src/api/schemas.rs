use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use vaultlock_core::LockBackendKind;

/// `POST /transfer` request body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    #[schema(example = "acct-001")]
    pub from: String,
    #[schema(example = "acct-002")]
    pub to: String,
    #[schema(value_type = String, example = "25.00")]
    pub amount: Decimal,
}

/// `POST /withdraw` request body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    #[schema(example = "acct-001")]
    pub account_number: String,
    #[schema(value_type = String, example = "25.00")]
    pub amount: Decimal,
}

/// `GET /accounts/{id}/balance` response body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(example = "acct-001")]
    pub account_number: String,
    #[schema(value_type = String, example = "974.50")]
    pub balance: Decimal,
    #[schema(example = "ACTIVE")]
    pub status: String,
    #[schema(value_type = String, example = "2026-07-30T12:00:00Z")]
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

/// Per-backend telemetry snapshot embedded in [`LockStatusResponse`].
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BackendStatistics {
    pub backend: LockBackendKind,
    #[schema(example = 1024)]
    pub acquire_attempts: u64,
    #[schema(example = 1018)]
    pub acquire_success: u64,
    #[schema(example = 3)]
    pub active_locks: i64,
    #[schema(value_type = f64, example = 0.12)]
    pub contention_ratio: f64,
    #[schema(example = 4)]
    pub avg_acquire_latency_micros: u64,
}

/// `GET /lock-management/status` response body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LockStatusResponse {
    pub current_provider: LockBackendKind,
    #[schema(example = 3)]
    pub active_locks: i64,
    pub availability: Vec<ProviderAvailability>,
    #[schema(value_type = f64, example = 97.5)]
    pub efficiency: f64,
    #[schema(example = "EXCELLENT")]
    pub efficiency_grade: String,
    pub statistics: Vec<BackendStatistics>,
}

/// `POST /lock-management/switch` request body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SwitchRequest {
    #[schema(example = "zookeeper")]
    pub provider: String,
}

/// `POST /lock-management/switch` response body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SwitchResponse {
    pub previous_provider: LockBackendKind,
    pub current_provider: LockBackendKind,
}

/// One entry of the `availability` array shared by the status and
/// providers endpoints (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderAvailability {
    pub provider: LockBackendKind,
    #[schema(example = true)]
    pub available: bool,
}

/// `GET /lock-management/providers` response body (spec §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    pub supported_providers: Vec<LockBackendKind>,
    pub current: LockBackendKind,
    pub availability: Vec<ProviderAvailability>,
}

/// Health of one component contributing to `/actuator/health` (spec §4.8).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    #[schema(example = "UP")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// `GET /actuator/health` response body (spec §4.8, §6).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "UP")]
    pub status: String,
    pub components: std::collections::HashMap<String, ComponentHealth>,
}
