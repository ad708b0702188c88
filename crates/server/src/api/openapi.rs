use vaultlock_core::{Account, AccountStatus, LockBackendKind, TransactionKind, TransactionRecord, TransactionState};

use super::schemas::{
    BackendStatistics, BalanceResponse, ComponentHealth, HealthResponse, LockStatusResponse, ProviderAvailability,
    ProvidersResponse, SwitchRequest, SwitchResponse, TransferRequest, WithdrawRequest,
};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "vaultlock API",
        version = "0.1.0",
        description = "HTTP gateway for bank-account transfers and withdrawals guarded by a pluggable distributed lock backend.",
        license(name = "MIT")
    ),
    tags(
        (name = "Bank", description = "Transfer and withdrawal operations"),
        (name = "Lock Management", description = "Inspect and switch the active lock backend"),
        (name = "Health", description = "Composite liveness probe")
    ),
    paths(
        super::transfer::transfer,
        super::withdraw::withdraw,
        super::accounts::balance,
        super::lock_management::status,
        super::lock_management::switch,
        super::lock_management::providers,
        super::health::health,
    ),
    components(schemas(
        TransferRequest, WithdrawRequest, BalanceResponse,
        LockStatusResponse, BackendStatistics, ProviderAvailability,
        SwitchRequest, SwitchResponse, ProvidersResponse,
        ComponentHealth, HealthResponse,
        Account, AccountStatus, TransactionRecord, TransactionKind, TransactionState, LockBackendKind,
    ))
)]
pub struct ApiDoc;
