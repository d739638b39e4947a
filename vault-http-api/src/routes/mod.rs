pub mod balances;
pub mod health;
pub mod session;
pub mod vault;
pub mod wallet;

use axum::http::StatusCode;
use vault_runtime::{ErrorKind, VaultError};

/// Status and body for a runtime error returned outside a
/// `VaultOperationResult`.
pub(crate) fn error_response(err: VaultError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::InvalidAmount | ErrorKind::InsufficientBalance => StatusCode::BAD_REQUEST,
        ErrorKind::WalletUnavailable | ErrorKind::NetworkMismatch => StatusCode::CONFLICT,
        ErrorKind::ExternalServiceError | ErrorKind::GaslessSubmissionFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::NetworkTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::GaslessConfigMissing => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
