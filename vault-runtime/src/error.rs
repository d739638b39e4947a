use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest diagnostic string carried back to the UI.
const MAX_DIAGNOSTIC_LEN: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: String, need: String },

    #[error("Network mismatch: expected chain {expected}, wallet is on {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("User rejected the request")]
    UserRejected,

    #[error("Insufficient funds for gas: {0}")]
    InsufficientGasFunds(String),

    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("External service error: {service}: {message}")]
    ExternalService {
        service: String,
        message: String,
        transient: bool,
    },

    #[error("Timeout: {0}")]
    NetworkTimeout(String),

    #[error("Gasless configuration missing: {0}")]
    GaslessConfigMissing(String),

    #[error("Gasless submission failed: {0}")]
    GaslessSubmissionFailed(String),

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Normalized error taxonomy surfaced at the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientBalance,
    InsufficientAllowance,
    NetworkMismatch,
    UserRejected,
    InsufficientGasFunds,
    ExecutionReverted,
    ExternalServiceError,
    NetworkTimeout,
    GaslessConfigMissing,
    GaslessSubmissionFailed,
    WalletUnavailable,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Short human-readable message for display.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAmount => "Please enter a valid amount.",
            ErrorKind::InsufficientBalance => "Insufficient balance for this operation.",
            ErrorKind::InsufficientAllowance => "Token approval is required before continuing.",
            ErrorKind::NetworkMismatch => "Please switch your wallet to the correct network.",
            ErrorKind::UserRejected => "Transaction was rejected in the wallet.",
            ErrorKind::InsufficientGasFunds => "Not enough native token to pay for gas.",
            ErrorKind::ExecutionReverted => "The transaction was reverted on-chain.",
            ErrorKind::ExternalServiceError => "A pricing service is unavailable. Try again shortly.",
            ErrorKind::NetworkTimeout => "The request timed out. Try again.",
            ErrorKind::GaslessConfigMissing => "Gasless transactions are not configured.",
            ErrorKind::GaslessSubmissionFailed => "The sponsored transaction could not be submitted.",
            ErrorKind::WalletUnavailable => "No wallet is available for this operation.",
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Whether a truncated diagnostic accompanies this kind.
    pub fn keeps_diagnostic(&self) -> bool {
        matches!(self, ErrorKind::ExecutionReverted | ErrorKind::Unknown)
    }
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            VaultError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            VaultError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            VaultError::NetworkMismatch { .. } => ErrorKind::NetworkMismatch,
            VaultError::UserRejected => ErrorKind::UserRejected,
            VaultError::InsufficientGasFunds(_) => ErrorKind::InsufficientGasFunds,
            VaultError::ExecutionReverted(_) => ErrorKind::ExecutionReverted,
            VaultError::ExternalService { .. } => ErrorKind::ExternalServiceError,
            VaultError::NetworkTimeout(_) => ErrorKind::NetworkTimeout,
            VaultError::GaslessConfigMissing(_) => ErrorKind::GaslessConfigMissing,
            VaultError::GaslessSubmissionFailed(_) => ErrorKind::GaslessSubmissionFailed,
            VaultError::WalletUnavailable(_) => ErrorKind::WalletUnavailable,
            VaultError::Cancelled(_) => ErrorKind::Cancelled,
            VaultError::ConfigError(_) | VaultError::EncodingError(_) | VaultError::Unknown(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Errors the cache layer may retry once on a read path.
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::NetworkTimeout(_) => true,
            VaultError::ExternalService { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Diagnostic text for support, truncated, only for kinds that keep one.
    pub fn diagnostic(&self) -> Option<String> {
        if !self.kind().keeps_diagnostic() {
            return None;
        }
        Some(truncate_diagnostic(&self.to_string()))
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::ExternalService {
            service: service.into(),
            message: message.into(),
            transient: false,
        }
    }
}

fn truncate_diagnostic(text: &str) -> String {
    if text.chars().count() <= MAX_DIAGNOSTIC_LEN {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_DIAGNOSTIC_LEN).collect();
    out.push_str("...");
    out
}

/// Error payload returned by a wallet provider `request()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// EIP-1193 code for a request the user declined.
const USER_REJECTED_CODE: i64 = 4001;

/// Map a raw provider failure onto the taxonomy by code and message heuristics.
pub fn classify_provider_error(err: &ProviderError) -> VaultError {
    let lower = err.message.to_lowercase();

    if err.code == Some(USER_REJECTED_CODE)
        || lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected by user")
    {
        return VaultError::UserRejected;
    }
    if lower.contains("insufficient funds") {
        return VaultError::InsufficientGasFunds(err.message.clone());
    }
    if lower.contains("revert") {
        return VaultError::ExecutionReverted(err.message.clone());
    }
    VaultError::Unknown(err.to_string())
}

impl From<ProviderError> for VaultError {
    fn from(e: ProviderError) -> Self {
        classify_provider_error(&e)
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return VaultError::NetworkTimeout(e.to_string());
        }
        VaultError::ExternalService {
            service: "http".into(),
            message: e.to_string(),
            transient: e.is_connect() || e.is_request(),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::external("decode", e.to_string())
    }
}
