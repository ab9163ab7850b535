use rust_decimal::Decimal;

/// Error kinds surfaced by the ledger core. Mirrors spec section 7 one-for-one;
/// `PersistError` never reaches a caller directly (cached path swallows it into
/// a cache rollback/resync, see `account_store`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger core is not ready")]
    NotReady,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
    #[error("currency disabled: {0}")]
    CurrencyDisabled(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("limit exceeded")]
    LimitExceeded,
    #[error("mutation cancelled by pre-hook")]
    Cancelled,
    #[error("version conflict, retries exhausted")]
    Conflict,
    #[error("persist error: {0}")]
    PersistError(String),
    #[error("duplicate currency identifier: {0}")]
    DuplicateIdentifier(String),
    #[error("primary currency is protected from deletion")]
    PrimaryCurrencyProtected,
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("snapshot is empty")]
    SnapshotEmpty,
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

impl LedgerError {
    /// Stable error code for external mapping, per spec glossary.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotReady => "NOT_READY",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            LedgerError::CurrencyDisabled(_) => "CURRENCY_DISABLED",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::LimitExceeded => "LIMIT_EXCEEDED",
            LedgerError::Cancelled => "CANCELLED",
            LedgerError::Conflict => "CONFLICT",
            LedgerError::PersistError(_) => "GENERIC_FAILURE",
            LedgerError::DuplicateIdentifier(_) => "DUPLICATE_IDENTIFIER",
            LedgerError::PrimaryCurrencyProtected => "PRIMARY_CURRENCY_PROTECTED",
            LedgerError::SnapshotNotFound(_) => "SNAPSHOT_NOT_FOUND",
            LedgerError::SnapshotEmpty => "SNAPSHOT_EMPTY",
            LedgerError::Database(_) => "GENERIC_FAILURE",
        }
    }
}

/// Universal result shape for every user-visible ledger operation (spec section 7/9):
/// callers never see a thrown error, only `(success, balance, message)`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub balance: Decimal,
    pub message: String,
    pub code: &'static str,
}

impl OperationResult {
    pub fn success(balance: Decimal) -> Self {
        Self {
            success: true,
            balance,
            message: "ok".to_string(),
            code: "SUCCESS",
        }
    }

    pub fn failure(err: LedgerError, balance: Decimal) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            code: err.code(),
            balance,
        }
    }
}
