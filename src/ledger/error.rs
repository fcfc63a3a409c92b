//! Ledger Error Types
//!
//! One enum for everything `apply_trade`, `create_pool` and `graduate` can
//! report. Duplicate submissions are NOT errors: they succeed with
//! `TradeOutcome::duplicate` set.

use thiserror::Error;

use crate::core_types::{Address, IdentifierError, PoolId, TxHash};
use crate::money::MoneyError;
use crate::pricing::PricingError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Validation Errors (rejected before any mutation) ===
    #[error("Amount must be greater than zero: {0}")]
    InvalidAmount(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidMoney(#[from] MoneyError),

    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Invalid pool parameters: {0}")]
    InvalidPoolParams(String),

    #[error("Wallet cannot be the curve holder: {0}")]
    InvalidWallet(Address),

    #[error("Pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("Pool already exists for token {0}")]
    DuplicatePool(Address),

    #[error("Pool {0} has graduated; bonding-curve trading is closed")]
    PoolGraduated(PoolId),

    #[error("Transaction {tx_hash} was already applied to pool {pool_id}")]
    TxHashConflict { tx_hash: TxHash, pool_id: PoolId },

    #[error("Pricing rejected trade: {0}")]
    Pricing(PricingError),

    // === Arithmetic ===
    #[error("Precision underflow: trade is too small to price")]
    PrecisionUnderflow,

    // === Consistency (only surfaced under the reject policy) ===
    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    // === System Errors ===
    #[error("Concurrent modification of pool {0}")]
    ConcurrentModification(PoolId),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    /// Stable error code for API responses and audit logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidMoney(_) => "INVALID_AMOUNT",
            LedgerError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            LedgerError::InvalidPoolParams(_) => "INVALID_POOL_PARAMS",
            LedgerError::InvalidWallet(_) => "INVALID_WALLET",
            LedgerError::PoolNotFound(_) => "POOL_NOT_FOUND",
            LedgerError::DuplicatePool(_) => "DUPLICATE_POOL",
            LedgerError::PoolGraduated(_) => "POOL_GRADUATED",
            LedgerError::TxHashConflict { .. } => "TX_HASH_CONFLICT",
            LedgerError::Pricing(_) => "PRICING_REJECTED",
            LedgerError::PrecisionUnderflow => "PRECISION_UNDERFLOW",
            LedgerError::ConsistencyFault(_) => "CONSISTENCY_FAULT",
            LedgerError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            LedgerError::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidMoney(_)
            | LedgerError::InvalidIdentifier(_)
            | LedgerError::InvalidPoolParams(_)
            | LedgerError::InvalidWallet(_)
            | LedgerError::Pricing(_)
            | LedgerError::PrecisionUnderflow => 400,
            LedgerError::PoolNotFound(_) => 404,
            LedgerError::DuplicatePool(_) | LedgerError::TxHashConflict { .. } => 409,
            LedgerError::PoolGraduated(_) | LedgerError::ConsistencyFault(_) => 422,
            LedgerError::ConcurrentModification(_) => 503,
            LedgerError::StorageFailure(_) => 500,
        }
    }

    /// True for errors raised before any mutation was attempted.
    pub fn is_validation(&self) -> bool {
        self.http_status() < 500 && !matches!(self, LedgerError::ConsistencyFault(_))
    }

    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageFailure(_) | LedgerError::ConcurrentModification(_)
        )
    }
}

impl From<PricingError> for LedgerError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::PrecisionUnderflow => LedgerError::PrecisionUnderflow,
            PricingError::PoolGraduated(id) => LedgerError::PoolGraduated(id),
            other => LedgerError::Pricing(other),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::StorageFailure(e.to_string())
    }
}
