use mathstake_gate::Severity;
use mathstake_storage::StorageError;
use mathstake_types::{Amount, TypesError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Code rejected ({severity}): {}", issues.join("; "))]
    ValidationRejected { severity: Severity, issues: Vec<String> },

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Ledger write failed: {0}")]
    LedgerWriteFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient funds: {profile} has {available}, needs {needed}")]
    InsufficientFunds {
        profile: String,
        available: Amount,
        needed: Amount,
    },

    #[error("Profile is frozen: {0}")]
    Frozen(String),

    #[error("Duplicate solution: {0}")]
    DuplicateSolution(String),

    #[error("Deadline passed: {0}")]
    DeadlinePassed(String),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payout hand-off failed: {0}")]
    HandoffFailed(String),

    #[error("Types error: {0}")]
    Types(#[from] TypesError),
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => LedgerError::NotFound(what),
            StorageError::Conflict(what) => LedgerError::ConcurrencyConflict(what),
            other => LedgerError::LedgerWriteFailure(other.to_string()),
        }
    }
}

impl LedgerError {
    /// Whether a later sweep may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LedgerWriteFailure(_) | LedgerError::ConcurrencyConflict(_)
        )
    }
}
