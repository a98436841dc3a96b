use mathstake_inputs::InputError;
use mathstake_ledger::LedgerError;
use mathstake_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Test input generation failed: {0}")]
    GenerationFailed(#[from] InputError),

    #[error("Invalid settlement: {0}")]
    InvalidSettlement(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for SettlementError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(what) => SettlementError::ConcurrencyConflict(what),
            StorageError::NotFound(what) => SettlementError::NotFound(what),
            other => SettlementError::Storage(other),
        }
    }
}

impl SettlementError {
    /// Another sweep holds or finished the problem.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SettlementError::ConcurrencyConflict(_)
                | SettlementError::Ledger(LedgerError::ConcurrencyConflict(_))
        )
    }
}
