use crate::rules::Severity;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Code rejected ({severity}): {}", issues.join("; "))]
    Rejected {
        severity: Severity,
        issues: Vec<String>,
    },

    #[error("Semantic reviewer unavailable: {0}")]
    ReviewerUnavailable(String),

    #[error("Semantic reviewer timed out after {0}ms")]
    ReviewerTimeout(u64),

    #[error("Invalid reviewer response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
