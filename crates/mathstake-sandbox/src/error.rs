use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Program raised an error: {0}")]
    ProgramError(String),

    #[error("Capability not granted: {0}")]
    CapabilityDenied(String),

    #[error("Host call failed: {0}")]
    HostCall(String),

    #[error("Program finished without a result{}", if .0.is_empty() { String::new() } else { format!(": {}", .0) })]
    NoResult(String),

    #[error("Invalid program output: {0}")]
    InvalidOutput(String),

    #[error("Output limit exceeded: {0} bytes")]
    OutputLimit(usize),

    #[error("Failed to start interpreter: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
