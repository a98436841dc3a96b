use mathstake_types::TypesError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InputError>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Test input generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid test input source: {0}")]
    InvalidSource(String),

    #[error("Types error: {0}")]
    Types(#[from] TypesError),
}
