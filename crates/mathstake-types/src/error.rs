use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid problem definition: {0}")]
    InvalidProblem(String),

    #[error("Invalid solution: {0}")]
    InvalidSolution(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown code type: {0}")]
    UnknownCodeType(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, TypesError>;
