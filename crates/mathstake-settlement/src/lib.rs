//! Evaluation and settlement of expired problems.
//!
//! [`EvaluationSweep`] finds due problems, [`ProblemEvaluator`] scores each
//! one against a single fixed test input, [`compute_payouts`] splits the
//! pool and the ledger applies the result atomically.

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod sweep;

pub use engine::{
    compute_payouts, effective_stake, PayoutBranch, PayoutPlan, PayoutShare, ScoredSolution,
};
pub use error::{Result, SettlementError};
pub use evaluator::{EvaluationReport, EvaluatorConfig, ProblemEvaluator, SolutionResult};
pub use sweep::{EvaluationSweep, SweepReport};
