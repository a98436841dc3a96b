use crate::amount::Amount;
use crate::error::{Result, TypesError};
use crate::id::{ProblemId, ProfileId};
use crate::input::TestInput;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_RANGE_COUNT: u32 = 100;
/// Widest `[min, max]` a range source may span. Keeps the sampler's internal
/// scaling finite.
pub const MAX_RANGE_WIDTH: f64 = f64::MAX / 4.0;
/// One year.
pub const MAX_EVALUATION_DELAY_HOURS: u32 = 24 * 365;

/// Kind of user-supplied code, which decides the entry point and gate rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    CostFunction,
    TestInputGenerator,
    Algorithm,
}

impl CodeType {
    /// Entry-point function the sandbox invokes for this code.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Self::CostFunction => "cost",
            Self::TestInputGenerator => "generate_test_input",
            Self::Algorithm => "solve",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CostFunction => "cost_function",
            Self::TestInputGenerator => "test_input_generator",
            Self::Algorithm => "algorithm",
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cost_function" => Ok(Self::CostFunction),
            "test_input_generator" => Ok(Self::TestInputGenerator),
            "algorithm" => Ok(Self::Algorithm),
            other => Err(TypesError::UnknownCodeType(other.to_string())),
        }
    }
}

/// Where the evaluation input of an algorithmic problem comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestInputSource {
    /// `count` uniform samples from `[min, max]`.
    Range { count: u32, min: f64, max: f64 },
    Stock { symbol: String },
    Crypto { symbol: String },
    Weather { city: String },
    /// User-supplied `generate_test_input()` run in the sandbox.
    Custom { generator_code: String },
}

impl TestInputSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Range { .. } => "range",
            Self::Stock { .. } => "stock",
            Self::Crypto { .. } => "crypto",
            Self::Weather { .. } => "weather",
            Self::Custom { .. } => "custom",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Range { count, min, max } => {
                if *count == 0 || *count > MAX_RANGE_COUNT {
                    return Err(TypesError::InvalidProblem(format!(
                        "range count must be in [1, {}], got {}",
                        MAX_RANGE_COUNT, count
                    )));
                }
                if !min.is_finite() || !max.is_finite() || min > max || max - min > MAX_RANGE_WIDTH {
                    return Err(TypesError::InvalidProblem(format!(
                        "range bounds must be finite with min <= max and a bounded width, got [{}, {}]",
                        min, max
                    )));
                }
                Ok(())
            }
            Self::Stock { symbol } | Self::Crypto { symbol } => {
                if symbol.trim().is_empty() {
                    return Err(TypesError::InvalidProblem("symbol must not be empty".into()));
                }
                Ok(())
            }
            Self::Weather { city } => {
                if city.trim().is_empty() {
                    return Err(TypesError::InvalidProblem("city must not be empty".into()));
                }
                Ok(())
            }
            Self::Custom { generator_code } => {
                if generator_code.trim().is_empty() {
                    return Err(TypesError::InvalidProblem(
                        "custom generator code must not be empty".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Algorithmic protocol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicSpec {
    /// Source of `cost(test_input, solution_output)`.
    pub cost_function: String,
    pub test_input: TestInputSource,
    /// Energy price charged against a solver's stake, in currency per ms.
    pub time_penalty_per_ms: f64,
    /// Extra wait after the deadline before evaluating (data-source problems).
    #[serde(default)]
    pub evaluation_delay_hours: u32,
}

/// How solutions to a problem are expressed and judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum SolutionProtocol {
    NumericAnswer { intended_answer: f64 },
    Algorithmic(AlgorithmicSpec),
}

impl SolutionProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NumericAnswer { .. } => "numeric_answer",
            Self::Algorithmic(_) => "algorithmic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemStatus {
    /// Accepting submissions.
    Open,
    /// Deadline passed, waiting for the evaluation delay or a retry.
    Closed,
    /// Claimed by a sweep; transient.
    Evaluating,
    Evaluated,
    Invalidated,
}

impl ProblemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Evaluated | Self::Invalidated)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        use ProblemStatus::*;
        match (self, next) {
            (Open, Closed) => true,
            (Open, Evaluating) => true,
            (Open, Invalidated) => true,

            (Closed, Evaluating) => true,
            (Closed, Invalidated) => true,

            // Claim released after a failed pass
            (Evaluating, Closed) => true,
            (Evaluating, Evaluated) => true,

            (Evaluated, _) | (Invalidated, _) => false,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Evaluating => "evaluating",
            Self::Evaluated => "evaluated",
            Self::Invalidated => "invalidated",
        }
    }
}

impl fmt::Display for ProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub creator: ProfileId,
    pub description: String,
    pub protocol: SolutionProtocol,
    pub bounty: Amount,
    pub deadline: DateTime<Utc>,
    pub status: ProblemStatus,
    /// Written once at evaluation time.
    pub test_input: Option<TestInput>,
    pub created_at: DateTime<Utc>,
    /// When the current evaluation claim was taken.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Problem {
    /// Instant after which the sweep may evaluate this problem.
    pub fn evaluation_due_at(&self) -> DateTime<Utc> {
        match &self.protocol {
            SolutionProtocol::Algorithmic(spec) => {
                // Saturates for delays persisted before the bound was enforced.
                self.deadline
                    .checked_add_signed(Duration::hours(spec.evaluation_delay_hours as i64))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            SolutionProtocol::NumericAnswer { .. } => self.deadline,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ProblemStatus::Open | ProblemStatus::Closed)
            && self.evaluation_due_at() < now
    }

    pub fn accepts_submissions(&self, now: DateTime<Utc>) -> bool {
        self.status == ProblemStatus::Open && now < self.deadline
    }

    pub fn time_penalty_per_ms(&self) -> f64 {
        match &self.protocol {
            SolutionProtocol::Algorithmic(spec) => spec.time_penalty_per_ms.max(0.0),
            SolutionProtocol::NumericAnswer { .. } => 0.0,
        }
    }

    /// Checks the static shape of a new problem.
    pub fn validate(&self) -> Result<()> {
        if self.bounty.is_zero() {
            return Err(TypesError::InvalidAmount("bounty must be positive".into()));
        }
        if self.description.trim().is_empty() {
            return Err(TypesError::InvalidProblem("description must not be empty".into()));
        }
        match &self.protocol {
            SolutionProtocol::NumericAnswer { intended_answer } => {
                if !intended_answer.is_finite() {
                    return Err(TypesError::InvalidProblem(
                        "intended answer must be finite".into(),
                    ));
                }
            }
            SolutionProtocol::Algorithmic(spec) => {
                if spec.cost_function.trim().is_empty() {
                    return Err(TypesError::InvalidProblem(
                        "cost function must not be empty".into(),
                    ));
                }
                if !spec.time_penalty_per_ms.is_finite() || spec.time_penalty_per_ms < 0.0 {
                    return Err(TypesError::InvalidProblem(
                        "time penalty must be a non-negative number".into(),
                    ));
                }
                if spec.evaluation_delay_hours > MAX_EVALUATION_DELAY_HOURS {
                    return Err(TypesError::InvalidProblem(format!(
                        "evaluation delay must be at most {} hours, got {}",
                        MAX_EVALUATION_DELAY_HOURS, spec.evaluation_delay_hours
                    )));
                }
                spec.test_input.validate()?;
            }
        }
        Ok(())
    }
}
