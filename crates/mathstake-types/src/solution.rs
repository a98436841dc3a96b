use crate::amount::{Amount, SignedAmount};
use crate::error::{Result, TypesError};
use crate::id::{ProblemId, ProfileId, SolutionId};
use crate::problem::SolutionProtocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a solver submitted, matching the problem's protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Answer { value: f64 },
    Algorithm { code: String },
}

impl Submission {
    pub fn matches(&self, protocol: &SolutionProtocol) -> bool {
        matches!(
            (self, protocol),
            (Submission::Answer { .. }, SolutionProtocol::NumericAnswer { .. })
                | (Submission::Algorithm { .. }, SolutionProtocol::Algorithmic(_))
        )
    }
}

/// Result of scoring one solution, written once per evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionEvaluation {
    pub output: Option<Value>,
    /// `f64::INFINITY` when the solution produced no valid result.
    #[serde(with = "cost_serde")]
    pub cost: f64,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// Share of the pool credited back.
    pub gross_payout: Amount,
    /// Net profit or loss: gross payout minus stake.
    pub payout: SignedAmount,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub id: SolutionId,
    pub problem_id: ProblemId,
    pub submitter: ProfileId,
    pub submission: Submission,
    pub stake: Amount,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub evaluation: Option<SolutionEvaluation>,
}

impl Solution {
    pub fn new(
        problem_id: ProblemId,
        submitter: ProfileId,
        submission: Submission,
        stake: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        // One solution per (problem, submitter), so the pair is a stable id.
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(problem_id.as_bytes());
        seed.extend_from_slice(submitter.as_bytes());
        Self {
            id: SolutionId::new(&seed),
            problem_id,
            submitter,
            submission,
            stake,
            created_at,
            evaluation: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stake.is_zero() {
            return Err(TypesError::InvalidAmount("stake must be positive".into()));
        }
        match &self.submission {
            Submission::Answer { value } if !value.is_finite() => Err(
                TypesError::InvalidSolution("answer must be a finite number".into()),
            ),
            Submission::Algorithm { code } if code.trim().is_empty() => Err(
                TypesError::InvalidSolution("algorithm code must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }
}

/// JSON has no infinity; an infinite cost is stored as `null`.
pub mod cost_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cost: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if cost.is_finite() {
            serializer.serialize_f64(*cost)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{AlgorithmicSpec, TestInputSource};

    #[test]
    fn test_solution_id_is_per_submitter() {
        let now = Utc::now();
        let problem = ProblemId::new(b"p");
        let a = Solution::new(problem, ProfileId::new(b"a"), Submission::Answer { value: 1.0 }, Amount::from_decimal(1.0), now);
        let a2 = Solution::new(problem, ProfileId::new(b"a"), Submission::Answer { value: 2.0 }, Amount::from_decimal(3.0), now);
        let b = Solution::new(problem, ProfileId::new(b"b"), Submission::Answer { value: 1.0 }, Amount::from_decimal(1.0), now);
        assert_eq!(a.id, a2.id);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_submission_protocol_match() {
        let numeric = SolutionProtocol::NumericAnswer { intended_answer: 4.0 };
        let algorithmic = SolutionProtocol::Algorithmic(AlgorithmicSpec {
            cost_function: "def cost(a, b): return 0".into(),
            test_input: TestInputSource::Stock { symbol: "AAPL".into() },
            time_penalty_per_ms: 0.0,
            evaluation_delay_hours: 0,
        });
        let answer = Submission::Answer { value: 4.0 };
        let code = Submission::Algorithm { code: "def solve(x): return x".into() };
        assert!(answer.matches(&numeric));
        assert!(!answer.matches(&algorithmic));
        assert!(code.matches(&algorithmic));
        assert!(!code.matches(&numeric));
    }

    #[test]
    fn test_infinite_cost_roundtrips_as_null() {
        let eval = SolutionEvaluation {
            output: None,
            cost: f64::INFINITY,
            error: Some("timeout".into()),
            execution_time_ms: 5000,
            gross_payout: Amount::ZERO,
            payout: SignedAmount::from_decimal(-10.0),
            evaluated_at: Utc::now(),
        };
        let json = serde_json::to_value(&eval).unwrap();
        assert!(json["cost"].is_null());
        let back: SolutionEvaluation = serde_json::from_value(json).unwrap();
        assert!(back.cost.is_infinite());
    }
}
