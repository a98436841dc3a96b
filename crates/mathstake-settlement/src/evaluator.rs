use crate::engine::{compute_payouts, PayoutBranch, ScoredSolution};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Duration, Utc};
use mathstake_inputs::TestInputGenerator;
use mathstake_ledger::{LedgerApplier, SettlementEntry};
use mathstake_sandbox::SandboxExecutor;
use mathstake_storage::MarketStore;
use mathstake_types::{
    Amount, Clock, Problem, ProblemId, SignedAmount, Solution, SolutionEvaluation,
    SolutionId, SolutionProtocol, Submission, TestInput,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// How long a claim protects a problem from other sweeps.
    pub claim_lease_secs: i64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            claim_lease_secs: 600,
        }
    }
}

impl EvaluatorConfig {
    pub fn claim_lease(&self) -> Duration {
        Duration::seconds(self.claim_lease_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolutionResult {
    pub solution_id: SolutionId,
    pub cost: f64,
    pub execution_time_ms: u64,
    pub gross_payout: Amount,
    /// Net profit or loss.
    pub payout: SignedAmount,
}

/// Outcome of one committed evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub problem_id: ProblemId,
    pub test_input: TestInput,
    pub results: Vec<SolutionResult>,
    pub pool_consumed: Amount,
    /// `None` when there were no solutions and the bounty was refunded.
    pub branch: Option<PayoutBranch>,
}

impl EvaluationReport {
    pub fn is_refund(&self) -> bool {
        self.branch.is_none()
    }
}

/// Evaluates one expired problem end to end: claim, fix the test input,
/// score every solution, compute the split and hand it to the ledger.
pub struct ProblemEvaluator {
    store: Arc<dyn MarketStore>,
    generator: Arc<TestInputGenerator>,
    executor: Arc<SandboxExecutor>,
    ledger: Arc<LedgerApplier>,
    clock: Arc<dyn Clock>,
    config: EvaluatorConfig,
}

impl ProblemEvaluator {
    pub fn new(
        store: Arc<dyn MarketStore>,
        generator: Arc<TestInputGenerator>,
        executor: Arc<SandboxExecutor>,
        ledger: Arc<LedgerApplier>,
        clock: Arc<dyn Clock>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            store,
            generator,
            executor,
            ledger,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Claims and settles `problem_id`. Fails with `ConcurrencyConflict` if
    /// another sweep holds it or it is already evaluated; on any other
    /// failure the claim is released so a later sweep can retry.
    pub async fn evaluate(&self, problem_id: &ProblemId) -> Result<EvaluationReport> {
        let now = self.clock.now();
        let problem = self
            .store
            .claim_problem(problem_id, now, self.config.claim_lease())
            .await?;
        debug!(problem_id = %problem_id, "🔒 Problem claimed");

        match self.settle_claimed(&problem).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.release_claim(problem_id, problem.claimed_at.unwrap_or(now), &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Gives the claim taken at `claimed_at` back. A claim another sweep has
    /// since taken over is left alone.
    async fn release_claim(
        &self,
        problem_id: &ProblemId,
        claimed_at: DateTime<Utc>,
        cause: &SettlementError,
    ) {
        match self.store.release_claim(problem_id, claimed_at).await {
            Ok(_) => warn!(
                problem_id = %problem_id,
                error = %cause,
                "⚠️ Evaluation failed, claim released for retry"
            ),
            Err(release_err) => warn!(
                problem_id = %problem_id,
                error = %cause,
                release_error = %release_err,
                "⚠️ Evaluation failed and the claim could not be released"
            ),
        }
    }

    async fn settle_claimed(&self, problem: &Problem) -> Result<EvaluationReport> {
        let test_input = self.fix_test_input(problem).await?;
        let solutions = self.store.list_solutions(&problem.id).await?;

        if solutions.is_empty() {
            let receipt = self.ledger.apply_empty_refund(&problem.id).await?;
            return Ok(EvaluationReport {
                problem_id: problem.id,
                test_input,
                results: Vec::new(),
                pool_consumed: receipt.total_credited,
                branch: None,
            });
        }

        let mut scored = Vec::with_capacity(solutions.len());
        let mut measured = Vec::with_capacity(solutions.len());
        for solution in &solutions {
            let measurement = self.score(problem, &test_input, solution).await;
            scored.push(ScoredSolution {
                solution_id: solution.id,
                submitter: solution.submitter,
                stake: solution.stake,
                cost: measurement.cost,
                execution_time_ms: measurement.execution_time_ms,
            });
            measured.push(measurement);
        }

        let plan = compute_payouts(problem.bounty, problem.time_penalty_per_ms(), &scored)?;
        let evaluated_at = self.clock.now();

        let entries: Vec<SettlementEntry> = plan
            .shares
            .iter()
            .zip(measured)
            .map(|(share, measurement)| SettlementEntry {
                solution_id: share.solution_id,
                submitter: share.submitter,
                stake: share.stake,
                evaluation: SolutionEvaluation {
                    output: measurement.output,
                    cost: measurement.cost,
                    error: measurement.error,
                    execution_time_ms: measurement.execution_time_ms,
                    gross_payout: share.gross,
                    payout: share.net,
                    evaluated_at,
                },
            })
            .collect();

        self.ledger.apply_settlement(&problem.id, &entries).await?;

        info!(
            problem_id = %problem.id,
            solutions = entries.len(),
            pool = plan.pool.to_decimal(),
            branch = %plan.branch,
            input = %test_input.fingerprint(),
            "🏁 Problem evaluated"
        );

        Ok(EvaluationReport {
            problem_id: problem.id,
            test_input,
            results: entries
                .iter()
                .map(|e| SolutionResult {
                    solution_id: e.solution_id,
                    cost: e.evaluation.cost,
                    execution_time_ms: e.evaluation.execution_time_ms,
                    gross_payout: e.evaluation.gross_payout,
                    payout: e.evaluation.payout,
                })
                .collect(),
            pool_consumed: plan.total_gross(),
            branch: Some(plan.branch),
        })
    }

    /// Reads back a persisted input or generates and persists a new one.
    async fn fix_test_input(&self, problem: &Problem) -> Result<TestInput> {
        if let Some(existing) = &problem.test_input {
            debug!(
                problem_id = %problem.id,
                input = %existing.fingerprint(),
                "Reusing persisted test input"
            );
            return Ok(existing.clone());
        }
        let generated = self.generator.generate(problem).await?;
        Ok(self.store.set_test_input_once(&problem.id, generated).await?)
    }

    async fn score(&self, problem: &Problem, input: &TestInput, solution: &Solution) -> Measurement {
        let measurement = match (&problem.protocol, &solution.submission) {
            (SolutionProtocol::NumericAnswer { intended_answer }, Submission::Answer { value }) => {
                let cost = (value - intended_answer).abs();
                Measurement {
                    output: Some(json!(value)),
                    cost: if cost.is_finite() { cost } else { f64::INFINITY },
                    error: None,
                    execution_time_ms: 0,
                }
            }
            (SolutionProtocol::Algorithmic(spec), Submission::Algorithm { code }) => {
                self.run_algorithm(code, &spec.cost_function, &input.value).await
            }
            _ => Measurement::failed("submission does not match the problem protocol", 0),
        };

        debug!(
            problem_id = %problem.id,
            solution_id = %solution.id,
            cost = measurement.cost,
            execution_time_ms = measurement.execution_time_ms,
            error = ?measurement.error,
            "Solution scored"
        );
        measurement
    }

    async fn run_algorithm(&self, code: &str, cost_function: &str, input: &Value) -> Measurement {
        let solved = self.executor.run_solver(code, input).await;
        let output = match (solved.output, solved.error) {
            (_, Some(error)) => return Measurement::failed(error, solved.execution_time_ms),
            (None, None) => {
                return Measurement::failed("no valid result", solved.execution_time_ms)
            }
            (Some(output), None) => output,
        };

        let costed = self.executor.run_cost(cost_function, input, &output).await;
        Measurement {
            output: Some(output),
            cost: costed.cost,
            error: costed.error,
            execution_time_ms: solved
                .execution_time_ms
                .saturating_add(costed.execution_time_ms),
        }
    }
}

struct Measurement {
    output: Option<Value>,
    cost: f64,
    error: Option<String>,
    execution_time_ms: u64,
}

impl Measurement {
    fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            output: None,
            cost: f64::INFINITY,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}
