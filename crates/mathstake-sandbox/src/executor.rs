use crate::error::SandboxError;
use crate::runner::{Capability, ExecutionRequest, HostFunctions, NoHost, ProgramRunner};
use mathstake_types::CodeType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard wall-clock bound per program run.
    pub timeout: Duration,
    /// Maximum programs running at once across all callers.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub timed_out_executions: u64,
    pub total_execution_time_ms: u64,
}

/// Result of one program run. A failed run has no output and an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output: Option<Value>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(output: Value, execution_time_ms: u64) -> Self {
        Self {
            output: Some(output),
            execution_time_ms,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            output: None,
            execution_time_ms,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }
}

/// Cost function result. `cost` is `f64::INFINITY` when the run failed or
/// returned something other than a finite non-negative number.
#[derive(Debug, Clone, PartialEq)]
pub struct CostOutcome {
    pub cost: f64,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl CostOutcome {
    fn invalid(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            cost: f64::INFINITY,
            execution_time_ms,
            error: Some(error.into()),
        }
    }
}

/// Interprets a cost function's return value.
pub fn parse_cost(value: &Value) -> Result<f64, String> {
    let cost = value
        .as_f64()
        .ok_or_else(|| format!("cost must be a number, got {}", value))?;
    if !cost.is_finite() {
        return Err(format!("cost must be finite, got {}", cost));
    }
    if cost < 0.0 {
        return Err(format!("cost must be non-negative, got {}", cost));
    }
    Ok(cost)
}

/// Wraps a [`ProgramRunner`] with a timeout, a concurrency bound and
/// statistics. Never returns an error: every failure becomes an
/// [`ExecutionOutcome`] with no output.
pub struct SandboxExecutor {
    runner: Arc<dyn ProgramRunner>,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
    execution_stats: Arc<RwLock<ExecutionStats>>,
}

impl SandboxExecutor {
    pub fn new(runner: Arc<dyn ProgramRunner>, config: ExecutorConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            runner,
            config,
            permits,
            execution_stats: Arc::new(RwLock::new(ExecutionStats::default())),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs one request. Reported time is wall-clock, capped at the timeout.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        host: &dyn HostFunctions,
    ) -> ExecutionOutcome {
        let _permit = self.permits.acquire().await.ok();
        let timeout_ms = self.config.timeout.as_millis() as u64;

        let start = Instant::now();
        let result = timeout(self.config.timeout, self.runner.run(request, host)).await;
        let elapsed_ms = (start.elapsed().as_millis() as u64).min(timeout_ms);
        let timed_out = result.is_err();

        let outcome = match result {
            Ok(Ok(output)) => ExecutionOutcome::succeeded(output, elapsed_ms),
            Ok(Err(e)) => {
                debug!(entry_point = %request.entry_point, error = %e, "Program failed");
                ExecutionOutcome::failed(e.to_string(), elapsed_ms)
            }
            Err(_) => {
                warn!(
                    entry_point = %request.entry_point,
                    timeout_ms,
                    "⏱️ Program timed out"
                );
                ExecutionOutcome::failed(SandboxError::Timeout(timeout_ms).to_string(), timeout_ms)
            }
        };

        let mut stats = self.execution_stats.write().await;
        stats.total_executions += 1;
        stats.total_execution_time_ms += outcome.execution_time_ms;
        if outcome.is_success() {
            stats.successful_executions += 1;
        } else {
            stats.failed_executions += 1;
            if timed_out {
                stats.timed_out_executions += 1;
            }
        }

        outcome
    }

    /// Calls `solve(test_input)` with no host capabilities.
    pub async fn run_solver(&self, code: &str, test_input: &Value) -> ExecutionOutcome {
        let request =
            ExecutionRequest::for_code_type(code, CodeType::Algorithm, vec![test_input.clone()]);
        self.execute(&request, &NoHost).await
    }

    /// Calls `cost(test_input, solution_output)` with no host capabilities.
    pub async fn run_cost(&self, code: &str, test_input: &Value, solution_output: &Value) -> CostOutcome {
        let request = ExecutionRequest::for_code_type(
            code,
            CodeType::CostFunction,
            vec![test_input.clone(), solution_output.clone()],
        );
        let outcome = self.execute(&request, &NoHost).await;

        match (outcome.output, outcome.error) {
            (_, Some(error)) => CostOutcome::invalid(error, outcome.execution_time_ms),
            (Some(value), None) => match parse_cost(&value) {
                Ok(cost) => CostOutcome {
                    cost,
                    execution_time_ms: outcome.execution_time_ms,
                    error: None,
                },
                Err(e) => CostOutcome::invalid(e, outcome.execution_time_ms),
            },
            (None, None) => CostOutcome::invalid("no valid result", outcome.execution_time_ms),
        }
    }

    /// Calls `generate_test_input()` with every fetcher available.
    pub async fn run_generator(&self, code: &str, host: &dyn HostFunctions) -> ExecutionOutcome {
        let request = ExecutionRequest::for_code_type(code, CodeType::TestInputGenerator, vec![])
            .with_capabilities(Capability::ALL);
        self.execute(&request, host).await
    }

    pub async fn get_stats(&self) -> ExecutionStats {
        self.execution_stats.read().await.clone()
    }
}
