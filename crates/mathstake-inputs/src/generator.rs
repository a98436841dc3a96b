use crate::datasource::MarketDataSource;
use crate::error::{InputError, Result};
use mathstake_sandbox::SandboxExecutor;
use mathstake_types::{Problem, SolutionProtocol, TestInput, TestInputSource};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the evaluation input for a problem.
pub struct TestInputGenerator {
    data: Arc<MarketDataSource>,
    executor: Arc<SandboxExecutor>,
}

impl TestInputGenerator {
    pub fn new(data: Arc<MarketDataSource>, executor: Arc<SandboxExecutor>) -> Self {
        Self { data, executor }
    }

    pub fn data_source(&self) -> &Arc<MarketDataSource> {
        &self.data
    }

    /// Generates a fresh input. Callers persist it and must not call this
    /// again for a problem that already has one.
    pub async fn generate(&self, problem: &Problem) -> Result<TestInput> {
        let generated_at = self.data.now();
        let input = match &problem.protocol {
            SolutionProtocol::NumericAnswer { .. } => {
                TestInput::new(Value::Null, "numeric", generated_at)
            }
            SolutionProtocol::Algorithmic(spec) => {
                let value = self.generate_from_source(&spec.test_input).await?;
                TestInput::new(value, spec.test_input.kind(), generated_at)
            }
        };

        info!(
            problem_id = %problem.id,
            source = %input.source,
            fingerprint = %input.fingerprint(),
            "🎲 Test input generated"
        );
        Ok(input)
    }

    pub async fn generate_from_source(&self, source: &TestInputSource) -> Result<Value> {
        source
            .validate()
            .map_err(|e| InputError::InvalidSource(e.to_string()))?;

        match source {
            TestInputSource::Range { count, min, max } => {
                let values = self
                    .data
                    .sample_uniform(*min, *max, *count)
                    .await
                    .map_err(InputError::GenerationFailed)?;
                Ok(match values.as_slice() {
                    [single] => json!(single),
                    _ => json!(values),
                })
            }
            TestInputSource::Stock { symbol } => Ok(self.data.fetch_stock(symbol)),
            TestInputSource::Crypto { symbol } => Ok(self.data.fetch_crypto(symbol)),
            TestInputSource::Weather { city } => Ok(self.data.fetch_weather(city)),
            TestInputSource::Custom { generator_code } => {
                let outcome = self
                    .executor
                    .run_generator(generator_code, self.data.as_ref())
                    .await;
                debug!(
                    execution_time_ms = outcome.execution_time_ms,
                    success = outcome.is_success(),
                    "Custom generator finished"
                );
                match (outcome.output, outcome.error) {
                    (Some(value), None) if !value.is_null() => Ok(value),
                    (_, Some(error)) => {
                        warn!(error = %error, "⚠️ Custom generator failed");
                        Err(InputError::GenerationFailed(error))
                    }
                    _ => Err(InputError::GenerationFailed(
                        "generator returned no value".into(),
                    )),
                }
            }
        }
    }
}
