use crate::config::NodeConfig;
use anyhow::{Context, Result};
use mathstake_gate::{CodeSafetyGate, HttpSemanticReviewer};
use mathstake_inputs::{MarketDataSource, TestInputGenerator};
use mathstake_ledger::LedgerApplier;
use mathstake_sandbox::{ExecutionStats, ProcessRunner, SandboxExecutor};
use mathstake_settlement::{EvaluationSweep, ProblemEvaluator, SweepReport};
use mathstake_storage::{MarketStore, MemoryStore, StoreStats};
use mathstake_types::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Every market component wired over one snapshot-backed store.
pub struct MarketNode {
    config: NodeConfig,
    store: Arc<MemoryStore>,
    executor: Arc<SandboxExecutor>,
    sweep: EvaluationSweep,
}

impl MarketNode {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let state_file = &config.storage.state_file;
        if let Some(parent) = state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        let store = Arc::new(
            MemoryStore::open(state_file)
                .await
                .with_context(|| format!("opening market state {}", state_file.display()))?,
        );
        let dyn_store: Arc<dyn MarketStore> = store.clone();

        let gate = Arc::new(build_gate(&config)?);

        let runner = Arc::new(ProcessRunner::new(config.runner_config()));
        let executor = Arc::new(SandboxExecutor::new(runner, config.executor_config()));
        let data = Arc::new(MarketDataSource::new(clock.clone(), config.sweep.rng_seed));
        let generator = Arc::new(TestInputGenerator::new(data, executor.clone()));

        let ledger = Arc::new(LedgerApplier::new(
            dyn_store.clone(),
            gate,
            clock.clone(),
            config.ledger_config(),
        ));
        let evaluator = Arc::new(ProblemEvaluator::new(
            dyn_store.clone(),
            generator,
            executor.clone(),
            ledger,
            clock.clone(),
            config.evaluator_config(),
        ));
        let sweep = EvaluationSweep::new(dyn_store, evaluator, clock);

        info!(
            state_file = %state_file.display(),
            interpreter = %config.sandbox.interpreter,
            reviewer = config.gate.reviewer_url.is_some(),
            "✨ Market node initialized"
        );

        Ok(Self {
            config,
            store,
            executor,
            sweep,
        })
    }

    /// One sweep pass, persisted before returning.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let report = self.sweep.run_once().await?;
        self.persist().await?;
        Ok(report)
    }

    /// Sweeps on the configured interval until `shutdown` fires, then
    /// writes the final state.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.sweep.run(self.config.sweep_interval(), shutdown).await;
        self.persist().await
    }

    pub async fn persist(&self) -> Result<()> {
        self.store
            .flush()
            .await
            .context("persisting market state")
    }

    pub async fn stats(&self) -> Result<(StoreStats, ExecutionStats)> {
        let store = self.store.get_stats().await?;
        Ok((store, self.executor.get_stats().await))
    }
}

pub fn build_gate(config: &NodeConfig) -> Result<CodeSafetyGate> {
    let gate = CodeSafetyGate::new(config.gate_config());
    match config.reviewer_config() {
        Some(reviewer_config) => {
            let reviewer = HttpSemanticReviewer::new(reviewer_config)
                .context("building semantic reviewer")?;
            Ok(gate.with_reviewer(Arc::new(reviewer)))
        }
        None => Ok(gate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.state_file = dir.join("state").join("market.json");
        config.sweep.rng_seed = Some(1);
        config
    }

    #[tokio::test]
    async fn test_empty_sweep_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let node = MarketNode::new(config.clone()).await.unwrap();

        let report = node.sweep_once().await.unwrap();
        assert!(report.is_idle());
        assert!(config.storage.state_file.exists());

        let (store, exec) = node.stats().await.unwrap();
        assert_eq!(store.problem_count, 0);
        assert_eq!(exec.total_executions, 0);
    }

    #[tokio::test]
    async fn test_gate_without_reviewer_runs_static_checks() {
        let gate = build_gate(&NodeConfig::default()).unwrap();
        let report = gate
            .validate(
                "import os\ndef solve(x):\n    return os.system('ls')\n",
                "algorithm".parse().unwrap(),
            )
            .await;
        assert!(!report.is_valid);
        assert!(!report.reviewed);
    }
}
