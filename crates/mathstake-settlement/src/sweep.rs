use crate::error::Result;
use crate::evaluator::ProblemEvaluator;
use mathstake_storage::{MarketStore, StorageError};
use mathstake_types::{Amount, Clock, ProblemId, ProblemStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What one pass over the market did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Open problems moved to `closed` because their deadline passed.
    pub closed: usize,
    pub evaluated: Vec<ProblemId>,
    pub refunded: Vec<ProblemId>,
    /// Problems another sweep got to first.
    pub conflicts: usize,
    pub failed: Vec<(ProblemId, String)>,
    pub settled_volume: Amount,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.closed == 0
            && self.evaluated.is_empty()
            && self.refunded.is_empty()
            && self.failed.is_empty()
    }
}

/// Recurring trigger for evaluation. Problems are processed one at a time.
pub struct EvaluationSweep {
    store: Arc<dyn MarketStore>,
    evaluator: Arc<ProblemEvaluator>,
    clock: Arc<dyn Clock>,
}

impl EvaluationSweep {
    pub fn new(
        store: Arc<dyn MarketStore>,
        evaluator: Arc<ProblemEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evaluator,
            clock,
        }
    }

    /// Closes expired open problems, then evaluates every problem that is
    /// due. A failure on one problem never stops the pass.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        for problem in self.store.list_problems().await? {
            if problem.status != ProblemStatus::Open || problem.deadline >= now {
                continue;
            }
            match self
                .store
                .transition_problem(&problem.id, ProblemStatus::Open, ProblemStatus::Closed, now)
                .await
            {
                Ok(_) => {
                    debug!(problem_id = %problem.id, "⏰ Submissions closed");
                    report.closed += 1;
                }
                Err(StorageError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let lease = self.evaluator.config().claim_lease();
        let due = self.store.list_claimable_problems(now, lease).await?;

        for problem_id in due {
            match self.evaluator.evaluate(&problem_id).await {
                Ok(outcome) => {
                    report.settled_volume = report.settled_volume.saturating_add(outcome.pool_consumed);
                    if outcome.is_refund() {
                        report.refunded.push(problem_id);
                    } else {
                        report.evaluated.push(problem_id);
                    }
                }
                Err(e) if e.is_conflict() => {
                    debug!(problem_id = %problem_id, error = %e, "Problem taken by another sweep");
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(problem_id = %problem_id, error = %e, "⚠️ Problem evaluation failed");
                    report.failed.push((problem_id, e.to_string()));
                }
            }
        }

        if !report.is_idle() {
            info!(
                closed = report.closed,
                evaluated = report.evaluated.len(),
                refunded = report.refunded.len(),
                conflicts = report.conflicts,
                failed = report.failed.len(),
                volume = report.settled_volume.to_decimal(),
                "🧹 Sweep finished"
            );
        }
        Ok(report)
    }

    /// Runs a sweep every `interval` until `shutdown` flips to `true` or its
    /// sender is dropped. The store is flushed after every pass that changed
    /// something.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, "🔁 Evaluation sweep started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if !report.is_idle() => {
                            if let Err(e) = self.store.flush().await {
                                warn!(error = %e, "⚠️ Could not persist market state");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "⚠️ Sweep pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("🛑 Evaluation sweep stopped");
    }
}
