use crate::error::{LedgerError, Result};
use crate::payout::{PayoutRequest, PayoutSink};
use chrono::{DateTime, Utc};
use mathstake_gate::CodeSafetyGate;
use mathstake_storage::MarketStore;
use mathstake_types::{
    Amount, Clock, HandoffStatus, PayoutHandoff, ProblemId, ProblemStatus, Profile, ProfileId,
    SignedAmount, SolutionEvaluation, SolutionId, Transaction, TransactionType,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Reputation change per unit of net payout.
    pub reputation_rate: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reputation_rate: 0.1,
        }
    }
}

/// Settlement result for one solution, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementEntry {
    pub solution_id: SolutionId,
    pub submitter: ProfileId,
    pub stake: Amount,
    /// Carries the gross and net payout.
    pub evaluation: SolutionEvaluation,
}

/// What a committed settlement wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReceipt {
    pub problem_id: ProblemId,
    pub transactions: Vec<Transaction>,
    pub total_credited: Amount,
}

/// One currency change plus its audit record.
pub(crate) struct Posting {
    pub profile_id: ProfileId,
    pub tx_type: TransactionType,
    pub amount: SignedAmount,
    pub problem_id: Option<ProblemId>,
    pub solution_id: Option<SolutionId>,
    pub description: String,
}

/// The only component that mutates balances, reputation and profit.
///
/// Every operation reads profiles fresh, applies its changes inside one
/// storage transaction and appends exactly one audit record per monetary
/// event. Operations are serialized through an internal lock.
pub struct LedgerApplier {
    pub(crate) store: Arc<dyn MarketStore>,
    pub(crate) gate: Arc<CodeSafetyGate>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: LedgerConfig,
    payout_sink: Option<Arc<dyn PayoutSink>>,
    tx_lock: Mutex<()>,
}

impl LedgerApplier {
    pub fn new(
        store: Arc<dyn MarketStore>,
        gate: Arc<CodeSafetyGate>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            gate,
            clock,
            config,
            payout_sink: None,
            tx_lock: Mutex::new(()),
        }
    }

    pub fn with_payout_sink(mut self, sink: Arc<dyn PayoutSink>) -> Self {
        self.payout_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs `op` inside a storage transaction; commits on success and rolls
    /// back on any error.
    pub(crate) async fn atomically<T, F>(&self, label: &'static str, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let _guard = self.tx_lock.lock().await;
        self.store.begin_transaction().await?;

        match op.await {
            Ok(value) => {
                self.store.commit_transaction().await?;
                debug!(operation = label, "✅ Ledger transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback_transaction().await {
                    error!(
                        operation = label,
                        error = %rollback_err,
                        "❌ Ledger rollback failed"
                    );
                }
                info!(operation = label, error = %e, "↩️ Ledger transaction rolled back");
                Err(e)
            }
        }
    }

    pub(crate) async fn load_profile(&self, id: &ProfileId) -> Result<Profile> {
        self.store
            .get_profile(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("profile {}", id)))
    }

    /// Applies a posting and any extra profile changes, then appends the
    /// audit record. Must run inside [`Self::atomically`].
    pub(crate) async fn post_with<F>(&self, posting: Posting, adjust: F) -> Result<Transaction>
    where
        F: FnOnce(&mut Profile) + Send,
    {
        let mut profile = self.load_profile(&posting.profile_id).await?;

        profile.currency = posting.amount.apply_to(profile.currency).ok_or_else(|| {
            LedgerError::InsufficientFunds {
                profile: profile.id.to_string(),
                available: profile.currency,
                needed: posting.amount.magnitude(),
            }
        })?;
        adjust(&mut profile);
        self.store.put_profile(&profile).await?;

        let mut tx = Transaction::new(
            posting.profile_id,
            posting.tx_type,
            posting.amount,
            posting.description,
            self.now(),
        );
        if let Some(problem_id) = posting.problem_id {
            tx = tx.for_problem(problem_id);
        }
        if let Some(solution_id) = posting.solution_id {
            tx = tx.for_solution(solution_id);
        }
        self.store.append_transaction(&tx).await?;
        Ok(tx)
    }

    pub(crate) async fn post(&self, posting: Posting) -> Result<Transaction> {
        self.post_with(posting, |_| {}).await
    }

    /// Writes a computed settlement and marks the problem evaluated, all or
    /// nothing. The problem must be claimed (`evaluating`).
    pub async fn apply_settlement(
        &self,
        problem_id: &ProblemId,
        entries: &[SettlementEntry],
    ) -> Result<SettlementReceipt> {
        let receipt = self
            .atomically("settlement", self.settle_internal(problem_id, entries))
            .await?;

        info!(
            problem_id = %problem_id,
            solutions = entries.len(),
            total_credited = receipt.total_credited.to_decimal(),
            "💰 Settlement committed"
        );

        self.hand_off(&receipt).await;
        Ok(receipt)
    }

    async fn settle_internal(
        &self,
        problem_id: &ProblemId,
        entries: &[SettlementEntry],
    ) -> Result<SettlementReceipt> {
        let problem = self
            .store
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("problem {}", problem_id)))?;
        if problem.status != ProblemStatus::Evaluating {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "problem {} is {}, not evaluating",
                problem_id, problem.status
            )));
        }

        let pool = problem
            .bounty
            .saturating_add(entries.iter().map(|e| e.stake).sum());
        let credited: Amount = entries.iter().map(|e| e.evaluation.gross_payout).sum();
        if credited != pool {
            return Err(LedgerError::InvalidState(format!(
                "payouts {} do not match pool {}",
                credited, pool
            )));
        }

        let rate = self.config.reputation_rate;
        let mut transactions = Vec::with_capacity(entries.len());

        for entry in entries {
            let solution = self
                .store
                .get_solution(&entry.solution_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("solution {}", entry.solution_id)))?;
            if solution.problem_id != *problem_id || solution.submitter != entry.submitter {
                return Err(LedgerError::InvalidState(format!(
                    "solution {} does not belong to problem {}",
                    entry.solution_id, problem_id
                )));
            }

            self.store
                .record_evaluation(&entry.solution_id, entry.evaluation.clone())
                .await?;

            let gross = entry.evaluation.gross_payout;
            let net = entry.evaluation.payout;
            let reputation_delta = rate * net.to_decimal();

            let tx = self
                .post_with(
                    Posting {
                        profile_id: entry.submitter,
                        tx_type: TransactionType::Payout,
                        amount: gross.to_signed(),
                        problem_id: Some(*problem_id),
                        solution_id: Some(entry.solution_id),
                        description: format!(
                            "Payout for problem {}: net {}, reputation {:+.6}",
                            problem_id.short(),
                            net,
                            reputation_delta
                        ),
                    },
                    |profile| {
                        profile.reputation += reputation_delta;
                        profile.total_profit = profile.total_profit.saturating_add(net);
                    },
                )
                .await?;

            debug!(
                problem_id = %problem_id,
                solution_id = %entry.solution_id,
                gross = gross.to_decimal(),
                net = net.to_decimal(),
                reputation_delta,
                "Payout posted"
            );
            transactions.push(tx);
        }

        let now = self.now();
        self.store
            .transition_problem(
                problem_id,
                ProblemStatus::Evaluating,
                ProblemStatus::Evaluated,
                now,
            )
            .await?;

        Ok(SettlementReceipt {
            problem_id: *problem_id,
            transactions,
            total_credited: credited,
        })
    }

    /// Settles a problem with no solutions: the bounty goes back to the
    /// creator and the problem is marked evaluated.
    pub async fn apply_empty_refund(&self, problem_id: &ProblemId) -> Result<SettlementReceipt> {
        let receipt = self
            .atomically("empty_refund", self.refund_internal(problem_id))
            .await?;
        info!(
            problem_id = %problem_id,
            bounty = receipt.total_credited.to_decimal(),
            "↩️ Bounty returned (no solutions)"
        );
        Ok(receipt)
    }

    async fn refund_internal(&self, problem_id: &ProblemId) -> Result<SettlementReceipt> {
        let problem = self
            .store
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("problem {}", problem_id)))?;
        if problem.status != ProblemStatus::Evaluating {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "problem {} is {}, not evaluating",
                problem_id, problem.status
            )));
        }
        if !self.store.list_solutions(problem_id).await?.is_empty() {
            return Err(LedgerError::InvalidState(format!(
                "problem {} has solutions",
                problem_id
            )));
        }

        let tx = self
            .post(Posting {
                profile_id: problem.creator,
                tx_type: TransactionType::BountyReturn,
                amount: problem.bounty.to_signed(),
                problem_id: Some(*problem_id),
                solution_id: None,
                description: format!("Bounty returned for problem {}: no solutions", problem_id.short()),
            })
            .await?;

        self.store
            .transition_problem(
                problem_id,
                ProblemStatus::Evaluating,
                ProblemStatus::Evaluated,
                self.now(),
            )
            .await?;

        Ok(SettlementReceipt {
            problem_id: *problem_id,
            transactions: vec![tx],
            total_credited: problem.bounty,
        })
    }

    /// Offers committed positive payouts to the external sink. Outcomes go to
    /// the hand-off log; nothing here can undo the settlement.
    async fn hand_off(&self, receipt: &SettlementReceipt) {
        let Some(sink) = &self.payout_sink else {
            return;
        };

        for tx in &receipt.transactions {
            if tx.tx_type != TransactionType::Payout || tx.amount.to_units() <= 0 {
                continue;
            }
            let wallet = match self.store.get_profile(&tx.profile_id).await {
                Ok(Some(Profile {
                    wallet_address: Some(wallet),
                    ..
                })) => wallet,
                Ok(_) => continue,
                Err(e) => {
                    warn!(profile_id = %tx.profile_id, error = %e, "⚠️ Could not load profile for hand-off");
                    continue;
                }
            };

            let request = PayoutRequest {
                profile_id: tx.profile_id,
                wallet_address: wallet.clone(),
                amount: tx.amount.magnitude(),
                transaction_id: tx.id,
            };

            let (status, external_ref, error) = match sink.send_payout(&request).await {
                Ok(reference) => {
                    info!(
                        profile_id = %tx.profile_id,
                        amount = request.amount.to_decimal(),
                        external_ref = %reference,
                        "🔗 Payout handed off"
                    );
                    (HandoffStatus::Sent, Some(reference), None)
                }
                Err(e) => {
                    warn!(
                        profile_id = %tx.profile_id,
                        amount = request.amount.to_decimal(),
                        error = %e,
                        "⚠️ Payout hand-off failed"
                    );
                    (HandoffStatus::Failed, None, Some(e.to_string()))
                }
            };

            let record = PayoutHandoff {
                transaction_id: tx.id,
                profile_id: tx.profile_id,
                wallet_address: wallet,
                amount: request.amount,
                status,
                external_ref,
                error,
                recorded_at: self.now(),
            };
            if let Err(e) = self.store.append_handoff(&record).await {
                warn!(transaction_id = %tx.id, error = %e, "⚠️ Could not record hand-off");
            }
        }
    }

    /// Sum of all audit amounts for a profile.
    pub async fn audited_total(&self, profile_id: &ProfileId) -> Result<SignedAmount> {
        Ok(self
            .store
            .transaction_history(profile_id)
            .await?
            .iter()
            .map(|tx| tx.amount)
            .sum())
    }
}
