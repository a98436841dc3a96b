use crate::error::{Result, StorageError};
use crate::snapshot::{MarketState, Snapshot};
use crate::store::{MarketStore, StoreStats};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mathstake_types::{
    PayoutHandoff, Problem, ProblemId, ProblemStatus, Profile, ProfileId, Solution,
    SolutionEvaluation, SolutionId, TestInput, Transaction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory store with whole-state snapshot transactions and optional
/// JSON persistence.
///
/// A rollback restores the state captured by `begin_transaction`, so callers
/// must not interleave unrelated writes with an open transaction.
pub struct MemoryStore {
    state: Arc<RwLock<MarketState>>,
    transaction_backup: Arc<RwLock<Option<MarketState>>>,
    /// Test hook: number of writes allowed before every write fails.
    write_budget: Arc<RwLock<Option<usize>>>,
    /// Snapshot file written by `flush`, set by `open`.
    persist_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_claimable(problem: &Problem, now: DateTime<Utc>, lease: Duration) -> bool {
    match problem.status {
        ProblemStatus::Open | ProblemStatus::Closed => problem.is_due(now),
        ProblemStatus::Evaluating => problem.claimed_at.map_or(true, |claimed| {
            claimed
                .checked_add_signed(lease)
                .is_some_and(|expiry| expiry < now)
        }),
        ProblemStatus::Evaluated | ProblemStatus::Invalidated => false,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_state(MarketState::default())
    }

    pub fn from_state(mut state: MarketState) -> Self {
        state.rebuild_indexes();
        Self {
            state: Arc::new(RwLock::new(state)),
            transaction_backup: Arc::new(RwLock::new(None)),
            write_budget: Arc::new(RwLock::new(None)),
            persist_path: None,
        }
    }

    /// Loads from a snapshot file, or starts empty if it does not exist.
    /// [`MarketStore::flush`] writes back to the same file.
    pub async fn open(path: &Path) -> Result<Self> {
        let mut store = if tokio::fs::try_exists(path).await? {
            let snapshot = Snapshot::load_from_file(path).await?;
            Self::from_state(snapshot.state)
        } else {
            info!(path = %path.display(), "📂 No snapshot found, starting empty");
            Self::new()
        };
        store.persist_path = Some(path.to_path_buf());
        Ok(store)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.read().await;
        Snapshot::create(&state)?.save_to_file(path).await
    }

    /// Makes every write after the next `writes` fail with a backend error.
    /// `None` clears the limit.
    pub async fn fail_writes_after(&self, writes: Option<usize>) {
        *self.write_budget.write().await = writes;
    }

    async fn check_write(&self) -> Result<()> {
        let mut budget = self.write_budget.write().await;
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(StorageError::BackendError("storage unavailable".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn get_problem(&self, id: &ProblemId) -> Result<Option<Problem>> {
        Ok(self.state.read().await.problems.get(id).cloned())
    }

    async fn insert_problem(&self, problem: &Problem) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.problems.contains_key(&problem.id) {
            return Err(StorageError::AlreadyExists(format!("problem {}", problem.id)));
        }
        state.problems.insert(problem.id, problem.clone());
        debug!(problem_id = %problem.id, "Problem stored");
        Ok(())
    }

    async fn list_problems(&self) -> Result<Vec<Problem>> {
        Ok(self.state.read().await.problems.values().cloned().collect())
    }

    async fn list_claimable_problems(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<ProblemId>> {
        let state = self.state.read().await;
        let mut due: Vec<&Problem> = state
            .problems
            .values()
            .filter(|p| is_claimable(p, now, lease))
            .collect();
        due.sort_by_key(|p| (p.evaluation_due_at(), p.id));
        Ok(due.into_iter().map(|p| p.id).collect())
    }

    async fn claim_problem(
        &self,
        id: &ProblemId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Problem> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let problem = state
            .problems
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("problem {}", id)))?;

        if !is_claimable(problem, now, lease) {
            return Err(StorageError::Conflict(format!(
                "problem {} is {} and not claimable",
                id, problem.status
            )));
        }

        problem.status = ProblemStatus::Evaluating;
        problem.claimed_at = Some(now);
        Ok(problem.clone())
    }

    async fn release_claim(&self, id: &ProblemId, claimed_at: DateTime<Utc>) -> Result<Problem> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let problem = state
            .problems
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("problem {}", id)))?;

        if problem.status != ProblemStatus::Evaluating || problem.claimed_at != Some(claimed_at) {
            return Err(StorageError::Conflict(format!(
                "problem {} is no longer held by the claim from {}",
                id, claimed_at
            )));
        }

        problem.status = ProblemStatus::Closed;
        problem.claimed_at = None;
        Ok(problem.clone())
    }

    async fn transition_problem(
        &self,
        id: &ProblemId,
        expected: ProblemStatus,
        next: ProblemStatus,
        at: DateTime<Utc>,
    ) -> Result<Problem> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let problem = state
            .problems
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("problem {}", id)))?;

        if problem.status != expected {
            return Err(StorageError::Conflict(format!(
                "problem {} is {}, expected {}",
                id, problem.status, expected
            )));
        }
        if !expected.can_transition_to(&next) {
            return Err(StorageError::Conflict(format!(
                "invalid transition {} -> {}",
                expected, next
            )));
        }

        problem.status = next;
        if expected == ProblemStatus::Evaluating {
            problem.claimed_at = None;
        }
        if next == ProblemStatus::Evaluated {
            problem.evaluated_at = Some(at);
        }
        Ok(problem.clone())
    }

    async fn set_test_input_once(&self, id: &ProblemId, input: TestInput) -> Result<TestInput> {
        let mut state = self.state.write().await;
        let problem = state
            .problems
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("problem {}", id)))?;

        if let Some(existing) = &problem.test_input {
            return Ok(existing.clone());
        }
        drop(state);
        self.check_write().await?;

        let mut state = self.state.write().await;
        let problem = state
            .problems
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("problem {}", id)))?;
        Ok(problem.test_input.get_or_insert(input).clone())
    }

    async fn insert_solution(&self, solution: &Solution) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let key = (solution.problem_id, solution.submitter);
        if state.submitter_index.contains(&key) || state.solutions.contains_key(&solution.id) {
            return Err(StorageError::AlreadyExists(format!(
                "solution by {} for problem {}",
                solution.submitter, solution.problem_id
            )));
        }
        state.submitter_index.insert(key);
        state.solutions.insert(solution.id, solution.clone());
        Ok(())
    }

    async fn get_solution(&self, id: &SolutionId) -> Result<Option<Solution>> {
        Ok(self.state.read().await.solutions.get(id).cloned())
    }

    async fn list_solutions(&self, problem_id: &ProblemId) -> Result<Vec<Solution>> {
        let state = self.state.read().await;
        let mut solutions: Vec<Solution> = state
            .solutions
            .values()
            .filter(|s| s.problem_id == *problem_id)
            .cloned()
            .collect();
        solutions.sort_by_key(|s| (s.created_at, s.id));
        Ok(solutions)
    }

    async fn record_evaluation(&self, id: &SolutionId, evaluation: SolutionEvaluation) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let problem_id = state
            .solutions
            .get(id)
            .map(|s| s.problem_id)
            .ok_or_else(|| StorageError::NotFound(format!("solution {}", id)))?;

        let evaluated = state
            .problems
            .get(&problem_id)
            .map(|p| p.status == ProblemStatus::Evaluated)
            .unwrap_or(false);
        if evaluated {
            return Err(StorageError::Conflict(format!(
                "problem {} is already evaluated",
                problem_id
            )));
        }

        if let Some(solution) = state.solutions.get_mut(id) {
            solution.evaluation = Some(evaluation);
        }
        Ok(())
    }

    async fn get_profile(&self, id: &ProfileId) -> Result<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(id).cloned())
    }

    async fn put_profile(&self, profile: &Profile) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if let Some(wallet) = &profile.wallet_address {
            let taken = state
                .profiles
                .values()
                .any(|p| p.id != profile.id && p.wallet_address.as_deref() == Some(wallet));
            if taken {
                return Err(StorageError::AlreadyExists(format!("wallet {}", wallet)));
            }
        }
        state.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.state.read().await.profiles.values().cloned().collect())
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.transactions.iter().any(|t| t.id == tx.id) {
            return Err(StorageError::AlreadyExists(format!("transaction {}", tx.id)));
        }
        state.transactions.push(tx.clone());
        Ok(())
    }

    async fn transaction_history(&self, profile_id: &ProfileId) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.profile_id == *profile_id)
            .cloned()
            .collect())
    }

    async fn problem_transactions(&self, problem_id: &ProblemId) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.problem_id == Some(*problem_id))
            .cloned()
            .collect())
    }

    async fn append_handoff(&self, record: &PayoutHandoff) -> Result<()> {
        self.check_write().await?;
        self.state.write().await.handoffs.push(record.clone());
        Ok(())
    }

    async fn list_handoffs(&self) -> Result<Vec<PayoutHandoff>> {
        Ok(self.state.read().await.handoffs.clone())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let state = self.state.read().await;
        let mut backup = self.transaction_backup.write().await;
        if backup.is_some() {
            return Err(StorageError::BackendError(
                "transaction already in progress".into(),
            ));
        }
        *backup = Some(state.clone());

        debug!(
            problems = state.problems.len(),
            transactions = state.transactions.len(),
            storage_type = "memory",
            "📝 Transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        if backup.take().is_some() {
            debug!(storage_type = "memory", "✅ Transaction committed (snapshot discarded)");
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        if let Some(previous) = backup.take() {
            let mut state = self.state.write().await;
            let transactions_before = state.transactions.len();
            *state = previous;
            info!(
                transactions_before,
                transactions_after = state.transactions.len(),
                storage_type = "memory",
                "↩️ Transaction rolled back (snapshot restored)"
            );
        }
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        Ok(StoreStats {
            problem_count: state.problems.len(),
            open_problems: state
                .problems
                .values()
                .filter(|p| p.status == ProblemStatus::Open)
                .count(),
            evaluated_problems: state
                .problems
                .values()
                .filter(|p| p.status == ProblemStatus::Evaluated)
                .count(),
            solution_count: state.solutions.len(),
            profile_count: state.profiles.len(),
            transaction_count: state.transactions.len(),
            handoff_count: state.handoffs.len(),
        })
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if self.transaction_backup.read().await.is_some() {
            return Err(StorageError::Conflict(
                "cannot flush during an open transaction".into(),
            ));
        }
        self.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathstake_types::{Amount, SolutionProtocol, Submission};

    fn numeric_problem(tag: &[u8], deadline: DateTime<Utc>) -> Problem {
        Problem {
            id: ProblemId::new(tag),
            creator: ProfileId::new(b"creator"),
            description: "guess the number".into(),
            protocol: SolutionProtocol::NumericAnswer { intended_answer: 42.0 },
            bounty: Amount::from_decimal(10.0),
            deadline,
            status: ProblemStatus::Open,
            test_input: None,
            created_at: deadline - Duration::days(1),
            claimed_at: None,
            evaluated_at: None,
        }
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now - Duration::minutes(1));
        store.insert_problem(&problem).await.unwrap();

        let lease = Duration::minutes(10);
        let claimed = store.claim_problem(&problem.id, now, lease).await.unwrap();
        assert_eq!(claimed.status, ProblemStatus::Evaluating);

        let second = store.claim_problem(&problem.id, now, lease).await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));
        assert!(store.list_claimable_problems(now, lease).await.unwrap().is_empty());

        // A stale claim can be taken over.
        let later = now + Duration::minutes(11);
        assert_eq!(store.list_claimable_problems(later, lease).await.unwrap(), vec![problem.id]);
        assert!(store.claim_problem(&problem.id, later, lease).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_release_new_claim() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now - Duration::minutes(1));
        store.insert_problem(&problem).await.unwrap();

        let lease = Duration::minutes(10);
        let first = store.claim_problem(&problem.id, now, lease).await.unwrap();
        let later = now + Duration::minutes(11);
        let second = store.claim_problem(&problem.id, later, lease).await.unwrap();

        let stale = store
            .release_claim(&problem.id, first.claimed_at.unwrap())
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));
        let held = store.get_problem(&problem.id).await.unwrap().unwrap();
        assert_eq!(held.status, ProblemStatus::Evaluating);
        assert_eq!(held.claimed_at, Some(later));

        let released = store
            .release_claim(&problem.id, second.claimed_at.unwrap())
            .await
            .unwrap();
        assert_eq!(released.status, ProblemStatus::Closed);
        assert!(released.claimed_at.is_none());
    }

    #[tokio::test]
    async fn test_oversized_lease_does_not_overflow() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now - Duration::minutes(1));
        store.insert_problem(&problem).await.unwrap();
        store.claim_problem(&problem.id, now, Duration::minutes(1)).await.unwrap();

        let lease = Duration::days(365 * 300_000);
        assert!(store.list_claimable_problems(now, lease).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_due_is_not_claimable() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"future", now + Duration::hours(1));
        store.insert_problem(&problem).await.unwrap();
        assert!(store
            .claim_problem(&problem.id, now, Duration::minutes(5))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_transition_cas() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now - Duration::minutes(1));
        store.insert_problem(&problem).await.unwrap();
        store.claim_problem(&problem.id, now, Duration::minutes(5)).await.unwrap();

        let wrong = store
            .transition_problem(&problem.id, ProblemStatus::Open, ProblemStatus::Closed, now)
            .await;
        assert!(matches!(wrong, Err(StorageError::Conflict(_))));

        let done = store
            .transition_problem(&problem.id, ProblemStatus::Evaluating, ProblemStatus::Evaluated, now)
            .await
            .unwrap();
        assert_eq!(done.evaluated_at, Some(now));
        assert!(done.claimed_at.is_none());

        let again = store
            .transition_problem(&problem.id, ProblemStatus::Evaluated, ProblemStatus::Evaluating, now)
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_test_input_written_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now);
        store.insert_problem(&problem).await.unwrap();

        let first = TestInput::new(serde_json::json!([1.0, 2.0]), "range", now);
        let second = TestInput::new(serde_json::json!([9.0]), "range", now);
        assert_eq!(store.set_test_input_once(&problem.id, first.clone()).await.unwrap(), first);
        assert_eq!(store.set_test_input_once(&problem.id, second).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_one_solution_per_submitter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let problem = numeric_problem(b"p", now);
        let submitter = ProfileId::new(b"alice");
        let a = Solution::new(problem.id, submitter, Submission::Answer { value: 1.0 }, Amount::from_decimal(1.0), now);
        let mut b = a.clone();
        b.id = SolutionId::new(b"different-id");

        store.insert_solution(&a).await.unwrap();
        assert!(matches!(store.insert_solution(&b).await, Err(StorageError::AlreadyExists(_))));
        assert_eq!(store.list_solutions(&problem.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_wallet() {
        let store = MemoryStore::new();
        store
            .put_profile(&Profile::new(ProfileId::new(b"a")).with_wallet("0xabc"))
            .await
            .unwrap();
        let clash = store
            .put_profile(&Profile::new(ProfileId::new(b"b")).with_wallet("0xabc"))
            .await;
        assert!(matches!(clash, Err(StorageError::AlreadyExists(_))));
        // Re-saving the owner is fine.
        store
            .put_profile(&Profile::new(ProfileId::new(b"a")).with_wallet("0xabc"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let store = MemoryStore::new();
        let profile = Profile::new(ProfileId::new(b"a")).with_currency(Amount::from_decimal(5.0));
        store.put_profile(&profile).await.unwrap();

        store.begin_transaction().await.unwrap();
        assert!(store.begin_transaction().await.is_err());
        let richer = profile.clone().with_currency(Amount::from_decimal(500.0));
        store.put_profile(&richer).await.unwrap();
        store.rollback_transaction().await.unwrap();

        let loaded = store.get_profile(&profile.id).await.unwrap().unwrap();
        assert_eq!(loaded.currency, Amount::from_decimal(5.0));
    }

    #[tokio::test]
    async fn test_write_failure_injection() {
        let store = MemoryStore::new();
        store.fail_writes_after(Some(1)).await;
        store.put_profile(&Profile::new(ProfileId::new(b"a"))).await.unwrap();
        assert!(matches!(
            store.put_profile(&Profile::new(ProfileId::new(b"b"))).await,
            Err(StorageError::BackendError(_))
        ));
        store.fail_writes_after(None).await;
        assert!(store.put_profile(&Profile::new(ProfileId::new(b"b"))).await.is_ok());
    }
}
