use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mathstake_types::{
    PayoutHandoff, Problem, ProblemId, ProblemStatus, Profile, ProfileId, Solution,
    SolutionEvaluation, SolutionId, TestInput, Transaction,
};

/// Persistence for the market. Implementations must make each method atomic
/// on its own; multi-step updates go through `begin/commit/rollback`.
#[async_trait]
pub trait MarketStore: Send + Sync {
    // Problems
    async fn get_problem(&self, id: &ProblemId) -> Result<Option<Problem>>;
    /// Inserts a new problem. Fails with `AlreadyExists` on a duplicate id.
    async fn insert_problem(&self, problem: &Problem) -> Result<()>;
    async fn list_problems(&self) -> Result<Vec<Problem>>;

    /// Ids of problems a sweep may claim at `now`: open or closed and past
    /// their evaluation time, or evaluating under a claim older than `lease`.
    async fn list_claimable_problems(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<ProblemId>>;

    /// Atomically moves a claimable problem to `evaluating` and stamps
    /// `claimed_at`. Fails with `Conflict` if another claim holds it or it
    /// is not due.
    async fn claim_problem(
        &self,
        id: &ProblemId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Problem>;

    /// Returns a claim to `closed`, but only while the claim taken at
    /// `claimed_at` is still the current one. Fails with `Conflict` once
    /// another sweep has taken the problem over.
    async fn release_claim(&self, id: &ProblemId, claimed_at: DateTime<Utc>) -> Result<Problem>;

    /// Compare-and-set on status. Validates the transition and stamps
    /// `evaluated_at` on `evaluated`; clears `claimed_at` when leaving
    /// `evaluating`.
    async fn transition_problem(
        &self,
        id: &ProblemId,
        expected: ProblemStatus,
        next: ProblemStatus,
        at: DateTime<Utc>,
    ) -> Result<Problem>;

    /// Stores the test input if none is set yet and returns whichever input
    /// is persisted afterwards.
    async fn set_test_input_once(&self, id: &ProblemId, input: TestInput) -> Result<TestInput>;

    // Solutions
    /// Fails with `AlreadyExists` if the submitter already has a solution
    /// for the problem.
    async fn insert_solution(&self, solution: &Solution) -> Result<()>;
    async fn get_solution(&self, id: &SolutionId) -> Result<Option<Solution>>;
    /// Solutions for a problem in submission order.
    async fn list_solutions(&self, problem_id: &ProblemId) -> Result<Vec<Solution>>;
    /// Overwrites the evaluation fields. Refused once the problem is evaluated.
    async fn record_evaluation(&self, id: &SolutionId, evaluation: SolutionEvaluation) -> Result<()>;

    // Profiles
    async fn get_profile(&self, id: &ProfileId) -> Result<Option<Profile>>;
    /// Upsert. Fails with `AlreadyExists` if the wallet address belongs to
    /// another profile.
    async fn put_profile(&self, profile: &Profile) -> Result<()>;
    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    // Audit trail
    async fn append_transaction(&self, tx: &Transaction) -> Result<()>;
    async fn transaction_history(&self, profile_id: &ProfileId) -> Result<Vec<Transaction>>;
    async fn problem_transactions(&self, problem_id: &ProblemId) -> Result<Vec<Transaction>>;

    // External payout hand-off log
    async fn append_handoff(&self, record: &PayoutHandoff) -> Result<()>;
    async fn list_handoffs(&self) -> Result<Vec<PayoutHandoff>>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    async fn get_stats(&self) -> Result<StoreStats>;

    /// Persists buffered state. A no-op for backends that write through.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub problem_count: usize,
    pub open_problems: usize,
    pub evaluated_problems: usize,
    pub solution_count: usize,
    pub profile_count: usize,
    pub transaction_count: usize,
    pub handoff_count: usize,
}
