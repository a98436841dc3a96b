use crate::amount::SignedAmount;
use crate::id::{ProblemId, ProfileId, SolutionId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    StakeLock,
    StakeReturn,
    BountyLock,
    BountyReturn,
    Payout,
    ReputationChange,
    AdminAdjustment,
    Deposit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StakeLock => "stake_lock",
            Self::StakeReturn => "stake_return",
            Self::BountyLock => "bounty_lock",
            Self::BountyReturn => "bounty_return",
            Self::Payout => "payout",
            Self::ReputationChange => "reputation_change",
            Self::AdminAdjustment => "admin_adjustment",
            Self::Deposit => "deposit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub profile_id: ProfileId,
    pub tx_type: TransactionType,
    /// Signed change to the profile's currency.
    pub amount: SignedAmount,
    pub problem_id: Option<ProblemId>,
    pub solution_id: Option<SolutionId>,
    pub description: String,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        profile_id: ProfileId,
        tx_type: TransactionType,
        amount: SignedAmount,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let description = description.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(profile_id.as_bytes());
        hasher.update(tx_type.as_str().as_bytes());
        hasher.update(&amount.to_units().to_le_bytes());
        hasher.update(description.as_bytes());
        hasher.update(&created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        Self {
            id: TransactionId::from_bytes(hasher.finalize().into()),
            profile_id,
            tx_type,
            amount,
            problem_id: None,
            solution_id: None,
            description,
            external_ref: None,
            created_at,
        }
    }

    pub fn for_problem(mut self, problem_id: ProblemId) -> Self {
        self.problem_id = Some(problem_id);
        self.rehash();
        self
    }

    pub fn for_solution(mut self, solution_id: SolutionId) -> Self {
        self.solution_id = Some(solution_id);
        self.rehash();
        self
    }

    // Links are part of the identity; two payouts in one pass must not collide.
    fn rehash(&mut self) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id.as_bytes());
        if let Some(p) = &self.problem_id {
            hasher.update(p.as_bytes());
        }
        if let Some(s) = &self.solution_id {
            hasher.update(s.as_bytes());
        }
        self.id = TransactionId::from_bytes(hasher.finalize().into());
    }
}
