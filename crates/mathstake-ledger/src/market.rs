use crate::error::{LedgerError, Result};
use crate::ledger::{LedgerApplier, Posting};
use chrono::{DateTime, Utc};
use mathstake_gate::ValidationReport;
use mathstake_storage::StorageError;
use mathstake_types::{
    Amount, CodeType, Problem, ProblemId, ProblemStatus, Profile, ProfileId, SignedAmount,
    Solution, SolutionProtocol, Submission, TestInputSource, Transaction, TransactionType,
};
use tracing::info;

/// Parameters for a new problem.
#[derive(Debug, Clone)]
pub struct NewProblem {
    pub creator: ProfileId,
    pub description: String,
    pub protocol: SolutionProtocol,
    pub bounty: Amount,
    pub deadline: DateTime<Utc>,
}

fn rejected(report: ValidationReport) -> LedgerError {
    LedgerError::ValidationRejected {
        severity: report.severity,
        issues: report.issues,
    }
}

impl LedgerApplier {
    /// Creates an empty profile. Fails if the id or wallet is taken.
    pub async fn create_profile(
        &self,
        id: ProfileId,
        wallet_address: Option<String>,
    ) -> Result<Profile> {
        if self.store.get_profile(&id).await?.is_some() {
            return Err(LedgerError::InvalidState(format!("profile {} already exists", id)));
        }
        let mut profile = Profile::new(id);
        profile.wallet_address = wallet_address;
        self.store.put_profile(&profile).await?;
        info!(profile_id = %id, "👤 Profile created");
        Ok(profile)
    }

    pub async fn set_frozen(&self, id: &ProfileId, frozen: bool) -> Result<Profile> {
        self.atomically("set_frozen", async {
            let mut profile = self.load_profile(id).await?;
            profile.is_frozen = frozen;
            self.store.put_profile(&profile).await?;
            Ok(profile)
        })
        .await
    }

    pub async fn deposit(&self, profile_id: &ProfileId, amount: Amount) -> Result<Transaction> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("deposit must be positive".into()));
        }
        let tx = self
            .atomically(
                "deposit",
                self.post(Posting {
                    profile_id: *profile_id,
                    tx_type: TransactionType::Deposit,
                    amount: amount.to_signed(),
                    problem_id: None,
                    solution_id: None,
                    description: format!("Deposit of {}", amount),
                }),
            )
            .await?;
        info!(profile_id = %profile_id, amount = amount.to_decimal(), "💵 Deposit credited");
        Ok(tx)
    }

    /// Signed manual correction. Cannot take a balance below zero.
    pub async fn admin_adjustment(
        &self,
        profile_id: &ProfileId,
        delta: SignedAmount,
        reason: &str,
    ) -> Result<Transaction> {
        if delta == SignedAmount::ZERO {
            return Err(LedgerError::InvalidAmount("adjustment must be non-zero".into()));
        }
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidState("adjustment needs a reason".into()));
        }
        let tx = self
            .atomically(
                "admin_adjustment",
                self.post(Posting {
                    profile_id: *profile_id,
                    tx_type: TransactionType::AdminAdjustment,
                    amount: delta,
                    problem_id: None,
                    solution_id: None,
                    description: format!("Admin adjustment: {}", reason.trim()),
                }),
            )
            .await?;
        info!(profile_id = %profile_id, delta = delta.to_decimal(), reason, "🛠️ Admin adjustment applied");
        Ok(tx)
    }

    /// Validates the problem and its code, then locks the bounty.
    pub async fn create_problem(&self, new: NewProblem) -> Result<Problem> {
        let now = self.now();
        let problem = Problem {
            id: problem_id_for(&new, now),
            creator: new.creator,
            description: new.description,
            protocol: new.protocol,
            bounty: new.bounty,
            deadline: new.deadline,
            status: ProblemStatus::Open,
            test_input: None,
            created_at: now,
            claimed_at: None,
            evaluated_at: None,
        };
        problem.validate()?;
        if problem.deadline <= now {
            return Err(LedgerError::DeadlinePassed(format!(
                "deadline {} is not in the future",
                problem.deadline
            )));
        }

        let creator = self.load_profile(&problem.creator).await?;
        if creator.is_frozen {
            return Err(LedgerError::Frozen(creator.id.to_string()));
        }

        if let SolutionProtocol::Algorithmic(spec) = &problem.protocol {
            let report = self
                .gate
                .validate(&spec.cost_function, CodeType::CostFunction)
                .await;
            if !report.is_valid {
                return Err(rejected(report));
            }
            if let TestInputSource::Custom { generator_code } = &spec.test_input {
                let report = self
                    .gate
                    .validate(generator_code, CodeType::TestInputGenerator)
                    .await;
                if !report.is_valid {
                    return Err(rejected(report));
                }
            }
        }

        self.atomically("create_problem", async {
            self.post(Posting {
                profile_id: problem.creator,
                tx_type: TransactionType::BountyLock,
                amount: problem.bounty.to_debit(),
                problem_id: Some(problem.id),
                solution_id: None,
                description: format!("Bounty locked for problem {}", problem.id.short()),
            })
            .await?;
            self.store.insert_problem(&problem).await.map_err(|e| match e {
                StorageError::AlreadyExists(what) => LedgerError::InvalidState(what),
                other => other.into(),
            })?;
            Ok(())
        })
        .await?;

        info!(
            problem_id = %problem.id,
            creator = %problem.creator,
            protocol = problem.protocol.name(),
            bounty = problem.bounty.to_decimal(),
            deadline = %problem.deadline,
            "📌 Problem created"
        );
        Ok(problem)
    }

    /// Gates the submission, enforces the market rules and locks the stake.
    pub async fn submit_solution(
        &self,
        problem_id: &ProblemId,
        submitter: &ProfileId,
        submission: Submission,
        stake: Amount,
    ) -> Result<Solution> {
        let now = self.now();
        let problem = self
            .store
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("problem {}", problem_id)))?;

        if problem.status != ProblemStatus::Open {
            return Err(LedgerError::InvalidState(format!(
                "problem {} is {}",
                problem_id, problem.status
            )));
        }
        if !problem.accepts_submissions(now) {
            return Err(LedgerError::DeadlinePassed(format!(
                "problem {} closed at {}",
                problem_id, problem.deadline
            )));
        }
        if problem.creator == *submitter {
            return Err(LedgerError::InvalidState(
                "creators cannot solve their own problem".into(),
            ));
        }
        if !submission.matches(&problem.protocol) {
            return Err(LedgerError::ProtocolMismatch(format!(
                "problem {} expects a {} submission",
                problem_id,
                problem.protocol.name()
            )));
        }

        let profile = self.load_profile(submitter).await?;
        if profile.is_frozen {
            return Err(LedgerError::Frozen(submitter.to_string()));
        }

        let solution = Solution::new(*problem_id, *submitter, submission, stake, now);
        solution.validate()?;

        if let Submission::Algorithm { code } = &solution.submission {
            let report = self.gate.validate(code, CodeType::Algorithm).await;
            if !report.is_valid {
                return Err(rejected(report));
            }
        }

        self.atomically("submit_solution", async {
            self.store.insert_solution(&solution).await.map_err(|e| match e {
                StorageError::AlreadyExists(what) => LedgerError::DuplicateSolution(what),
                other => other.into(),
            })?;
            self.post(Posting {
                profile_id: *submitter,
                tx_type: TransactionType::StakeLock,
                amount: stake.to_debit(),
                problem_id: Some(*problem_id),
                solution_id: Some(solution.id),
                description: format!("Stake locked on problem {}", problem_id.short()),
            })
            .await?;
            Ok(())
        })
        .await?;

        info!(
            problem_id = %problem_id,
            solution_id = %solution.id,
            submitter = %submitter,
            stake = stake.to_decimal(),
            "📝 Solution submitted"
        );
        Ok(solution)
    }

    /// Administrative cancellation before evaluation: bounty back to the
    /// creator, every stake back to its submitter. Terminal.
    pub async fn invalidate_problem(&self, problem_id: &ProblemId, reason: &str) -> Result<Problem> {
        let problem = self
            .atomically("invalidate_problem", async {
                let problem = self
                    .store
                    .get_problem(problem_id)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound(format!("problem {}", problem_id)))?;

                match problem.status {
                    ProblemStatus::Open | ProblemStatus::Closed => {}
                    ProblemStatus::Evaluating => {
                        return Err(LedgerError::ConcurrencyConflict(format!(
                            "problem {} is being evaluated",
                            problem_id
                        )))
                    }
                    status => {
                        return Err(LedgerError::InvalidState(format!(
                            "problem {} is already {}",
                            problem_id, status
                        )))
                    }
                }

                self.post(Posting {
                    profile_id: problem.creator,
                    tx_type: TransactionType::BountyReturn,
                    amount: problem.bounty.to_signed(),
                    problem_id: Some(*problem_id),
                    solution_id: None,
                    description: format!("Problem {} invalidated: {}", problem_id.short(), reason),
                })
                .await?;

                for solution in self.store.list_solutions(problem_id).await? {
                    self.post(Posting {
                        profile_id: solution.submitter,
                        tx_type: TransactionType::StakeReturn,
                        amount: solution.stake.to_signed(),
                        problem_id: Some(*problem_id),
                        solution_id: Some(solution.id),
                        description: format!("Stake returned: problem {} invalidated", problem_id.short()),
                    })
                    .await?;
                }

                let updated = self
                    .store
                    .transition_problem(
                        problem_id,
                        problem.status,
                        ProblemStatus::Invalidated,
                        self.now(),
                    )
                    .await?;
                Ok(updated)
            })
            .await?;

        info!(problem_id = %problem_id, reason, "🚫 Problem invalidated, funds returned");
        Ok(problem)
    }
}

fn problem_id_for(new: &NewProblem, now: DateTime<Utc>) -> ProblemId {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(new.creator.as_bytes());
    seed.extend_from_slice(new.description.as_bytes());
    seed.extend_from_slice(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    ProblemId::new(&seed)
}
