//! Pool arithmetic. Pure: no storage, no clock, no execution.

use crate::error::{Result, SettlementError};
use mathstake_types::{Amount, ProfileId, SignedAmount, SolutionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measured result of one solution, ready for payout computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSolution {
    pub solution_id: SolutionId,
    pub submitter: ProfileId,
    pub stake: Amount,
    /// `f64::INFINITY` for a solution without a valid result.
    pub cost: f64,
    pub execution_time_ms: u64,
}

impl ScoredSolution {
    pub fn is_perfect(&self) -> bool {
        self.cost == 0.0
    }
}

/// Which rule decided the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutBranch {
    /// At least one zero-cost solution; perfect solutions share the pool.
    Perfect,
    /// Shares proportional to effective stake over cost.
    Scored,
    /// Every score was zero; the pool is split evenly.
    EqualSplit,
}

impl fmt::Display for PayoutBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayoutBranch::Perfect => "perfect",
            PayoutBranch::Scored => "scored",
            PayoutBranch::EqualSplit => "equal_split",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutShare {
    pub solution_id: SolutionId,
    pub submitter: ProfileId,
    pub stake: Amount,
    pub effective_stake: f64,
    /// Credited back from the pool.
    pub gross: Amount,
    /// `gross - stake`.
    pub net: SignedAmount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutPlan {
    pub pool: Amount,
    pub branch: PayoutBranch,
    /// Same order as the input solutions.
    pub shares: Vec<PayoutShare>,
}

impl PayoutPlan {
    pub fn total_gross(&self) -> Amount {
        self.shares.iter().map(|s| s.gross).sum()
    }
}

/// `max(0, stake - execution_time_ms * penalty_per_ms)`, in currency units.
pub fn effective_stake(stake: Amount, execution_time_ms: u64, penalty_per_ms: f64) -> f64 {
    let penalty = if penalty_per_ms.is_finite() && penalty_per_ms > 0.0 {
        execution_time_ms as f64 * penalty_per_ms
    } else {
        0.0
    };
    (stake.to_decimal() - penalty).max(0.0)
}

/// Splits `bounty + Σ stake` over the solutions.
///
/// If any solution has zero cost, perfect solutions share the pool in
/// proportion to effective stake (evenly if those are all zero) and the rest
/// get nothing. Otherwise each solution scores `effective_stake / cost`
/// (zero for an infinite cost) and the pool is split by score, or evenly
/// across all solutions if every score is zero. A cost so small that the
/// score overflows puts that solution ahead of every finite score.
///
/// Shares are floored to base units and the remainder goes to the largest
/// share (the first one on ties), so the gross payouts always sum to the
/// pool exactly.
pub fn compute_payouts(
    bounty: Amount,
    penalty_per_ms: f64,
    solutions: &[ScoredSolution],
) -> Result<PayoutPlan> {
    if solutions.is_empty() {
        return Err(SettlementError::InvalidSettlement(
            "no solutions to settle".into(),
        ));
    }

    let pool = solutions
        .iter()
        .try_fold(bounty, |acc, s| acc.checked_add(s.stake))
        .ok_or_else(|| SettlementError::InvalidSettlement("pool overflows".into()))?;

    let effective: Vec<f64> = solutions
        .iter()
        .map(|s| effective_stake(s.stake, s.execution_time_ms, penalty_per_ms))
        .collect();

    let any_perfect = solutions.iter().any(ScoredSolution::is_perfect);
    let (branch, weights) = if any_perfect {
        let weights: Vec<f64> = solutions
            .iter()
            .zip(&effective)
            .map(|(s, eff)| if s.is_perfect() { *eff } else { 0.0 })
            .collect();
        if weights.iter().sum::<f64>() > 0.0 {
            (PayoutBranch::Perfect, weights)
        } else {
            let even = solutions
                .iter()
                .map(|s| if s.is_perfect() { 1.0 } else { 0.0 })
                .collect();
            (PayoutBranch::Perfect, even)
        }
    } else {
        let scores: Vec<f64> = solutions
            .iter()
            .zip(&effective)
            .map(|(s, eff)| {
                if s.cost.is_finite() && s.cost > 0.0 {
                    eff / s.cost
                } else {
                    0.0
                }
            })
            .collect();
        let max_score = scores.iter().copied().fold(0.0, f64::max);
        if max_score.is_infinite() {
            // Cost too close to zero to divide by: those solutions rank as
            // near-perfect and share the pool by effective stake.
            let weights = scores
                .iter()
                .zip(&effective)
                .map(|(score, eff)| if score.is_infinite() { *eff } else { 0.0 })
                .collect();
            (PayoutBranch::Scored, weights)
        } else if max_score > 0.0 {
            // Normalised so the sum of scores cannot overflow.
            let weights = scores.iter().map(|score| score / max_score).collect();
            (PayoutBranch::Scored, weights)
        } else {
            (PayoutBranch::EqualSplit, vec![1.0; solutions.len()])
        }
    };

    let grosses = distribute(pool.to_units(), &weights);

    let shares = solutions
        .iter()
        .zip(effective)
        .zip(grosses)
        .map(|((s, effective_stake), units)| {
            let gross = Amount::from_units(units);
            PayoutShare {
                solution_id: s.solution_id,
                submitter: s.submitter,
                stake: s.stake,
                effective_stake,
                gross,
                net: gross.signed_diff(s.stake),
            }
        })
        .collect();

    Ok(PayoutPlan {
        pool,
        branch,
        shares,
    })
}

/// Floors each proportional share and settles the rounding difference on
/// the largest share. `weights` must have a positive finite sum.
fn distribute(pool: u64, weights: &[f64]) -> Vec<u64> {
    let mut shares = vec![0u64; weights.len()];
    let positive: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > 0.0).collect();
    let Some(&first) = positive.first() else {
        return shares;
    };

    // Equal weights split in integers so ties stay exact.
    if positive.iter().all(|&i| weights[i] == weights[first]) {
        let n = positive.len() as u64;
        for &i in &positive {
            shares[i] = pool / n;
        }
        shares[first] += pool % n;
        return shares;
    }

    let total: f64 = weights.iter().sum();
    for &i in &positive {
        let share = (pool as f64 * (weights[i] / total)).floor();
        shares[i] = if share.is_finite() && share > 0.0 {
            (share as u64).min(pool)
        } else {
            0
        };
    }

    // First index among the largest weights.
    let largest = positive
        .iter()
        .copied()
        .fold(first, |best, i| if weights[i] > weights[best] { i } else { best });

    let assigned: u128 = shares.iter().map(|s| *s as u128).sum();
    let pool_wide = pool as u128;
    if assigned <= pool_wide {
        shares[largest] += (pool_wide - assigned) as u64;
    } else {
        let mut excess = (assigned - pool_wide) as u64;
        for i in std::iter::once(largest).chain(positive.iter().copied()) {
            let take = excess.min(shares[i]);
            shares[i] -= take;
            excess -= take;
            if excess == 0 {
                break;
            }
        }
    }
    shares
}
