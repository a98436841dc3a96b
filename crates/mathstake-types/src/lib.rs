//! Domain types shared by the MathStake evaluation and settlement crates.
//!
//! A [`Problem`] carries one of two solution protocols (numeric answer or
//! algorithmic cost) as a tagged union, so every consumer handles both
//! variants exhaustively. Money is fixed-point ([`Amount`], [`SignedAmount`]).

pub mod amount;
pub mod clock;
pub mod error;
pub mod handoff;
pub mod id;
pub mod input;
pub mod problem;
pub mod profile;
pub mod solution;
pub mod transaction;

pub use amount::{Amount, SignedAmount, BASE_UNIT, CURRENCY_DECIMALS};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Result, TypesError};
pub use handoff::{HandoffStatus, PayoutHandoff};
pub use id::{ProblemId, ProfileId, SolutionId, TransactionId};
pub use input::TestInput;
pub use problem::{
    AlgorithmicSpec, CodeType, Problem, ProblemStatus, SolutionProtocol, TestInputSource,
    MAX_EVALUATION_DELAY_HOURS, MAX_RANGE_COUNT, MAX_RANGE_WIDTH,
};
pub use profile::Profile;
pub use solution::{Solution, SolutionEvaluation, Submission};
pub use transaction::{Transaction, TransactionType};
