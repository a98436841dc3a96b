//! Ledger applier for the MathStake market.
//!
//! Owns every balance, reputation and profit mutation. Each operation runs
//! in one storage transaction and writes exactly one audit [`Transaction`]
//! per monetary event, so per-profile transaction sums always reconcile with
//! currency changes.
//!
//! [`Transaction`]: mathstake_types::Transaction

pub mod error;
pub mod ledger;
pub mod market;
pub mod payout;

pub use error::{LedgerError, Result};
pub use ledger::{LedgerApplier, LedgerConfig, SettlementEntry, SettlementReceipt};
pub use market::NewProblem;
pub use payout::{PayoutRequest, PayoutSink};
