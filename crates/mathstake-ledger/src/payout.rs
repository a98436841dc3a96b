use crate::error::Result;
use async_trait::async_trait;
use mathstake_types::{Amount, ProfileId, TransactionId};
use serde::{Deserialize, Serialize};

/// A committed payout offered to an external settlement system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub profile_id: ProfileId,
    pub wallet_address: String,
    pub amount: Amount,
    /// The `payout` transaction this hand-off settles.
    pub transaction_id: TransactionId,
}

/// Receives positive payouts for profiles with a linked wallet, after the
/// settlement has committed. Returns the external reference on success.
///
/// A failure is recorded in the hand-off log and never rolls back the
/// settlement.
#[async_trait]
pub trait PayoutSink: Send + Sync {
    async fn send_payout(&self, request: &PayoutRequest) -> Result<String>;
}
