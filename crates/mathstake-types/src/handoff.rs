use crate::amount::Amount;
use crate::id::{ProfileId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Sent,
    Failed,
}

/// One attempt to settle a payout with an external wallet. Append-only; the
/// originating [`Transaction`](crate::Transaction) is never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutHandoff {
    pub transaction_id: TransactionId,
    pub profile_id: ProfileId,
    pub wallet_address: String,
    pub amount: Amount,
    pub status: HandoffStatus,
    /// Reference returned by the external system on success.
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
