use crate::amount::{Amount, SignedAmount};
use crate::id::ProfileId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub currency: Amount,
    /// Signed and unbounded; tracks realized profit and loss.
    pub reputation: f64,
    pub total_profit: SignedAmount,
    pub is_frozen: bool,
    /// External wallet for on-chain payouts, unique across profiles.
    pub wallet_address: Option<String>,
}

impl Profile {
    pub fn new(id: ProfileId) -> Self {
        Self {
            id,
            currency: Amount::ZERO,
            reputation: 0.0,
            total_profit: SignedAmount::ZERO,
            is_frozen: false,
            wallet_address: None,
        }
    }

    pub fn with_currency(mut self, currency: Amount) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet.into());
        self
    }
}
