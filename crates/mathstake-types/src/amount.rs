use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

pub const CURRENCY_DECIMALS: u32 = 6;
pub const BASE_UNIT: u64 = 1_000_000; // 10^6

/// Non-negative currency amount in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Converts a decimal value, rounding to the nearest base unit.
    /// Negative and non-finite values map to zero.
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        let units = (value * BASE_UNIT as f64).round();
        if units >= u64::MAX as f64 {
            Self(u64::MAX)
        } else {
            Self(units as u64)
        }
    }

    pub fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / BASE_UNIT as f64
    }

    pub fn to_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Signed view of this amount, used for ledger entries.
    pub fn to_signed(&self) -> SignedAmount {
        SignedAmount(i64::try_from(self.0).unwrap_or(i64::MAX))
    }

    /// Negated signed view (a debit of this amount).
    pub fn to_debit(&self) -> SignedAmount {
        SignedAmount(-(i64::try_from(self.0).unwrap_or(i64::MAX)))
    }

    /// `self - other` as a signed amount.
    pub fn signed_diff(&self, other: Self) -> SignedAmount {
        let diff = self.0 as i128 - other.0 as i128;
        SignedAmount(diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc.saturating_add(a))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_decimal())
    }
}

/// Signed currency amount in base units (net profit/loss, ledger entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SignedAmount(i64);

impl SignedAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() {
            return Self::ZERO;
        }
        let units = (value * BASE_UNIT as f64).round();
        Self(units.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
    }

    pub fn from_units(units: i64) -> Self {
        Self(units)
    }

    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / BASE_UNIT as f64
    }

    pub fn to_units(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Magnitude as an unsigned amount.
    pub fn magnitude(&self) -> Amount {
        Amount(self.0.unsigned_abs())
    }

    /// Applies this delta to a balance, failing if the result would be negative.
    pub fn apply_to(&self, balance: Amount) -> Option<Amount> {
        if self.0 >= 0 {
            balance.checked_add(Amount(self.0 as u64))
        } else {
            balance.checked_sub(Amount(self.0.unsigned_abs()))
        }
    }
}

impl Sum for SignedAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc.saturating_add(a))
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.6}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_conversion() {
        let a = Amount::from_decimal(12.5);
        assert_eq!(a.to_units(), 12_500_000);
        assert_eq!(a.to_decimal(), 12.5);
        assert_eq!(Amount::from_decimal(-3.0), Amount::ZERO);
        assert_eq!(Amount::from_decimal(f64::NAN), Amount::ZERO);
    }

    #[test]
    fn test_signed_diff() {
        let payout = Amount::from_decimal(4.0);
        let stake = Amount::from_decimal(10.0);
        let net = payout.signed_diff(stake);
        assert_eq!(net, SignedAmount::from_decimal(-6.0));
        assert!(net.is_negative());
        assert_eq!(net.magnitude(), Amount::from_decimal(6.0));
    }

    #[test]
    fn test_apply_to_balance() {
        let balance = Amount::from_decimal(5.0);
        assert_eq!(
            SignedAmount::from_decimal(2.0).apply_to(balance),
            Some(Amount::from_decimal(7.0))
        );
        assert_eq!(
            SignedAmount::from_decimal(-5.0).apply_to(balance),
            Some(Amount::ZERO)
        );
        assert_eq!(SignedAmount::from_decimal(-5.5).apply_to(balance), None);
    }

    #[test]
    fn test_sum() {
        let total: Amount = [1.0, 2.0, 3.5].iter().map(|v| Amount::from_decimal(*v)).sum();
        assert_eq!(total, Amount::from_decimal(6.5));
    }
}
