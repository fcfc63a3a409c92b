//! Trade fee rate
//!
//! Fees are expressed as a percent of the trade value: `0.1` = 0.10%.
//! Launch configurations usually quote basis points, so the rate can also
//! be built from bps (`10` bps = `0.1` percent).

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::money::{self, MoneyError};

/// Basis points per percent.
pub const BPS_PER_PERCENT: u32 = 100;

/// Fee rate as a percent in `[0, 100)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BigDecimal", into = "BigDecimal")]
pub struct FeeRate(BigDecimal);

impl FeeRate {
    /// Build from a percent value (`0.1` = 0.10%).
    pub fn from_percent(percent: BigDecimal) -> Result<Self, MoneyError> {
        if percent < BigDecimal::zero() {
            return Err(MoneyError::NegativeAmount);
        }
        if percent >= BigDecimal::from(100) {
            return Err(MoneyError::InvalidFormat(format!(
                "fee percent {} must be below 100",
                percent
            )));
        }
        Ok(Self(percent))
    }

    /// Build from basis points (`10` = 0.10%).
    pub fn from_bps(bps: u32) -> Result<Self, MoneyError> {
        Self::from_percent(BigDecimal::from(bps) / BigDecimal::from(BPS_PER_PERCENT))
    }

    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    pub fn percent(&self) -> &BigDecimal {
        &self.0
    }

    /// Fee charged on `amount`.
    #[inline]
    pub fn fee_on(&self, amount: &BigDecimal) -> BigDecimal {
        money::percent_of(amount, &self.0)
    }
}

impl TryFrom<BigDecimal> for FeeRate {
    type Error = MoneyError;

    fn try_from(percent: BigDecimal) -> Result<Self, Self::Error> {
        Self::from_percent(percent)
    }
}

impl From<FeeRate> for BigDecimal {
    fn from(rate: FeeRate) -> Self {
        rate.0
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_fee_on_basic() {
        // 1000 USDT * 0.10% = 1 USDT
        let rate = FeeRate::from_percent(d("0.1")).unwrap();
        assert_eq!(rate.fee_on(&d("1000e18")), d("1e18"));
    }

    #[test]
    fn test_from_bps_matches_percent() {
        let from_bps = FeeRate::from_bps(10).unwrap();
        let from_pct = FeeRate::from_percent(d("0.1")).unwrap();
        assert_eq!(from_bps.fee_on(&d("1000")), from_pct.fee_on(&d("1000")));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(FeeRate::from_percent(d("-0.1")).is_err());
        assert!(FeeRate::from_percent(d("100")).is_err());
        assert!(FeeRate::from_bps(10_000).is_err());
    }

    #[test]
    fn test_deserialize_validates_range() {
        let rate: FeeRate = serde_json::from_str("\"0.1\"").unwrap();
        assert_eq!(rate, FeeRate::from_percent(d("0.1")).unwrap());
        assert!(serde_json::from_str::<FeeRate>("\"100\"").is_err());
        assert!(serde_json::from_str::<FeeRate>("\"-1\"").is_err());
    }

    #[test]
    fn test_zero_rate() {
        assert!(FeeRate::zero().fee_on(&d("123")).is_zero());
    }
}
