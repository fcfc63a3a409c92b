//! Pool record and lifecycle state

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{Address, PoolId};
use crate::fee::FeeRate;
use crate::ledger::error::LedgerError;
use crate::money;

/// Pool lifecycle state
///
/// State IDs are stored as SMALLINT. `Graduated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum PoolStatus {
    /// Bonding-curve pricing is authoritative
    Active = 0,
    /// External liquidity-pool pricing has taken over
    Graduated = 10,
}

impl PoolStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PoolStatus::Active),
            10 => Some(PoolStatus::Graduated),
            _ => None,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PoolStatus::Graduated)
    }

    /// Only `Active -> Graduated` is legal.
    pub fn can_transition_to(&self, next: PoolStatus) -> bool {
        matches!((self, next), (PoolStatus::Active, PoolStatus::Graduated))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Active => "ACTIVE",
            PoolStatus::Graduated => "GRADUATED",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display metrics derived from AMM-side balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub price_realtime: BigDecimal,
    pub market_cap: BigDecimal,
    pub bonding_curve_percentage: BigDecimal,
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self {
            price_realtime: BigDecimal::zero(),
            market_cap: BigDecimal::zero(),
            bonding_curve_percentage: BigDecimal::zero(),
        }
    }
}

/// Parameters fixed at mint time.
#[derive(Debug, Clone)]
pub struct NewPool {
    pub token_address: Address,
    pub virtual_reserve_token: BigDecimal,
    pub virtual_reserve_usdt: BigDecimal,
    /// Real token inventory deposited on the curve at mint (usually zero)
    pub initial_reserve_token: BigDecimal,
    pub total_supply: BigDecimal,
    pub trade_fee: FeeRate,
}

/// Persisted per-pool reserve and state record.
///
/// # Invariants
/// - `reserve_token`, `reserve_usdt`, `total_supply_token_amm`,
///   `total_supply_usdt_amm` are never negative
/// - virtual reserves, `k_constant` and `total_supply` never change after mint
/// - `version` increments on every committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub token_address: Address,
    pub reserve_token: BigDecimal,
    pub reserve_usdt: BigDecimal,
    pub virtual_reserve_token: BigDecimal,
    pub virtual_reserve_usdt: BigDecimal,
    pub k_constant: BigDecimal,
    pub total_supply: BigDecimal,
    pub total_supply_token_amm: BigDecimal,
    pub total_supply_usdt_amm: BigDecimal,
    pub trade_fee: FeeRate,
    pub metrics: PoolMetrics,
    pub price_change_24h: Option<BigDecimal>,
    pub status: PoolStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub graduated_at: Option<DateTime<Utc>>,
}

impl Pool {
    /// Mint a new pool: no real USDT, the whole supply held by the curve.
    ///
    /// Metrics are left at their defaults; the caller derives them.
    pub fn mint(params: NewPool, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        if !money::is_positive(&params.virtual_reserve_token)
            || !money::is_positive(&params.virtual_reserve_usdt)
        {
            return Err(LedgerError::InvalidPoolParams(
                "virtual reserves must be positive".into(),
            ));
        }
        if !money::is_positive(&params.total_supply) {
            return Err(LedgerError::InvalidPoolParams(
                "total supply must be positive".into(),
            ));
        }

        if params.initial_reserve_token < BigDecimal::zero() {
            return Err(LedgerError::InvalidPoolParams(
                "initial token reserve must not be negative".into(),
            ));
        }

        let k_constant = (&params.initial_reserve_token + &params.virtual_reserve_token)
            * &params.virtual_reserve_usdt;

        Ok(Self {
            id: PoolId::new(),
            token_address: params.token_address,
            reserve_token: params.initial_reserve_token,
            reserve_usdt: BigDecimal::zero(),
            total_supply_token_amm: params.total_supply.clone(),
            total_supply_usdt_amm: params.virtual_reserve_usdt.clone(),
            virtual_reserve_token: params.virtual_reserve_token,
            virtual_reserve_usdt: params.virtual_reserve_usdt,
            k_constant,
            total_supply: params.total_supply,
            trade_fee: params.trade_fee,
            metrics: PoolMetrics::default(),
            price_change_24h: None,
            status: PoolStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
            graduated_at: None,
        })
    }

    /// Real + virtual token reserve
    #[inline]
    pub fn effective_reserve_token(&self) -> BigDecimal {
        &self.reserve_token + &self.virtual_reserve_token
    }

    /// Real + virtual USDT reserve
    #[inline]
    pub fn effective_reserve_usdt(&self) -> BigDecimal {
        &self.reserve_usdt + &self.virtual_reserve_usdt
    }

    #[inline]
    pub fn is_graduated(&self) -> bool {
        self.status == PoolStatus::Graduated
    }

    /// Address of the synthetic holder carrying unsold curve supply.
    #[inline]
    pub fn curve_holder(&self) -> &Address {
        &self.token_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn params() -> NewPool {
        NewPool {
            token_address: Address::parse("0x1111111111111111111111111111111111111111").unwrap(),
            virtual_reserve_token: d("1888888888e18"),
            virtual_reserve_usdt: d("100000e18"),
            initial_reserve_token: BigDecimal::zero(),
            total_supply: d("1000000000e18"),
            trade_fee: FeeRate::from_percent(d("0.1")).unwrap(),
        }
    }

    #[test]
    fn test_mint_initial_state() {
        let pool = Pool::mint(params(), Utc::now()).unwrap();
        assert!(pool.reserve_token.is_zero());
        assert!(pool.reserve_usdt.is_zero());
        assert_eq!(pool.k_constant, d("1888888888e18") * d("100000e18"));
        assert_eq!(pool.total_supply_token_amm, pool.total_supply);
        assert_eq!(pool.effective_reserve_token(), d("1888888888e18"));
        assert_eq!(pool.status, PoolStatus::Active);
        assert_eq!(pool.version, 0);
    }

    #[test]
    fn test_mint_with_seeded_inventory() {
        let mut p = params();
        p.initial_reserve_token = d("800000000e18");
        let pool = Pool::mint(p, Utc::now()).unwrap();
        assert_eq!(pool.reserve_token, d("800000000e18"));
        assert_eq!(
            pool.k_constant,
            (d("800000000e18") + d("1888888888e18")) * d("100000e18")
        );
    }

    #[test]
    fn test_mint_rejects_bad_params() {
        let mut p = params();
        p.virtual_reserve_usdt = BigDecimal::zero();
        assert!(matches!(
            Pool::mint(p, Utc::now()),
            Err(LedgerError::InvalidPoolParams(_))
        ));

        let mut p = params();
        p.total_supply = d("-1");
        assert!(Pool::mint(p, Utc::now()).is_err());

        let mut p = params();
        p.initial_reserve_token = d("-1");
        assert!(Pool::mint(p, Utc::now()).is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(PoolStatus::Active.can_transition_to(PoolStatus::Graduated));
        assert!(!PoolStatus::Graduated.can_transition_to(PoolStatus::Active));
        assert!(!PoolStatus::Graduated.can_transition_to(PoolStatus::Graduated));
        assert!(PoolStatus::Graduated.is_terminal());
    }

    #[test]
    fn test_status_id_roundtrip() {
        for status in [PoolStatus::Active, PoolStatus::Graduated] {
            assert_eq!(PoolStatus::from_id(status.id()), Some(status));
        }
        assert!(PoolStatus::from_id(99).is_none());
    }
}
