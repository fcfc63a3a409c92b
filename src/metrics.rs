//! Metrics Deriver - display metrics from AMM-side balances
//!
//! ```text
//! price_realtime           = usdt_amm / token_amm            (0 if token_amm == 0)
//! circulating              = |total_supply - token_amm|
//! market_cap               = see MarketCapPolicy
//! bonding_curve_percentage = clamp(100 - token_amm / total_supply * 100, 0, 100)
//! ```

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::money::{self, DEFAULT_PRECISION};
use crate::pool::{Pool, PoolMetrics};

/// How `market_cap` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCapPolicy {
    /// Circulating supply × price while active. Once graduated the last
    /// persisted value is kept: external pricing is authoritative.
    #[default]
    CirculatingWhileActive,
    /// Circulating supply × price regardless of status.
    AlwaysCirculating,
    /// Total supply × price.
    FullyDiluted,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsDeriver {
    precision: u64,
    market_cap_policy: MarketCapPolicy,
}

impl Default for MetricsDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION, MarketCapPolicy::default())
    }
}

impl MetricsDeriver {
    pub fn new(precision: u64, market_cap_policy: MarketCapPolicy) -> Self {
        Self {
            precision,
            market_cap_policy,
        }
    }

    pub fn derive_metrics(&self, pool: &Pool) -> PoolMetrics {
        let price_realtime = money::div_or_zero(
            &pool.total_supply_usdt_amm,
            &pool.total_supply_token_amm,
            self.precision,
        );

        let circulating = (&pool.total_supply - &pool.total_supply_token_amm).abs();
        let market_cap = match self.market_cap_policy {
            MarketCapPolicy::CirculatingWhileActive if pool.is_graduated() => {
                pool.metrics.market_cap.clone()
            }
            MarketCapPolicy::CirculatingWhileActive | MarketCapPolicy::AlwaysCirculating => {
                &circulating * &price_realtime
            }
            MarketCapPolicy::FullyDiluted => &pool.total_supply * &price_realtime,
        };

        let hundred = BigDecimal::from(100);
        let remaining_pct =
            money::div_or_zero(&pool.total_supply_token_amm, &pool.total_supply, self.precision)
                * &hundred;
        let bonding_curve_percentage =
            money::clamp(&hundred - remaining_pct, &BigDecimal::zero(), &hundred);

        PoolMetrics {
            price_realtime,
            market_cap,
            bonding_curve_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Address;
    use crate::fee::FeeRate;
    use crate::pool::{NewPool, PoolStatus};
    use chrono::Utc;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn pool() -> Pool {
        Pool::mint(
            NewPool {
                token_address: Address::parse("0x3333333333333333333333333333333333333333")
                    .unwrap(),
                virtual_reserve_token: d("1000"),
                virtual_reserve_usdt: d("100"),
                initial_reserve_token: BigDecimal::zero(),
                total_supply: d("1000"),
                trade_fee: FeeRate::zero(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_pool_metrics() {
        let m = MetricsDeriver::default().derive_metrics(&pool());
        assert_eq!(m.price_realtime, d("0.1"));
        assert!(m.market_cap.is_zero());
        assert!(m.bonding_curve_percentage.is_zero());
    }

    #[test]
    fn test_metrics_after_sales() {
        let mut p = pool();
        p.total_supply_token_amm = d("750");
        p.total_supply_usdt_amm = d("150");
        let m = MetricsDeriver::default().derive_metrics(&p);
        assert_eq!(m.price_realtime, d("0.2"));
        // 250 circulating * 0.2
        assert_eq!(m.market_cap, d("50"));
        assert_eq!(m.bonding_curve_percentage, d("25"));
    }

    #[test]
    fn test_zero_token_amm_gives_zero_price() {
        let mut p = pool();
        p.total_supply_token_amm = BigDecimal::zero();
        let m = MetricsDeriver::default().derive_metrics(&p);
        assert!(m.price_realtime.is_zero());
        assert!(m.market_cap.is_zero());
        assert_eq!(m.bonding_curve_percentage, d("100"));
    }

    #[test]
    fn test_percentage_clamped() {
        let mut p = pool();
        // AMM holds more than the supply (bad data): percentage floors at 0
        p.total_supply_token_amm = d("1200");
        let m = MetricsDeriver::default().derive_metrics(&p);
        assert!(m.bonding_curve_percentage.is_zero());
    }

    #[test]
    fn test_market_cap_policies() {
        let mut p = pool();
        p.total_supply_token_amm = d("750");
        p.total_supply_usdt_amm = d("150");
        p.status = PoolStatus::Graduated;
        p.metrics.market_cap = d("42");

        let frozen = MetricsDeriver::new(50, MarketCapPolicy::CirculatingWhileActive);
        assert_eq!(frozen.derive_metrics(&p).market_cap, d("42"));

        let always = MetricsDeriver::new(50, MarketCapPolicy::AlwaysCirculating);
        assert_eq!(always.derive_metrics(&p).market_cap, d("50"));

        let fdv = MetricsDeriver::new(50, MarketCapPolicy::FullyDiluted);
        assert_eq!(fdv.derive_metrics(&p).market_cap, d("200"));
    }
}
