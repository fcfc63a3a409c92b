//! Reserve Ledger - real reserves and AMM-side balances of a pool
//!
//! ```text
//!               reserve_token  reserve_usdt  token_amm  usdt_amm
//! buy  (t, u)        -t            +u           -t         +u
//! sell (t, u)        +t            -u           +t         -u
//! ```
//!
//! The decreasing side is clamped at zero. A clamp means the virtual
//! reserves absorbed more than the recorded real delta; it is returned as a
//! [`ConsistencyFault`] so the caller can apply its policy.

use bigdecimal::BigDecimal;

use crate::ledger::types::{ConsistencyFault, FaultKind, TradeSide};
use crate::money;
use crate::pool::Pool;

/// Post-trade pool plus every clamp that was needed to produce it.
#[derive(Debug, Clone)]
pub struct ReserveUpdate {
    pub pool: Pool,
    pub faults: Vec<ConsistencyFault>,
}

pub struct ReserveLedger;

impl ReserveLedger {
    /// Apply a trade's deltas to a copy of `pool`.
    ///
    /// Metrics, version and timestamps are left for the caller.
    pub fn apply(
        pool: &Pool,
        side: TradeSide,
        token_amount: &BigDecimal,
        usdt_amount: &BigDecimal,
    ) -> ReserveUpdate {
        let mut next = pool.clone();
        let mut faults = Vec::new();

        match side {
            TradeSide::Buy => {
                next.reserve_token =
                    debit(&pool.reserve_token, token_amount, FaultKind::ReserveToken, &mut faults);
                next.reserve_usdt = &pool.reserve_usdt + usdt_amount;
                next.total_supply_token_amm = debit(
                    &pool.total_supply_token_amm,
                    token_amount,
                    FaultKind::TokenAmm,
                    &mut faults,
                );
                next.total_supply_usdt_amm = &pool.total_supply_usdt_amm + usdt_amount;
            }
            TradeSide::Sell => {
                next.reserve_token = &pool.reserve_token + token_amount;
                next.reserve_usdt =
                    debit(&pool.reserve_usdt, usdt_amount, FaultKind::ReserveUsdt, &mut faults);
                next.total_supply_token_amm = &pool.total_supply_token_amm + token_amount;
                next.total_supply_usdt_amm = debit(
                    &pool.total_supply_usdt_amm,
                    usdt_amount,
                    FaultKind::UsdtAmm,
                    &mut faults,
                );
            }
        }

        ReserveUpdate { pool: next, faults }
    }
}

fn debit(
    balance: &BigDecimal,
    amount: &BigDecimal,
    kind: FaultKind,
    faults: &mut Vec<ConsistencyFault>,
) -> BigDecimal {
    let requested = balance - amount;
    let (value, clamped) = money::clamp_non_negative(requested.clone());
    if clamped {
        faults.push(ConsistencyFault { kind, requested });
    }
    value
}
