//! Pricing Engine - constant-product (x·y=k) bonding-curve quotes
//!
//! Pure functions over a [`Pool`] snapshot. Nothing here touches storage.
//!
//! # Formulas
//!
//! With effective reserves `Rt = real + virtual` (token) and `Ru` (USDT),
//! and `k = Rt * Ru` recomputed from the current reserves:
//!
//! ```text
//! buy:  fee = in * f / 100        sell: newRt  = Rt + in
//!       net = in - fee                  newRu  = k / newRt
//!       newRu = Ru + net                gross  = Ru - newRu
//!       newRt = k / newRu               fee    = gross * f / 100
//!       out = Rt - newRt                out    = gross - fee
//! ```
//!
//! The fee is taken before the curve step on buys and after it on sells, so
//! fees never feed back into `k`.
//!
//! # Precision
//! Reserves are ~1e18-scaled, so the subtraction `Rt - newRt` loses
//! everything below the division precision. When a legitimate trade rounds
//! to exactly zero the quote falls back to the linear approximation
//! `out ≈ net / Ru * Rt` and is flagged `approximate`.

use bigdecimal::{BigDecimal, One, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::PoolId;
use crate::money::{self, DEFAULT_PRECISION};
use crate::pool::Pool;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Trade amount must be positive")]
    NonPositiveAmount,

    #[error("Pool {0} has graduated")]
    PoolGraduated(PoolId),

    #[error("Pool has no effective reserves")]
    EmptyReserves,

    #[error("Trade rounds to zero even under linear approximation")]
    PrecisionUnderflow,
}

/// Result of pricing a buy (USDT in, tokens out)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub tokens_out: BigDecimal,
    pub fee: BigDecimal,
    pub usdt_in_after_fee: BigDecimal,
    /// Percent growth of the USDT reserve
    pub price_impact: BigDecimal,
    /// Linear fallback was used
    pub approximate: bool,
}

/// Result of pricing a sell (tokens in, USDT out)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    pub usdt_out: BigDecimal,
    pub fee: BigDecimal,
    pub usdt_out_before_fee: BigDecimal,
    /// Percent shrink of the USDT reserve
    pub price_impact: BigDecimal,
    pub approximate: bool,
}

/// Stateless bonding-curve pricer; only carries the division precision.
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    precision: u64,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

impl PricingEngine {
    pub fn new(precision: u64) -> Self {
        Self {
            precision: precision.max(money::MIN_PRECISION),
        }
    }

    pub fn precision(&self) -> u64 {
        self.precision
    }

    /// Quote buying tokens with `usdt_in` (gross, fee included).
    pub fn quote_buy(&self, pool: &Pool, usdt_in: &BigDecimal) -> Result<BuyQuote, PricingError> {
        let (rt, ru) = Self::tradable_reserves(pool, usdt_in)?;

        // FeeRate stays below 100%, so a positive input keeps a positive net
        let fee = pool.trade_fee.fee_on(usdt_in);
        let usdt_in_after_fee = usdt_in - &fee;

        let k = &rt * &ru;
        let new_ru = &ru + &usdt_in_after_fee;
        let new_rt = self.div(&k, &new_ru)?;

        let mut tokens_out = &rt - &new_rt;
        let mut approximate = false;
        if !money::is_positive(&tokens_out) {
            tokens_out = self.div(&usdt_in_after_fee, &ru)? * &rt;
            approximate = true;
            if !money::is_positive(&tokens_out) {
                return Err(PricingError::PrecisionUnderflow);
            }
        }

        let price_impact = (self.div(&new_ru, &ru)? - BigDecimal::one()) * BigDecimal::from(100);

        Ok(BuyQuote {
            tokens_out,
            fee,
            usdt_in_after_fee,
            price_impact,
            approximate,
        })
    }

    /// Quote selling `token_in` for USDT (fee deducted from the output).
    pub fn quote_sell(&self, pool: &Pool, token_in: &BigDecimal) -> Result<SellQuote, PricingError> {
        let (rt, ru) = Self::tradable_reserves(pool, token_in)?;

        let k = &rt * &ru;
        let new_rt = &rt + token_in;
        let new_ru = self.div(&k, &new_rt)?;

        let mut usdt_out_before_fee = &ru - &new_ru;
        let mut approximate = false;
        if !money::is_positive(&usdt_out_before_fee) {
            usdt_out_before_fee = self.div(token_in, &rt)? * &ru;
            approximate = true;
            if !money::is_positive(&usdt_out_before_fee) {
                return Err(PricingError::PrecisionUnderflow);
            }
        }

        let fee = pool.trade_fee.fee_on(&usdt_out_before_fee);
        let usdt_out = &usdt_out_before_fee - &fee;
        let price_impact = (BigDecimal::one() - self.div(&new_ru, &ru)?) * BigDecimal::from(100);

        Ok(SellQuote {
            usdt_out,
            fee,
            usdt_out_before_fee,
            price_impact,
            approximate,
        })
    }

    /// Marginal curve price `Ru / Rt`; zero for an empty token reserve.
    pub fn spot_price(&self, pool: &Pool) -> BigDecimal {
        money::div_or_zero(
            &pool.effective_reserve_usdt(),
            &pool.effective_reserve_token(),
            self.precision,
        )
    }

    fn tradable_reserves(
        pool: &Pool,
        amount: &BigDecimal,
    ) -> Result<(BigDecimal, BigDecimal), PricingError> {
        if pool.is_graduated() {
            return Err(PricingError::PoolGraduated(pool.id));
        }
        if !money::is_positive(amount) {
            return Err(PricingError::NonPositiveAmount);
        }
        let rt = pool.effective_reserve_token();
        let ru = pool.effective_reserve_usdt();
        if rt.is_zero() || ru.is_zero() {
            return Err(PricingError::EmptyReserves);
        }
        Ok((rt, ru))
    }

    #[inline]
    fn div(&self, a: &BigDecimal, b: &BigDecimal) -> Result<BigDecimal, PricingError> {
        money::div(a, b, self.precision).map_err(|_| PricingError::EmptyReserves)
    }
}
