//! Ledger Core Types

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Address, PoolId, TransactionId, TxHash};
use crate::pool::PoolMetrics;

/// Trade direction, from the trader's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TradeSide {
    /// USDT in, tokens out
    Buy = 1,
    /// Tokens in, USDT out
    Sell = 2,
}

impl TradeSide {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TradeSide::Buy),
            2 => Some(TradeSide::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {}", other)),
        }
    }
}

/// Where the ledger-affecting amounts of a trade come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Both amounts are on-chain confirmed deltas and applied as given.
    #[default]
    ConfirmedDeltas,
    /// Only the input side is taken from the caller; the output side is
    /// recomputed from the curve.
    CurveRecompute,
}

/// What to do when a mutation would push a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyPolicy {
    /// Clamp to zero, audit-log, commit.
    #[default]
    Clamp,
    /// Abort the trade before any mutation.
    Reject,
}

/// The balance a consistency fault was detected on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    ReserveToken,
    ReserveUsdt,
    TokenAmm,
    UsdtAmm,
    CurveHolder,
    WalletHolder,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::ReserveToken => "reserve_token",
            FaultKind::ReserveUsdt => "reserve_usdt",
            FaultKind::TokenAmm => "total_supply_token_amm",
            FaultKind::UsdtAmm => "total_supply_usdt_amm",
            FaultKind::CurveHolder => "curve_holder",
            FaultKind::WalletHolder => "wallet_holder",
        }
    }
}

/// A requested balance fell below zero and was clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyFault {
    pub kind: FaultKind,
    /// The (negative) value the mutation asked for
    pub requested: BigDecimal,
}

impl fmt::Display for ConsistencyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} would become {}", self.kind.as_str(), self.requested)
    }
}

/// Trade submitted by the ingestion layer
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub pool_id: PoolId,
    pub side: TradeSide,
    /// Idempotency key
    pub tx_hash: TxHash,
    pub wallet: Address,
    pub token_amount: BigDecimal,
    pub usdt_amount: BigDecimal,
    /// On-chain block time; defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl TradeRequest {
    pub fn new(
        pool_id: PoolId,
        side: TradeSide,
        tx_hash: TxHash,
        wallet: Address,
        token_amount: BigDecimal,
        usdt_amount: BigDecimal,
    ) -> Self {
        Self {
            pool_id,
            side,
            tx_hash,
            wallet,
            token_amount,
            usdt_amount,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Immutable transaction-log row.
///
/// Carries the post-trade metrics so a replay returns exactly what the first
/// application returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub pool_id: PoolId,
    pub side: TradeSide,
    pub tx_hash: TxHash,
    pub wallet: Address,
    pub token_amount: BigDecimal,
    pub usdt_amount: BigDecimal,
    pub fee_amount: BigDecimal,
    pub price_impact: BigDecimal,
    pub approximate: bool,
    pub effective_token_before: BigDecimal,
    pub effective_usdt_before: BigDecimal,
    pub effective_token_after: BigDecimal,
    pub effective_usdt_after: BigDecimal,
    pub price_before: BigDecimal,
    pub metrics_after: PoolMetrics,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    #[inline]
    pub fn price_after(&self) -> &BigDecimal {
        &self.metrics_after.price_realtime
    }
}

/// Result of `apply_trade`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    pub transaction: TransactionRecord,
    /// The hash had already been applied; nothing was mutated
    pub duplicate: bool,
    /// Clamp events of this application (always empty on replays)
    pub faults: Vec<ConsistencyFault>,
}

/// Result of `graduate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraduationOutcome {
    Graduated,
    AlreadyGraduated,
}
