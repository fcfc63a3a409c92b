//! Holder Ledger - per-pool token balances
//!
//! The pool's own token address is a synthetic holder carrying the unsold
//! curve supply. Tokens only ever move between that holder and wallets, so
//! `sum(balances) == total_supply` holds as long as every debit is matched
//! by an equal credit.
//!
//! A debit larger than the balance is clamped to the balance and reported as
//! a [`ConsistencyFault`]; the counterparty is credited with what was actually
//! debited so the sum invariant survives the clamp.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use crate::core_types::{Address, PoolId};
use crate::ledger::types::{ConsistencyFault, FaultKind, TradeSide};

/// Persisted holder row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub pool_id: PoolId,
    pub address: Address,
    pub amount: BigDecimal,
}

/// Pending write to one holder row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderWrite {
    pub address: Address,
    /// `None` deletes the row
    pub balance: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
pub struct HolderUpdate {
    pub writes: Vec<HolderWrite>,
    pub faults: Vec<ConsistencyFault>,
}

pub struct HolderLedger;

impl HolderLedger {
    /// Plan the holder writes for one trade.
    ///
    /// `wallet_balance` is `None` when the wallet has no row yet.
    pub fn apply(
        curve_holder: &Address,
        curve_balance: &BigDecimal,
        wallet: &Address,
        wallet_balance: Option<&BigDecimal>,
        side: TradeSide,
        token_amount: &BigDecimal,
    ) -> HolderUpdate {
        let zero = BigDecimal::zero();
        let wallet_balance = wallet_balance.unwrap_or(&zero);
        let mut faults = Vec::new();

        let (curve_after, wallet_after) = match side {
            TradeSide::Buy => {
                let moved = debit_amount(curve_balance, token_amount, FaultKind::CurveHolder, &mut faults);
                (curve_balance - &moved, wallet_balance + &moved)
            }
            TradeSide::Sell => {
                let moved =
                    debit_amount(wallet_balance, token_amount, FaultKind::WalletHolder, &mut faults);
                (curve_balance + &moved, wallet_balance - &moved)
            }
        };

        let writes = vec![
            // the curve holder lives as long as the pool, even at zero
            HolderWrite {
                address: curve_holder.clone(),
                balance: Some(curve_after),
            },
            HolderWrite {
                address: wallet.clone(),
                balance: if wallet_after.is_zero() {
                    None
                } else {
                    Some(wallet_after)
                },
            },
        ];

        HolderUpdate { writes, faults }
    }
}

/// Amount that can actually leave `balance`; records a fault when short.
fn debit_amount(
    balance: &BigDecimal,
    amount: &BigDecimal,
    kind: FaultKind,
    faults: &mut Vec<ConsistencyFault>,
) -> BigDecimal {
    if amount > balance {
        faults.push(ConsistencyFault {
            kind,
            requested: balance - amount,
        });
        balance.clone()
    } else {
        amount.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn curve() -> Address {
        Address::parse("0x5555555555555555555555555555555555555555").unwrap()
    }

    fn wallet() -> Address {
        Address::parse("0x6666666666666666666666666666666666666666").unwrap()
    }

    fn sum(update: &HolderUpdate) -> BigDecimal {
        update
            .writes
            .iter()
            .filter_map(|w| w.balance.clone())
            .fold(BigDecimal::zero(), |acc, b| acc + b)
    }

    #[test]
    fn test_buy_creates_wallet_row() {
        let update =
            HolderLedger::apply(&curve(), &d("1000"), &wallet(), None, TradeSide::Buy, &d("40"));
        assert!(update.faults.is_empty());
        assert_eq!(update.writes[0].balance, Some(d("960")));
        assert_eq!(update.writes[1].address, wallet());
        assert_eq!(update.writes[1].balance, Some(d("40")));
        assert_eq!(sum(&update), d("1000"));
    }

    #[test]
    fn test_sell_to_zero_deletes_wallet_row() {
        let update = HolderLedger::apply(
            &curve(),
            &d("960"),
            &wallet(),
            Some(&d("40")),
            TradeSide::Sell,
            &d("40"),
        );
        assert!(update.faults.is_empty());
        assert_eq!(update.writes[0].balance, Some(d("1000")));
        assert_eq!(update.writes[1].balance, None);
    }

    #[test]
    fn test_partial_sell_keeps_row() {
        let update = HolderLedger::apply(
            &curve(),
            &d("960"),
            &wallet(),
            Some(&d("40")),
            TradeSide::Sell,
            &d("15"),
        );
        assert_eq!(update.writes[1].balance, Some(d("25")));
        assert_eq!(sum(&update), d("1000"));
    }

    #[test]
    fn test_curve_holder_never_negative() {
        let update =
            HolderLedger::apply(&curve(), &d("10"), &wallet(), None, TradeSide::Buy, &d("25"));
        assert_eq!(update.faults.len(), 1);
        assert_eq!(update.faults[0].kind, FaultKind::CurveHolder);
        assert_eq!(update.faults[0].requested, d("-15"));
        // curve row persists at zero
        assert_eq!(update.writes[0].balance, Some(BigDecimal::zero()));
        assert_eq!(update.writes[1].balance, Some(d("10")));
        assert_eq!(sum(&update), d("10"));
    }

    #[test]
    fn test_oversell_clamps_wallet() {
        let update = HolderLedger::apply(
            &curve(),
            &d("990"),
            &wallet(),
            Some(&d("10")),
            TradeSide::Sell,
            &d("30"),
        );
        assert_eq!(update.faults.len(), 1);
        assert_eq!(update.faults[0].kind, FaultKind::WalletHolder);
        assert_eq!(update.writes[0].balance, Some(d("1000")));
        assert_eq!(update.writes[1].balance, None);
    }
}
