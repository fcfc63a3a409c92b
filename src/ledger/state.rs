//! Trade application state
//!
//! Per (pool, tx_hash):
//!
//! ```text
//! UNSEEN → APPLYING → APPLIED
//!              ↓
//!          REJECTED
//! ```
//!
//! `APPLYING` only exists inside the per-pool critical section. Only
//! `APPLIED` is persisted (as the transaction row itself); a rejected
//! submission leaves no trace, so the same hash may be retried later.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TradeState {
    Unseen = 0,
    Applying = 10,
    /// Terminal: ledger mutated exactly once
    Applied = 20,
    /// Terminal for this submission: nothing was mutated
    Rejected = -10,
}

impl TradeState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Applied | TradeState::Rejected)
    }

    /// Legal edges of the state machine.
    pub fn can_transition_to(&self, next: TradeState) -> bool {
        matches!(
            (self, next),
            (TradeState::Unseen, TradeState::Applying)
                | (TradeState::Unseen, TradeState::Applied)
                | (TradeState::Applying, TradeState::Applied)
                | (TradeState::Applying, TradeState::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Unseen => "UNSEEN",
            TradeState::Applying => "APPLYING",
            TradeState::Applied => "APPLIED",
            TradeState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
