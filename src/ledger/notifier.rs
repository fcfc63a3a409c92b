//! Downstream trade notifications
//!
//! After a trade commits, the recorder hands a pool snapshot and the raw
//! transaction record to a [`TradeNotifier`]. Delivery runs on a spawned task
//! with bounded retries; a notifier that keeps failing is logged and dropped,
//! never surfaced to the trade caller.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::core_types::Address;
use crate::ledger::types::TransactionRecord;
use crate::pool::Pool;

/// Realtime pool figures pushed to subscribers after every trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_address: Address,
    pub price_realtime: BigDecimal,
    pub market_cap: BigDecimal,
    pub bonding_curve_percentage: BigDecimal,
}

impl From<&Pool> for PoolSnapshot {
    fn from(pool: &Pool) -> Self {
        Self {
            pool_address: pool.token_address.clone(),
            price_realtime: pool.metrics.price_realtime.clone(),
            market_cap: pool.metrics.market_cap.clone(),
            bonding_curve_percentage: pool.metrics.bonding_curve_percentage.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    Snapshot(PoolSnapshot),
    Trade(TransactionRecord),
}

impl TradeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TradeEvent::Snapshot(_) => "snapshot",
            TradeEvent::Trade(_) => "trade",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// Broadcaster seam.
#[async_trait]
pub trait TradeNotifier: Send + Sync {
    /// Notifier name for logging
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError>;
}

/// Pushes events onto a bounded lock-free queue drained by the broadcaster.
pub struct QueueNotifier {
    queue: Arc<ArrayQueue<TradeEvent>>,
}

impl QueueNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<TradeEvent> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            events.push(event);
        }
        events
    }
}

#[async_trait]
impl TradeNotifier for QueueNotifier {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn notify(&self, event: &TradeEvent) -> Result<(), NotifyError> {
        self.queue
            .push(event.clone())
            .map_err(|_| NotifyError::QueueFull)
    }
}

/// Discards every event.
pub struct NoopNotifier;

#[async_trait]
impl TradeNotifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn notify(&self, _event: &TradeEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Fire-and-forget delivery with bounded retries and linear backoff.
#[derive(Clone)]
pub struct NotifyDispatcher {
    notifier: Arc<dyn TradeNotifier>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl NotifyDispatcher {
    pub fn new(notifier: Arc<dyn TradeNotifier>, max_attempts: u32, retry_backoff: Duration) -> Self {
        Self {
            notifier,
            max_attempts: max_attempts.max(1),
            retry_backoff,
        }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopNotifier), 1, Duration::ZERO)
    }

    /// Deliver `events` in order on a background task. Each event gets its
    /// own retry budget; a failed event does not hold back the next.
    pub fn dispatch(&self, events: Vec<TradeEvent>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            for event in events {
                this.deliver(&event).await;
            }
        })
    }

    async fn deliver(&self, event: &TradeEvent) {
        for attempt in 1..=self.max_attempts {
            match self.notifier.notify(event).await {
                Ok(()) => return,
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(
                        notifier = self.notifier.name(),
                        event = event.kind(),
                        attempt,
                        error = %e,
                        "Notification failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::warn!(
                        notifier = self.notifier.name(),
                        event = event.kind(),
                        attempts = self.max_attempts,
                        error = %e,
                        "Notification dropped"
                    );
                }
            }
        }
    }
}
