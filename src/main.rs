//! Curve Ledger - replay tool
//!
//! Replays confirmed bonding-curve trades through the ledger and writes the
//! final state.
//!
//! ```text
//! ┌───────────┐    ┌──────────────────────┐    ┌─────────────┐
//! │ pools.csv │───▶│ TransactionRecorder  │───▶│ *_final.csv │
//! │trades.csv │    │ (memory or Postgres) │    │             │
//! └───────────┘    └──────────────────────┘    └─────────────┘
//! ```
//!
//! Usage: `curve_ledger [--env dev] [--input fixtures] [--output output]`

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use curve_ledger::config::AppConfig;
use curve_ledger::core_types::{Address, PoolId};
use curve_ledger::csv_io::{
    HOLDERS_FINAL_CSV, POOLS_CSV, POOLS_FINAL_CSV, TRADES_CSV, dump_holders, dump_pools,
    load_pools, load_trades,
};
use curve_ledger::db::Database;
use curve_ledger::ledger::{NotifyDispatcher, QueueNotifier, TradeRequest, TransactionRecorder};
use curve_ledger::store::{LedgerStore, MemoryStore, PgLedgerStore, schema};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_input_dir() -> PathBuf {
    PathBuf::from(get_arg(&["--input"]).unwrap_or_else(|| "fixtures".to_string()))
}

fn get_output_dir() -> PathBuf {
    PathBuf::from(get_arg(&["--output"]).unwrap_or_else(|| "output".to_string()))
}

// ============================================================
// REPLAY
// ============================================================

#[derive(Debug, Default)]
struct ReplayStats {
    applied: usize,
    duplicates: usize,
    rejected: usize,
    faults: usize,
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn LedgerStore>> {
    match &config.postgres_url {
        Some(url) => {
            println!("[Store] Connecting to PostgreSQL...");
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            schema::init_schema(db.pool()).await?;
            Ok(Arc::new(PgLedgerStore::new(db.pool().clone())))
        }
        None => {
            println!("[Store] In-memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let input_dir = get_input_dir();
    let output_dir = get_output_dir();

    let config = AppConfig::load(&env)?;
    let _log_guard = curve_ledger::logging::init_logging(&config);
    tracing::info!("Starting curve ledger replay in {} mode", env);

    println!("=== Curve Ledger Replay ===");
    println!("Input directory: {}/", input_dir.display());
    println!("Output directory: {}/\n", output_dir.display());

    let store = open_store(&config).await?;
    let queue = Arc::new(QueueNotifier::new(config.notify.queue_size));
    let recorder = TransactionRecorder::new(store, &config.engine).with_notifier(
        NotifyDispatcher::new(
            queue.clone(),
            config.notify.max_attempts,
            config.notify.retry_backoff(),
        ),
    );

    // [1] Pools
    let mut pool_ids: HashMap<Address, PoolId> = HashMap::new();
    for params in load_pools(&input_dir.join(POOLS_CSV))? {
        let token = params.token_address.clone();
        let pool = match recorder.pool_by_token(&token).await? {
            Some(existing) => {
                tracing::info!(pool_id = %existing.id, token = %token, "Reusing existing pool");
                existing
            }
            None => recorder.create_pool(params).await?,
        };
        pool_ids.insert(token, pool.id);
    }
    println!("[1] {} pools ready", pool_ids.len());

    // [2] Trades
    let trades = load_trades(&input_dir.join(TRADES_CSV))?;
    let start_time = Instant::now();
    let mut stats = ReplayStats::default();
    let mut events = 0usize;

    for trade in trades {
        let Some(&pool_id) = pool_ids.get(&trade.token_address) else {
            tracing::warn!(tx_hash = %trade.tx_hash, token = %trade.token_address, "Trade for unknown pool skipped");
            stats.rejected += 1;
            continue;
        };

        let mut request = TradeRequest::new(
            pool_id,
            trade.side,
            trade.tx_hash,
            trade.wallet,
            trade.token_amount,
            trade.usdt_amount,
        );
        request.timestamp = trade.timestamp;

        match recorder.apply_trade(request).await {
            Ok(outcome) if outcome.duplicate => stats.duplicates += 1,
            Ok(outcome) => {
                stats.applied += 1;
                stats.faults += outcome.faults.len();
            }
            Err(e) if e.is_retryable() => {
                return Err(e).context("Replay aborted on storage error");
            }
            Err(e) => {
                tracing::warn!(code = e.code(), "Trade rejected: {}", e);
                stats.rejected += 1;
            }
        }
        // keep the queue from filling up: this tool has no broadcaster
        events += queue.drain().len();
    }
    let elapsed = start_time.elapsed();

    println!(
        "[2] applied={} duplicates={} rejected={} clamped_balances={} in {:.2?}",
        stats.applied, stats.duplicates, stats.rejected, stats.faults, elapsed
    );

    // [3] Final state
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut pools = Vec::with_capacity(pool_ids.len());
    let mut holders = Vec::new();
    for (token, pool_id) in &pool_ids {
        pools.push(recorder.pool(*pool_id).await?);
        for holder in recorder.holders(*pool_id).await? {
            holders.push((token.clone(), holder));
        }
    }
    holders.sort_by(|a, b| a.0.cmp(&b.0));

    dump_pools(&pools, &output_dir.join(POOLS_FINAL_CSV))?;
    dump_holders(&holders, &output_dir.join(HOLDERS_FINAL_CSV))?;

    // give in-flight notifications a moment before the runtime shuts down
    tokio::task::yield_now().await;
    events += queue.drain().len();

    println!("[3] Final state written ({} notifications drained)", events);
    tracing::info!(?stats, "Replay finished");
    Ok(())
}
