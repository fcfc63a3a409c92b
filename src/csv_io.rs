//! CSV I/O - Load and save data from/to CSV files
//!
//! Replay inputs (pool definitions and confirmed trades) and the final
//! pool/holder snapshots.

use anyhow::{Context, Result, bail};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::core_types::{Address, TxHash};
use crate::fee::FeeRate;
use crate::ledger::types::TradeSide;
use crate::money;
use crate::pool::{Holder, NewPool, Pool};

// ============================================================
// File names
// ============================================================

pub const POOLS_CSV: &str = "pools.csv";
pub const TRADES_CSV: &str = "trades.csv";
pub const POOLS_FINAL_CSV: &str = "pools_final.csv";
pub const HOLDERS_FINAL_CSV: &str = "holders_final.csv";

/// One confirmed trade from the replay input.
///
/// Pools are addressed by token because pool ids are minted at load time.
#[derive(Debug, Clone)]
pub struct InputTrade {
    pub tx_hash: TxHash,
    pub token_address: Address,
    pub side: TradeSide,
    pub wallet: Address,
    pub token_amount: BigDecimal,
    pub usdt_amount: BigDecimal,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Iterate data lines (header skipped, blanks and `#` comments ignored),
/// yielding 1-based file line numbers.
fn data_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push((idx + 1, trimmed.to_string()));
    }
    Ok(lines)
}

fn columns(line: &str, expected: usize, line_num: usize) -> Result<Vec<&str>> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < expected {
        bail!(
            "Expected {} columns at line {}, found {}",
            expected,
            line_num,
            parts.len()
        );
    }
    Ok(parts)
}

// ============================================================
// Loading
// ============================================================

/// Load pool definitions.
///
/// Columns: `token_address,virtual_reserve_token,virtual_reserve_usdt,`
/// `initial_reserve_token,total_supply,trade_fee_percent`
pub fn load_pools(path: &Path) -> Result<Vec<NewPool>> {
    let mut pools = Vec::new();

    for (line_num, line) in data_lines(path)? {
        let parts = columns(&line, 6, line_num)?;
        let field = |idx: usize, name: &str| -> Result<BigDecimal> {
            money::parse_non_negative(parts[idx])
                .with_context(|| format!("Invalid {} at line {}", name, line_num))
        };

        pools.push(NewPool {
            token_address: Address::parse(parts[0])
                .with_context(|| format!("Invalid token_address at line {}", line_num))?,
            virtual_reserve_token: field(1, "virtual_reserve_token")?,
            virtual_reserve_usdt: field(2, "virtual_reserve_usdt")?,
            initial_reserve_token: field(3, "initial_reserve_token")?,
            total_supply: field(4, "total_supply")?,
            trade_fee: FeeRate::from_percent(field(5, "trade_fee_percent")?)
                .with_context(|| format!("Invalid trade_fee_percent at line {}", line_num))?,
        });
    }

    tracing::info!("Loaded {} pools from {}", pools.len(), path.display());
    Ok(pools)
}

/// Load confirmed trades in application order.
///
/// Columns: `tx_hash,token_address,side,wallet,token_amount,usdt_amount[,timestamp]`
/// with an optional RFC 3339 block time.
pub fn load_trades(path: &Path) -> Result<Vec<InputTrade>> {
    let mut trades = Vec::new();

    for (line_num, line) in data_lines(path)? {
        let parts = columns(&line, 6, line_num)?;

        let timestamp = match parts.get(6).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .with_context(|| format!("Invalid timestamp at line {}", line_num))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        trades.push(InputTrade {
            tx_hash: TxHash::parse(parts[0])
                .with_context(|| format!("Invalid tx_hash at line {}", line_num))?,
            token_address: Address::parse(parts[1])
                .with_context(|| format!("Invalid token_address at line {}", line_num))?,
            side: parts[2]
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid side at line {}", line_num))?,
            wallet: Address::parse(parts[3])
                .with_context(|| format!("Invalid wallet at line {}", line_num))?,
            // positivity is the recorder's call: it depends on the amount policy
            token_amount: money::parse_non_negative(parts[4])
                .with_context(|| format!("Invalid token_amount at line {}", line_num))?,
            usdt_amount: money::parse_non_negative(parts[5])
                .with_context(|| format!("Invalid usdt_amount at line {}", line_num))?,
            timestamp,
        });
    }

    tracing::info!("Loaded {} trades from {}", trades.len(), path.display());
    Ok(trades)
}

// ============================================================
// Output Snapshots
// ============================================================

/// Dump final pool state, sorted by token address.
pub fn dump_pools(pools: &[Pool], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(
        out,
        "token_address,status,version,reserve_token,reserve_usdt,total_supply_token_amm,\
         total_supply_usdt_amm,price_realtime,market_cap,bonding_curve_percentage,price_change_24h"
    )?;

    let mut sorted: Vec<&Pool> = pools.iter().collect();
    sorted.sort_by(|a, b| a.token_address.cmp(&b.token_address));

    for pool in sorted {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{}",
            pool.token_address,
            pool.status,
            pool.version,
            pool.reserve_token.normalized(),
            pool.reserve_usdt.normalized(),
            pool.total_supply_token_amm.normalized(),
            pool.total_supply_usdt_amm.normalized(),
            money::format_amount(&pool.metrics.price_realtime, 18),
            money::format_amount(&pool.metrics.market_cap, 6),
            money::format_amount(&pool.metrics.bonding_curve_percentage, 6),
            pool.price_change_24h
                .as_ref()
                .map(|c| money::format_amount(c, 6))
                .unwrap_or_default(),
        )?;
    }

    out.flush()?;
    Ok(())
}

/// Dump holder balances in the order given.
pub fn dump_holders(holders: &[(Address, Holder)], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "token_address,holder_address,amount")?;
    for (token, holder) in holders {
        writeln!(
            out,
            "{},{},{}",
            token,
            holder.address,
            holder.amount.normalized()
        )?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("curve_ledger_csv_{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_pools() {
        let dir = temp_dir();
        let path = dir.join(POOLS_CSV);
        std::fs::write(
            &path,
            "token_address,virtual_reserve_token,virtual_reserve_usdt,initial_reserve_token,total_supply,trade_fee_percent\n\
             # launch pool\n\
             0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA,1888888888e18,100000e18,0,1000000000e18,0.1\n",
        )
        .unwrap();

        let pools = load_pools(&path).unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(
            pools[0].token_address.as_str(),
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(
            pools[0].virtual_reserve_usdt,
            BigDecimal::from_str("100000e18").unwrap()
        );
        assert_eq!(
            pools[0].trade_fee.percent(),
            &BigDecimal::from_str("0.1").unwrap()
        );
    }

    #[test]
    fn test_load_trades_with_optional_timestamp() {
        let dir = temp_dir();
        let path = dir.join(TRADES_CSV);
        let hash_a = format!("0x{}", "1".repeat(64));
        let hash_b = format!("0x{}", "2".repeat(64));
        let token = format!("0x{}", "a".repeat(40));
        let wallet = format!("0x{}", "b".repeat(40));
        std::fs::write(
            &path,
            format!(
                "tx_hash,token_address,side,wallet,token_amount,usdt_amount,timestamp\n\
                 {hash_a},{token},buy,{wallet},100,10,2024-05-01T12:00:00Z\n\
                 {hash_b},{token},SELL,{wallet},50,4\n"
            ),
        )
        .unwrap();

        let trades = load_trades(&path).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].side, TradeSide::Buy);
        assert_eq!(
            trades[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(trades[1].side, TradeSide::Sell);
        assert!(trades[1].timestamp.is_none());
    }

    #[test]
    fn test_load_trades_reports_line() {
        let dir = temp_dir();
        let path = dir.join(TRADES_CSV);
        std::fs::write(&path, "header\n0x12,0xab,buy,0xcd,1,1\n").unwrap();

        let err = load_trades(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_short_row_rejected() {
        let dir = temp_dir();
        let path = dir.join(POOLS_CSV);
        std::fs::write(&path, "header\n0xaa,1,2\n").unwrap();
        assert!(load_pools(&path).is_err());
    }
}
