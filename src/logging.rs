use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Per-trade trace events
pub const TRADE_TARGET: &str = "TRADE";
/// Consistency faults and other ledger anomalies
pub const AUDIT_TARGET: &str = "audit";

/// Filter directive string for `config`; `TRADE` is silenced unless tracing
/// is enabled. `audit` is never filtered below warn.
pub fn filter_directives(config: &AppConfig) -> String {
    if config.enable_tracing {
        format!("{},{}=warn", config.log_level, AUDIT_TARGET)
    } else {
        format!(
            "{},{}=off,{}=warn",
            config.log_level, TRADE_TARGET, AUDIT_TARGET
        )
    }
}

pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        // target kept: it is how audit lines are told apart
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
