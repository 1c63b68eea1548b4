use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

const TARGETS: [&str; 2] = ["probe_monitoring", "probe_hub"];

/// Parse a configured level, falling back to `INFO` on anything unknown.
pub fn level_filter(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::INFO)
}

/// Install the global subscriber. Call once, at process start.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = level_filter(&config.level);
    let filter =
        filter::Targets::new().with_targets(TARGETS.iter().map(|target| (*target, level)));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
