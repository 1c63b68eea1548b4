use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use probe_monitoring::{
    actors::{alert::AlertHandle, monitor::MonitorHandle},
    config::read_config_file,
    executor::SimulatedExecutor,
    telemetry,
    util::get_config_path,
};
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $PROBE_MONITOR_CONFIG or ./config.json)
    #[arg(short)]
    file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let config = read_config_file(&path).with_context(|| format!("failed to load {path}"))?;
    config.validate().context("invalid configuration")?;

    telemetry::init(&config.logging)?;
    trace!("started with args: {args:?}");
    debug!(
        entities = config.entities.len(),
        tick_interval = config.scheduler.tick_interval,
        "configuration loaded"
    );

    let executor = Arc::new(SimulatedExecutor::new(config.simulation.clone()));
    let alert = config.alert.clone();

    let monitor = MonitorHandle::spawn(config, executor)?;
    let alerts = AlertHandle::spawn(alert, monitor.subscribe_events());

    info!("probe hub running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    if let Ok(stats) = monitor.stats().await {
        info!(
            rounds = stats.rounds,
            fused = stats.fusion.fused,
            timed_out = stats.fusion.timed_out,
            events = stats.events.raised,
            "shutting down"
        );
    }

    alerts.shutdown().await;
    monitor.shutdown().await?;

    Ok(())
}
