//! Helper functions for integration tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use probe_monitoring::{
    Metric,
    config::Config,
    engine::Monitor,
    events::CollectingSink,
    executor::ProbeExecutor,
    probe::{ProbeOutcome, ProbeResult, ProbeTask},
    state::Observation,
};

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Deterministic config: greedy strategy only, 1s re-probe floor, no
/// interval adaptation, and a tick timer that never fires during a test.
pub fn test_config(metrics: &[Metric]) -> Config {
    let mut config = Config::default();
    config.metrics.enabled = metrics.to_vec();
    config.scheduler.epsilon = 0.0;
    config.scheduler.seed = Some(42);
    config.scheduler.min_reprobe_interval = 1;
    config.scheduler.interval_gain = 0.0;
    config.scheduler.tick_interval = 3600;
    config
}

pub fn create_monitor(config: Config) -> (Monitor, CollectingSink) {
    let sink = CollectingSink::new();
    let monitor = Monitor::new(config, Box::new(sink.clone()), at(0)).unwrap();
    (monitor, sink)
}

/// Tick at `now` and answer every dispatched probe at the same instant.
///
/// Returns the number of probes dispatched.
pub fn run_round(
    monitor: &mut Monitor,
    now: i64,
    respond: impl Fn(&ProbeTask) -> ProbeResult,
) -> usize {
    let report = monitor.tick(at(now));
    for dispatch in &report.dispatched {
        let result = respond(&dispatch.task);
        monitor.handle_outcome(ProbeOutcome::new(&dispatch.task, result, at(now)));
    }
    report.dispatched.len()
}

pub fn value(v: f64) -> ProbeResult {
    ProbeResult::Completed(Observation::Value(v))
}

pub fn up(up: bool) -> ProbeResult {
    ProbeResult::Completed(Observation::Up(up))
}

/// Executor answering every probe of a metric with the same result.
pub struct FixedExecutor {
    pub up: bool,
    pub latency: f64,
    pub loss: f64,
    pub bandwidth: f64,
    pub calls: AtomicUsize,
}

impl FixedExecutor {
    pub fn new(up: bool) -> Arc<Self> {
        Arc::new(Self {
            up,
            latency: 10.0,
            loss: 0.01,
            bandwidth: 100.0,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeExecutor for FixedExecutor {
    async fn execute(&self, task: &ProbeTask) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match task.key.metric {
            Metric::Liveness => up(self.up),
            Metric::Latency => value(self.latency),
            Metric::Loss => value(self.loss),
            Metric::Bandwidth => value(self.bandwidth),
        }
    }
}

/// Executor that always reports the same result, whatever the metric.
pub struct ScriptedExecutor(pub ProbeResult);

#[async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn execute(&self, _task: &ProbeTask) -> ProbeResult {
        self.0.clone()
    }
}

/// Executor that never answers.
pub struct SilentExecutor;

#[async_trait]
impl ProbeExecutor for SilentExecutor {
    async fn execute(&self, _task: &ProbeTask) -> ProbeResult {
        std::future::pending().await
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}
