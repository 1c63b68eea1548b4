use tracing::trace;

use crate::{
    Entity, Metric,
    error::{MonitorError, MonitorResult},
    state::distribution::{BetaBelief, GaussianBelief, StateDistribution},
};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Entities known at startup. Further entities arrive through the topology callbacks.
    #[serde(default)]
    pub entities: Vec<Entity>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub estimation: EstimationConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub reward: RewardConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduling ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u64,

    /// Floor of the per-pair re-probe interval, in seconds
    #[serde(default = "default_min_reprobe_interval", alias = "initial_probe_interval")]
    pub min_reprobe_interval: u64,

    /// Ceiling of the per-pair re-probe interval, in seconds
    #[serde(default = "default_max_probe_interval")]
    pub max_probe_interval: u64,

    /// Proportional gain of the interval controller (0 disables adaptation)
    #[serde(default = "default_interval_gain")]
    pub interval_gain: f64,

    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Seconds a dispatched probe may stay outstanding before it is timed out
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Weight of the information gain in the priority score
    #[serde(default = "default_uncertainty_weight")]
    pub uncertainty_weight: f64,

    /// Weight of the instability term in the priority score
    #[serde(default = "default_stability_weight")]
    pub stability_weight: f64,

    /// Exploration rate of the strategy bandit
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            min_reprobe_interval: default_min_reprobe_interval(),
            max_probe_interval: default_max_probe_interval(),
            interval_gain: default_interval_gain(),
            max_concurrent_probes: default_max_concurrent_probes(),
            top_k: default_top_k(),
            probe_timeout: default_probe_timeout(),
            uncertainty_weight: default_uncertainty_weight(),
            stability_weight: default_stability_weight(),
            epsilon: default_epsilon(),
            seed: None,
        }
    }
}

fn default_tick_interval() -> u64 {
    10
}

fn default_min_reprobe_interval() -> u64 {
    5
}

fn default_max_probe_interval() -> u64 {
    30
}

fn default_interval_gain() -> f64 {
    0.1
}

fn default_max_concurrent_probes() -> usize {
    5
}

fn default_top_k() -> usize {
    5
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_uncertainty_weight() -> f64 {
    0.6
}

fn default_stability_weight() -> f64 {
    0.4
}

fn default_epsilon() -> f64 {
    0.1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EstimationConfig {
    /// Span of the stability window, in seconds
    #[serde(default = "default_sliding_window")]
    pub sliding_window: u64,

    #[serde(default = "default_max_uncertainty")]
    pub max_uncertainty: f64,

    #[serde(default = "default_max_stability")]
    pub max_stability: f64,

    #[serde(default = "default_target_stability")]
    pub target_stability: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            sliding_window: default_sliding_window(),
            max_uncertainty: default_max_uncertainty(),
            max_stability: default_max_stability(),
            target_stability: default_target_stability(),
        }
    }
}

fn default_sliding_window() -> u64 {
    300
}

fn default_max_uncertainty() -> f64 {
    2.0
}

fn default_max_stability() -> f64 {
    5.0
}

fn default_target_stability() -> f64 {
    0.5
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    #[serde(default = "default_hysteresis_margin")]
    pub hysteresis_margin: f64,

    /// Prior means needed before a continuous metric can score a deviation
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Number of standard deviations that maps to a score of 1
    #[serde(default = "default_deviation_scale")]
    pub deviation_scale: f64,

    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,

    /// Seconds a cleared event stays in the recent list
    #[serde(default = "default_event_retention")]
    pub event_retention: u64,

    /// Entities whose latency events also trigger their loss and bandwidth pairs
    #[serde(default)]
    pub core_entities: Vec<crate::EntityId>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            critical_threshold: default_critical_threshold(),
            hysteresis_margin: default_hysteresis_margin(),
            min_history: default_min_history(),
            history_size: default_history_size(),
            deviation_scale: default_deviation_scale(),
            max_recent_events: default_max_recent_events(),
            event_retention: default_event_retention(),
            core_entities: vec![],
        }
    }
}

fn default_alert_threshold() -> f64 {
    0.6
}

fn default_critical_threshold() -> f64 {
    0.8
}

fn default_hysteresis_margin() -> f64 {
    0.1
}

fn default_min_history() -> usize {
    10
}

fn default_history_size() -> usize {
    100
}

fn default_deviation_scale() -> f64 {
    5.0
}

fn default_max_recent_events() -> usize {
    100
}

fn default_event_retention() -> u64 {
    300
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_reward_uncertainty_weight")]
    pub uncertainty_weight: f64,

    #[serde(default = "default_reward_cost_weight")]
    pub cost_weight: f64,

    #[serde(default = "default_max_uncertainty_reduction")]
    pub max_uncertainty_reduction: f64,

    /// Magnitude of the negative reward for timeouts, failures and rejected measurements
    #[serde(default = "default_timeout_penalty")]
    pub timeout_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            uncertainty_weight: default_reward_uncertainty_weight(),
            cost_weight: default_reward_cost_weight(),
            max_uncertainty_reduction: default_max_uncertainty_reduction(),
            timeout_penalty: default_timeout_penalty(),
        }
    }
}

fn default_reward_uncertainty_weight() -> f64 {
    0.7
}

fn default_reward_cost_weight() -> f64 {
    0.3
}

fn default_max_uncertainty_reduction() -> f64 {
    1.0
}

fn default_timeout_penalty() -> f64 {
    0.1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BinaryPrior {
    #[serde(default = "default_beta_parameter")]
    pub alpha: f64,
    #[serde(default = "default_beta_parameter")]
    pub beta: f64,
    #[serde(default = "default_cost")]
    pub cost: f64,
}

fn default_beta_parameter() -> f64 {
    1.0
}

fn default_cost() -> f64 {
    1.0
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContinuousPrior {
    pub mean: f64,
    pub variance: f64,
    /// Observation noise variance used when fusing a measurement
    pub noise_variance: f64,
    #[serde(default = "default_cost")]
    pub cost: f64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_enabled_metrics")]
    pub enabled: Vec<Metric>,

    #[serde(default = "default_liveness_prior")]
    pub liveness: BinaryPrior,

    #[serde(default = "default_latency_prior")]
    pub latency: ContinuousPrior,

    #[serde(default = "default_loss_prior")]
    pub loss: ContinuousPrior,

    #[serde(default = "default_bandwidth_prior")]
    pub bandwidth: ContinuousPrior,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_metrics(),
            liveness: default_liveness_prior(),
            latency: default_latency_prior(),
            loss: default_loss_prior(),
            bandwidth: default_bandwidth_prior(),
        }
    }
}

fn default_enabled_metrics() -> Vec<Metric> {
    Metric::ALL.to_vec()
}

fn default_liveness_prior() -> BinaryPrior {
    BinaryPrior {
        alpha: 1.0,
        beta: 1.0,
        cost: 1.0,
    }
}

fn default_latency_prior() -> ContinuousPrior {
    ContinuousPrior {
        mean: 10.0,
        variance: 100.0,
        noise_variance: 1.0,
        cost: 1.0,
    }
}

fn default_loss_prior() -> ContinuousPrior {
    ContinuousPrior {
        mean: 0.01,
        variance: 0.001,
        noise_variance: 0.001,
        cost: 2.0,
    }
}

fn default_bandwidth_prior() -> ContinuousPrior {
    ContinuousPrior {
        mean: 100.0,
        variance: 1000.0,
        noise_variance: 10.0,
        cost: 5.0,
    }
}

impl MetricsConfig {
    fn continuous(&self, metric: Metric) -> Option<&ContinuousPrior> {
        match metric {
            Metric::Liveness => None,
            Metric::Latency => Some(&self.latency),
            Metric::Loss => Some(&self.loss),
            Metric::Bandwidth => Some(&self.bandwidth),
        }
    }

    /// Prior distribution a fresh pair of this metric starts from.
    pub fn initial_distribution(&self, metric: Metric) -> StateDistribution {
        match self.continuous(metric) {
            None => StateDistribution::Binary(BetaBelief::new(
                self.liveness.alpha,
                self.liveness.beta,
            )),
            Some(prior) => StateDistribution::Continuous(GaussianBelief::new(
                prior.mean,
                prior.variance,
                prior.noise_variance,
            )),
        }
    }

    pub fn cost(&self, metric: Metric) -> f64 {
        self.continuous(metric)
            .map_or(self.liveness.cost, |prior| prior.cost)
    }

    /// Largest configured probe cost among the enabled metrics.
    pub fn max_cost(&self) -> f64 {
        self.enabled
            .iter()
            .map(|metric| self.cost(*metric))
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_base_success_rate")]
    pub base_success_rate: f64,

    #[serde(default = "default_latency_range")]
    pub latency_range_ms: (f64, f64),

    #[serde(default = "default_loss_rate")]
    pub loss_rate: f64,

    #[serde(default = "default_packets_per_loss_probe")]
    pub packets_per_loss_probe: u32,

    #[serde(default = "default_bandwidth_range")]
    pub bandwidth_range: (f64, f64),

    /// Probability that a probe fails at the executor instead of measuring
    #[serde(default)]
    pub error_rate: f64,

    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_success_rate: default_base_success_rate(),
            latency_range_ms: default_latency_range(),
            loss_rate: default_loss_rate(),
            packets_per_loss_probe: default_packets_per_loss_probe(),
            bandwidth_range: default_bandwidth_range(),
            error_rate: 0.0,
            seed: None,
        }
    }
}

fn default_base_success_rate() -> f64 {
    0.85
}

fn default_latency_range() -> (f64, f64) {
    (1.0, 100.0)
}

fn default_loss_rate() -> f64 {
    0.1
}

fn default_packets_per_loss_probe() -> u32 {
    10
}

fn default_bandwidth_range() -> (f64, f64) {
    (100.0, 1000.0)
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

/// Upper bound for every duration knob, ten years in seconds.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// A configured number of seconds as a chrono duration, saturating instead of panicking.
pub fn duration_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn invalid(msg: impl Into<String>) -> MonitorError {
    MonitorError::InvalidConfig(msg.into())
}

fn ensure_positive(name: &str, value: f64) -> MonitorResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and positive, got {value}")))
    }
}

fn ensure_non_negative(name: &str, value: f64) -> MonitorResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and non-negative, got {value}")))
    }
}

fn ensure_duration(name: &str, secs: u64) -> MonitorResult<()> {
    if secs == 0 {
        return Err(invalid(format!("{name} must be positive")));
    }
    if secs > MAX_DURATION_SECS {
        return Err(invalid(format!(
            "{name} must not exceed {MAX_DURATION_SECS}s, got {secs}s"
        )));
    }
    Ok(())
}

fn ensure_unit(name: &str, value: f64) -> MonitorResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}

impl Config {
    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> MonitorResult<()> {
        let scheduler = &self.scheduler;
        ensure_duration("scheduler.tick_interval", scheduler.tick_interval)?;
        ensure_duration("scheduler.min_reprobe_interval", scheduler.min_reprobe_interval)?;
        ensure_duration("scheduler.max_probe_interval", scheduler.max_probe_interval)?;
        ensure_duration("scheduler.probe_timeout", scheduler.probe_timeout)?;
        if scheduler.min_reprobe_interval > scheduler.max_probe_interval {
            return Err(invalid(
                "scheduler.min_reprobe_interval must not exceed scheduler.max_probe_interval",
            ));
        }
        if scheduler.top_k == 0 {
            return Err(invalid("scheduler.top_k must be at least 1"));
        }
        if scheduler.max_concurrent_probes == 0 {
            return Err(invalid("scheduler.max_concurrent_probes must be at least 1"));
        }
        ensure_non_negative("scheduler.interval_gain", scheduler.interval_gain)?;
        ensure_non_negative("scheduler.uncertainty_weight", scheduler.uncertainty_weight)?;
        ensure_non_negative("scheduler.stability_weight", scheduler.stability_weight)?;
        ensure_unit("scheduler.epsilon", scheduler.epsilon)?;

        let estimation = &self.estimation;
        ensure_duration("estimation.sliding_window", estimation.sliding_window)?;
        ensure_positive("estimation.max_uncertainty", estimation.max_uncertainty)?;
        ensure_positive("estimation.max_stability", estimation.max_stability)?;
        ensure_positive("estimation.target_stability", estimation.target_stability)?;

        let events = &self.events;
        ensure_unit("events.alert_threshold", events.alert_threshold)?;
        ensure_unit("events.critical_threshold", events.critical_threshold)?;
        if events.alert_threshold > events.critical_threshold {
            return Err(invalid(
                "events.alert_threshold must not exceed events.critical_threshold",
            ));
        }
        ensure_non_negative("events.hysteresis_margin", events.hysteresis_margin)?;
        if events.hysteresis_margin >= events.alert_threshold {
            return Err(invalid(
                "events.hysteresis_margin must be smaller than events.alert_threshold",
            ));
        }
        if events.history_size < events.min_history {
            return Err(invalid("events.history_size must hold at least events.min_history values"));
        }
        ensure_positive("events.deviation_scale", events.deviation_scale)?;
        ensure_duration("events.event_retention", events.event_retention)?;

        let reward = &self.reward;
        ensure_non_negative("reward.uncertainty_weight", reward.uncertainty_weight)?;
        ensure_non_negative("reward.cost_weight", reward.cost_weight)?;
        ensure_positive("reward.max_uncertainty_reduction", reward.max_uncertainty_reduction)?;
        ensure_non_negative("reward.timeout_penalty", reward.timeout_penalty)?;

        let metrics = &self.metrics;
        if metrics.enabled.is_empty() {
            return Err(invalid("metrics.enabled must name at least one metric"));
        }
        if !(metrics.liveness.alpha >= 1.0 && metrics.liveness.beta >= 1.0) {
            return Err(invalid("metrics.liveness prior parameters must be at least 1"));
        }
        ensure_non_negative("metrics.liveness.cost", metrics.liveness.cost)?;
        for metric in [Metric::Latency, Metric::Loss, Metric::Bandwidth] {
            if let Some(prior) = metrics.continuous(metric) {
                if !prior.mean.is_finite() {
                    return Err(invalid(format!("metrics.{metric}.mean must be finite")));
                }
                ensure_positive(&format!("metrics.{metric}.variance"), prior.variance)?;
                ensure_positive(&format!("metrics.{metric}.noise_variance"), prior.noise_variance)?;
                ensure_non_negative(&format!("metrics.{metric}.cost"), prior.cost)?;
            }
        }

        let simulation = &self.simulation;
        ensure_unit("simulation.base_success_rate", simulation.base_success_rate)?;
        ensure_unit("simulation.loss_rate", simulation.loss_rate)?;
        ensure_unit("simulation.error_rate", simulation.error_rate)?;
        if simulation.packets_per_loss_probe == 0 {
            return Err(invalid("simulation.packets_per_loss_probe must be positive"));
        }
        for (name, (low, high)) in [
            ("simulation.latency_range_ms", simulation.latency_range_ms),
            ("simulation.bandwidth_range", simulation.bandwidth_range),
        ] {
            if !(low.is_finite() && high.is_finite() && 0.0 <= low && low <= high) {
                return Err(invalid(format!("{name} must be a finite, ordered, non-negative range")));
            }
        }

        if let Some(Alert::Webhook(webhook)) = &self.alert {
            url::Url::parse(&webhook.url)
                .map_err(|e| invalid(format!("alert webhook url is invalid: {e}")))?;
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> MonitorResult<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
