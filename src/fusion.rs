//! Result fusion unit
//!
//! Turns probe outcomes into belief updates and rewards:
//!
//! - stale outcomes (task no longer in flight) are dropped without side effects
//! - timeouts, executor failures and invalid measurements earn the timeout
//!   penalty and leave the belief untouched
//! - valid measurements are fused, and earn
//!   `w_u * uncertainty_reduction - w_c * normalized_cost`

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::{
    Metric, PairKey,
    config::{EstimationConfig, RewardConfig},
    error::{MonitorError, MonitorResult},
    probe::{ProbeOutcome, ProbeResult, TaskId},
    scheduler::{ActiveProbingScheduler, ProbePhase, Strategy},
    state::{Observation, StateDistribution, StateStore},
    uncertainty,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FusionReport {
    Fused {
        key: PairKey,
        strategy: Strategy,
        reward: f64,
        uncertainty_reduction: f64,
        before: StateDistribution,
        after: StateDistribution,
        interval: f64,
    },
    TimedOut {
        key: PairKey,
        strategy: Strategy,
        reward: f64,
        reason: Option<String>,
    },
    Rejected {
        key: PairKey,
        strategy: Strategy,
        reward: f64,
        reason: String,
    },
    Stale {
        key: PairKey,
        task_id: TaskId,
    },
}

impl FusionReport {
    pub fn key(&self) -> &PairKey {
        match self {
            FusionReport::Fused { key, .. }
            | FusionReport::TimedOut { key, .. }
            | FusionReport::Rejected { key, .. }
            | FusionReport::Stale { key, .. } => key,
        }
    }

    pub fn reward(&self) -> Option<f64> {
        match self {
            FusionReport::Fused { reward, .. }
            | FusionReport::TimedOut { reward, .. }
            | FusionReport::Rejected { reward, .. } => Some(*reward),
            FusionReport::Stale { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FusionStats {
    pub fused: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub rejected: u64,
    pub stale: u64,
    pub cumulative_reward: f64,
}

impl FusionStats {
    /// Share of resolved probes that produced a fused measurement.
    pub fn success_rate(&self) -> f64 {
        let resolved = self.fused + self.timed_out + self.failed + self.rejected;
        if resolved == 0 {
            return 0.0;
        }
        self.fused as f64 / resolved as f64
    }
}

/// Check a measurement against the metric's domain before fusion.
pub fn validate_measurement(metric: Metric, observation: &Observation) -> MonitorResult<()> {
    match (metric, observation) {
        (Metric::Liveness, Observation::Up(_)) => Ok(()),
        (Metric::Liveness, Observation::Value(value)) => Err(MonitorError::InvalidMeasurement(
            format!("liveness expects an up/down outcome, got {value}"),
        )),
        (_, Observation::Up(_)) => Err(MonitorError::InvalidMeasurement(format!(
            "{metric} expects a value, got an up/down outcome"
        ))),
        (_, Observation::Value(value)) if !value.is_finite() => Err(
            MonitorError::InvalidMeasurement(format!("{metric} value {value} is not finite")),
        ),
        (Metric::Loss, Observation::Value(value)) if !(0.0..=1.0).contains(value) => Err(
            MonitorError::InvalidMeasurement(format!("loss rate {value} is outside [0, 1]")),
        ),
        (Metric::Latency | Metric::Bandwidth, Observation::Value(value)) if *value < 0.0 => Err(
            MonitorError::InvalidMeasurement(format!("{metric} value {value} is negative")),
        ),
        _ => Ok(()),
    }
}

pub struct ResultFusionUnit {
    reward: RewardConfig,
    max_stability: f64,
    max_cost: f64,
    stats: FusionStats,
}

impl ResultFusionUnit {
    pub fn new(reward: RewardConfig, estimation: &EstimationConfig, max_cost: f64) -> Self {
        Self {
            reward,
            max_stability: estimation.max_stability,
            max_cost,
            stats: FusionStats::default(),
        }
    }

    fn penalty(&self) -> f64 {
        -self.reward.timeout_penalty
    }

    /// Apply one outcome. Never fails: every per-outcome problem is reported.
    #[instrument(skip(self, outcome, store, scheduler), fields(task_id = %outcome.task_id, pair = %outcome.key))]
    pub fn fuse(
        &mut self,
        outcome: ProbeOutcome,
        store: &mut StateStore,
        scheduler: &mut ActiveProbingScheduler,
    ) -> FusionReport {
        let Some(in_flight) = scheduler.resolve(&outcome) else {
            debug!("discarding stale outcome");
            self.stats.stale += 1;
            return FusionReport::Stale {
                key: outcome.key,
                task_id: outcome.task_id,
            };
        };
        let key = outcome.key;
        let strategy = in_flight.strategy;

        let observation = match outcome.result {
            ProbeResult::Completed(observation) => observation,
            ProbeResult::TimedOut => {
                debug!("probe timed out");
                self.stats.timed_out += 1;
                return self.transient(key, strategy, None, scheduler);
            }
            ProbeResult::Failed(reason) => {
                debug!("probe failed: {reason}");
                self.stats.failed += 1;
                return self.transient(key, strategy, Some(reason), scheduler);
            }
        };

        let before = match store.pair(&key) {
            Some(state) => state.distribution,
            None => return self.reject(key, strategy, "pair no longer tracked", scheduler),
        };

        if let Err(e) = validate_measurement(key.metric, &observation) {
            warn!("rejecting measurement: {e}");
            return self.reject(key, strategy, &e.to_string(), scheduler);
        }

        let after = match store.apply_observation(&key, &observation, outcome.completed_at) {
            Ok(after) => after,
            Err(e) => {
                warn!("rejecting measurement: {e}");
                return self.reject(key, strategy, &e.to_string(), scheduler);
            }
        };

        let gain_before = uncertainty::information_gain(&before);
        let gain_after = uncertainty::information_gain(&after);
        let uncertainty_reduction = ((gain_before - gain_after)
            / self.reward.max_uncertainty_reduction)
            .clamp(0.0, 1.0);
        let normalized_cost = if self.max_cost > 0.0 {
            (in_flight.cost / self.max_cost).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let reward = self.reward.uncertainty_weight * uncertainty_reduction
            - self.reward.cost_weight * normalized_cost;

        scheduler.settle(&key, ProbePhase::Fused);
        scheduler.record_reward(strategy, reward);

        let stability = store
            .tracker(&key)
            .filter(|tracker| tracker.len() >= 2)
            .map(|tracker| uncertainty::stability_score(tracker, self.max_stability));
        let interval = match stability {
            Some(score) => scheduler.adjust_interval(&key, score),
            None => scheduler.interval(&key),
        };

        self.stats.fused += 1;
        self.stats.cumulative_reward += reward;
        trace!(reward, uncertainty_reduction, interval, "fused observation");

        FusionReport::Fused {
            key,
            strategy,
            reward,
            uncertainty_reduction,
            before,
            after,
            interval,
        }
    }

    fn transient(
        &mut self,
        key: PairKey,
        strategy: Strategy,
        reason: Option<String>,
        scheduler: &mut ActiveProbingScheduler,
    ) -> FusionReport {
        let reward = self.penalty();
        scheduler.settle(&key, ProbePhase::TimedOut);
        scheduler.record_reward(strategy, reward);
        self.stats.cumulative_reward += reward;

        FusionReport::TimedOut {
            key,
            strategy,
            reward,
            reason,
        }
    }

    fn reject(
        &mut self,
        key: PairKey,
        strategy: Strategy,
        reason: &str,
        scheduler: &mut ActiveProbingScheduler,
    ) -> FusionReport {
        let reward = self.penalty();
        scheduler.settle(&key, ProbePhase::TimedOut);
        scheduler.record_reward(strategy, reward);
        self.stats.rejected += 1;
        self.stats.cumulative_reward += reward;

        FusionReport::Rejected {
            key,
            strategy,
            reward,
            reason: reason.to_string(),
        }
    }

    pub fn stats(&self) -> &FusionStats {
        &self.stats
    }
}
