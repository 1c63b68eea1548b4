//! Active probing scheduler
//!
//! Each pair moves through a small state machine:
//!
//! ```text
//! Idle ──dispatch──▶ Dispatched ──outcome──▶ Fused ───┐
//!   ▲                    │                            │
//!   │                    └──deadline/failure──▶ TimedOut
//!   └─────────────── (eligible again after its re-probe interval)
//! ```
//!
//! A tick scores every idle, eligible pair, lets the strategy bandit pick an
//! ordering, and dispatches the head of that ordering within the concurrency
//! budget. Fused and TimedOut behave as Idle for eligibility.

pub mod inflight;
pub mod strategy;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::{
    EntityId, PairKey,
    config::{EstimationConfig, MetricsConfig, SchedulerConfig, duration_secs},
    probe::{Dispatch, ProbeOutcome, ProbeTask, TaskId},
    state::StateStore,
    uncertainty,
};

pub use inflight::{InFlight, InFlightRegistry};
pub use strategy::{ArmStats, Candidate, Strategy, StrategySelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePhase {
    Idle,
    Dispatched,
    Fused,
    TimedOut,
}

/// Scheduling state of one pair
#[derive(Debug, Clone)]
struct PairSchedule {
    phase: ProbePhase,
    last_dispatch: Option<DateTime<Utc>>,
    /// Current re-probe interval, in seconds
    interval: f64,
}

/// What one tick decided.
#[derive(Debug, Clone, Default)]
pub struct TickPlan {
    /// `None` when there was nothing to schedule
    pub strategy: Option<Strategy>,
    pub candidates: usize,
    pub dispatched: Vec<Dispatch>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub tasks_dispatched: u64,
    pub in_flight: usize,
    pub strategies: BTreeMap<Strategy, ArmStats>,
}

pub struct ActiveProbingScheduler {
    config: SchedulerConfig,
    estimation: EstimationConfig,
    metrics: MetricsConfig,
    registry: InFlightRegistry,
    selector: StrategySelector,
    pairs: BTreeMap<PairKey, PairSchedule>,
    next_task_id: u64,
    ticks: u64,
    idle_ticks: u64,
    tasks_dispatched: u64,
}

fn seconds(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

impl ActiveProbingScheduler {
    pub fn new(
        config: SchedulerConfig,
        estimation: EstimationConfig,
        metrics: MetricsConfig,
    ) -> Self {
        let selector = StrategySelector::new(config.epsilon, config.seed);
        Self {
            config,
            estimation,
            metrics,
            registry: InFlightRegistry::new(),
            selector,
            pairs: BTreeMap::new(),
            next_task_id: 1,
            ticks: 0,
            idle_ticks: 0,
            tasks_dispatched: 0,
        }
    }

    fn schedule_mut(&mut self, key: &PairKey) -> &mut PairSchedule {
        let initial = self.config.min_reprobe_interval as f64;
        self.pairs.entry(key.clone()).or_insert(PairSchedule {
            phase: ProbePhase::Idle,
            last_dispatch: None,
            interval: initial,
        })
    }

    /// Idle and past its re-probe interval.
    fn is_eligible(&self, key: &PairKey, now: DateTime<Utc>) -> bool {
        if self.registry.contains(key) {
            return false;
        }
        match self.pairs.get(key) {
            None => true,
            Some(schedule) => match schedule.last_dispatch {
                None => true,
                Some(last) => now - last > seconds(schedule.interval),
            },
        }
    }

    fn score(&self, key: &PairKey, store: &StateStore) -> Option<Candidate> {
        let state = store.pair(key)?;
        let information_gain = uncertainty::information_gain(&state.distribution);
        let stability_score =
            uncertainty::stability_score(&state.tracker, self.estimation.max_stability);
        let priority = self.config.uncertainty_weight * information_gain
            + self.config.stability_weight * (1.0 - stability_score);

        Some(Candidate {
            key: key.clone(),
            information_gain,
            stability_score,
            priority,
            cost: self.metrics.cost(key.metric),
            last_dispatch: self.pairs.get(key).and_then(|s| s.last_dispatch),
        })
    }

    /// Run one scheduling tick over the store's pairs.
    #[instrument(skip(self, store, triggered), fields(in_flight = self.registry.len()))]
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        store: &StateStore,
        triggered: &BTreeSet<PairKey>,
    ) -> TickPlan {
        self.ticks += 1;

        let budget = self
            .config
            .max_concurrent_probes
            .saturating_sub(self.registry.len());

        let candidates: Vec<Candidate> = store
            .keys()
            .filter(|key| self.is_eligible(key, now))
            .filter_map(|key| self.score(key, store))
            .collect();

        for candidate in &candidates {
            trace!(
                pair = %candidate.key,
                priority = candidate.priority,
                gain = candidate.information_gain,
                stability = candidate.stability_score,
                "scored candidate"
            );
        }

        if candidates.is_empty() || budget == 0 {
            self.idle_ticks += 1;
            debug!(candidates = candidates.len(), budget, "nothing to dispatch");
            return TickPlan {
                strategy: None,
                candidates: candidates.len(),
                dispatched: vec![],
            };
        }

        let pool_size = candidates.len();
        let strategy = self.selector.select();
        let ordered = self.selector.order(strategy, candidates, triggered);
        let take = self.config.top_k.min(budget);

        let mut dispatched = Vec::with_capacity(take);
        for candidate in ordered.into_iter().take(take) {
            let task = ProbeTask {
                id: TaskId(self.next_task_id),
                key: candidate.key.clone(),
                expected_gain: candidate.information_gain,
                cost: candidate.cost,
                created_at: now,
            };
            let deadline = now
                .checked_add_signed(duration_secs(self.config.probe_timeout))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            let entry = InFlight {
                task_id: task.id,
                strategy,
                dispatched_at: now,
                deadline,
                expected_gain: task.expected_gain,
                cost: task.cost,
            };
            if let Err(e) = self.registry.insert(task.key.clone(), entry) {
                // unreachable while eligibility excludes in-flight pairs
                debug!("skipping candidate: {e}");
                continue;
            }

            self.next_task_id += 1;
            let schedule = self.schedule_mut(&task.key);
            schedule.phase = ProbePhase::Dispatched;
            schedule.last_dispatch = Some(now);

            dispatched.push(Dispatch { task, deadline });
        }

        self.tasks_dispatched += dispatched.len() as u64;
        debug!(
            %strategy,
            pool = pool_size,
            dispatched = dispatched.len(),
            "tick scheduled probes"
        );

        TickPlan {
            strategy: Some(strategy),
            candidates: pool_size,
            dispatched,
        }
    }

    /// Synthesize timeout outcomes for every probe past its deadline.
    ///
    /// The registry slots are freed when the outcomes are fused.
    pub fn expired_outcomes(&self, now: DateTime<Utc>) -> Vec<ProbeOutcome> {
        self.registry
            .expired(now)
            .into_iter()
            .map(|(key, task_id)| ProbeOutcome::timed_out(task_id, key, now))
            .collect()
    }

    /// Release the in-flight slot of an outcome's task.
    ///
    /// Returns `None` for stale outcomes: the task is no longer registered, or
    /// it was registered for a different pair.
    pub fn resolve(&mut self, outcome: &ProbeOutcome) -> Option<InFlight> {
        self.registry.take(outcome.task_id, &outcome.key)
    }

    /// Record how a resolved probe ended.
    pub fn settle(&mut self, key: &PairKey, phase: ProbePhase) {
        if let Some(schedule) = self.pairs.get_mut(key) {
            schedule.phase = phase;
        }
    }

    pub fn record_reward(&mut self, strategy: Strategy, reward: f64) {
        self.selector.record(strategy, reward);
    }

    /// Proportional update of the pair's re-probe interval from its stability score.
    ///
    /// `T' = T * (1 + gain * (1 - S / target))`, clamped to the configured bounds.
    pub fn adjust_interval(&mut self, key: &PairKey, stability_score: f64) -> f64 {
        let gain = self.config.interval_gain;
        let target = self.estimation.target_stability;
        let min = self.config.min_reprobe_interval as f64;
        let max = self.config.max_probe_interval as f64;

        let schedule = self.schedule_mut(key);
        let adjusted = schedule.interval * (1.0 + gain * (1.0 - stability_score / target));
        schedule.interval = adjusted.clamp(min, max);
        trace!(pair = %key, interval = schedule.interval, "adjusted re-probe interval");
        schedule.interval
    }

    /// Drop scheduling state and in-flight slots of a removed entity.
    pub fn forget_entity(&mut self, entity: &EntityId) -> usize {
        self.pairs.retain(|key, _| &key.entity != entity);
        self.registry.remove_entity(entity)
    }

    pub fn phase(&self, key: &PairKey) -> ProbePhase {
        if self.registry.contains(key) {
            return ProbePhase::Dispatched;
        }
        self.pairs.get(key).map_or(ProbePhase::Idle, |s| s.phase)
    }

    /// Current re-probe interval of a pair, in seconds.
    pub fn interval(&self, key: &PairKey) -> f64 {
        self.pairs
            .get(key)
            .map_or(self.config.min_reprobe_interval as f64, |s| s.interval)
    }

    pub fn last_dispatch(&self, key: &PairKey) -> Option<DateTime<Utc>> {
        self.pairs.get(key).and_then(|s| s.last_dispatch)
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks,
            idle_ticks: self.idle_ticks,
            tasks_dispatched: self.tasks_dispatched,
            in_flight: self.registry.len(),
            strategies: self.selector.arms().clone(),
        }
    }
}
