//! The monitoring control loop, without any runtime attached.
//!
//! [`Monitor`] owns every component and serializes all mutation: a tick and
//! an outcome are each applied in one `&mut self` call, so a tick never sees
//! half-fused state. Time is always passed in, which keeps the loop
//! deterministic under test. The actor in [`crate::actors::monitor`] drives
//! it with wall-clock time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    Entity, EntityId, EntityKind, Metric, PairKey,
    config::{Config, duration_secs},
    error::MonitorResult,
    events::{AlertSink, AnomalySummary, Event, EventManager, EventStats},
    fusion::{FusionReport, FusionStats, ResultFusionUnit},
    probe::{Dispatch, ProbeOutcome},
    scheduler::{ActiveProbingScheduler, ProbePhase, SchedulerStats, Strategy},
    state::{PairState, StateDistribution, StateStore, TopologyStore},
    uncertainty,
};

/// Everything that happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub round: u64,
    pub strategy: Option<Strategy>,
    pub candidates: usize,
    pub dispatched: Vec<Dispatch>,
    /// Probes that passed their deadline before this tick
    pub timed_out: Vec<FusionReport>,
}

/// Result of applying one outcome.
#[derive(Debug, Clone)]
pub struct OutcomeReport {
    pub fusion: FusionReport,
    pub events: Vec<Event>,
}

/// Current estimate of one pair.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub entity: EntityId,
    pub metric: Metric,
    pub distribution: StateDistribution,
    pub confidence: Option<f64>,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub entropy: f64,
    pub information_gain: f64,
    pub stability_score: f64,
    pub samples: usize,
    pub observations: u64,
    pub last_observed: Option<DateTime<Utc>>,
    pub phase: ProbePhase,
    pub probe_interval: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityRanking {
    pub entity: EntityId,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub rounds: u64,
    pub uptime_secs: i64,
    pub entities: usize,
    pub links: usize,
    pub hosts: usize,
    pub pairs: usize,
    pub scheduler: SchedulerStats,
    pub fusion: FusionStats,
    pub success_rate: f64,
    pub events: EventStats,
}

pub struct Monitor {
    config: Config,
    topology: TopologyStore,
    store: StateStore,
    scheduler: ActiveProbingScheduler,
    fusion: ResultFusionUnit,
    events: EventManager,
    rounds: u64,
    started_at: DateTime<Utc>,
}

impl Monitor {
    /// Build a monitor from a validated configuration.
    ///
    /// Entities listed in the configuration are registered immediately.
    pub fn new(config: Config, sink: Box<dyn AlertSink>, now: DateTime<Utc>) -> MonitorResult<Self> {
        config.validate()?;

        let store = StateStore::new(
            config.metrics.clone(),
            duration_secs(config.estimation.sliding_window),
        );
        let scheduler = ActiveProbingScheduler::new(
            config.scheduler.clone(),
            config.estimation.clone(),
            config.metrics.clone(),
        );
        let fusion = ResultFusionUnit::new(
            config.reward.clone(),
            &config.estimation,
            config.metrics.max_cost(),
        );
        let events = EventManager::new(config.events.clone(), sink);

        let mut monitor = Self {
            topology: TopologyStore::new(),
            store,
            scheduler,
            fusion,
            events,
            rounds: 0,
            started_at: now,
            config,
        };

        let seed = std::mem::take(&mut monitor.config.entities);
        for entity in &seed {
            monitor.on_entity_added(entity.clone());
        }
        monitor.config.entities = seed;

        Ok(monitor)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Topology callback: a new entity appeared.
    pub fn on_entity_added(&mut self, entity: Entity) -> bool {
        self.topology
            .on_entity_added(entity, &self.config.metrics.enabled, &mut self.store)
    }

    /// Topology callback: an entity is gone.
    ///
    /// Its in-flight probes are dropped, so their outcomes arrive as stale,
    /// and its open events are cleared.
    pub fn on_entity_removed(&mut self, id: &EntityId, now: DateTime<Utc>) -> bool {
        if self.topology.on_entity_removed(id, &mut self.store).is_none() {
            return false;
        }
        let dropped = self.scheduler.forget_entity(id);
        let cleared = self.events.forget_entity(id, now);
        debug!(entity = %id, dropped, cleared = cleared.len(), "forgot entity");
        true
    }

    /// Time out every probe past its deadline.
    pub fn expire_deadlines(&mut self, now: DateTime<Utc>) -> Vec<FusionReport> {
        self.scheduler
            .expired_outcomes(now)
            .into_iter()
            .map(|outcome| {
                self.fusion
                    .fuse(outcome, &mut self.store, &mut self.scheduler)
            })
            .collect()
    }

    /// Run one scheduling round.
    #[instrument(skip(self), fields(round = self.rounds + 1))]
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.rounds += 1;

        let timed_out = self.expire_deadlines(now);
        self.store.expire_windows(now);
        self.events.expire_recent(now);

        let triggered = self.events.triggers();
        let plan = self.scheduler.tick(now, &self.store, &triggered);

        if !plan.dispatched.is_empty() || !timed_out.is_empty() {
            info!(
                dispatched = plan.dispatched.len(),
                timed_out = timed_out.len(),
                in_flight = self.scheduler.in_flight(),
                "round complete"
            );
        }

        TickReport {
            round: self.rounds,
            strategy: plan.strategy,
            candidates: plan.candidates,
            dispatched: plan.dispatched,
            timed_out,
        }
    }

    /// Apply one probe outcome and evaluate events on the fused state.
    pub fn handle_outcome(&mut self, outcome: ProbeOutcome) -> OutcomeReport {
        let at = outcome.completed_at;
        let fusion = self
            .fusion
            .fuse(outcome, &mut self.store, &mut self.scheduler);

        let events = match &fusion {
            FusionReport::Fused { key, after, .. } => self.events.on_fused(key, after, at),
            _ => vec![],
        };

        OutcomeReport { fusion, events }
    }

    pub fn estimate(&self, entity: &EntityId, metric: Metric) -> Option<Estimate> {
        let key = PairKey::new(entity.clone(), metric);
        let state = self.store.pair(&key)?;
        let distribution = state.distribution;

        Some(Estimate {
            entity: entity.clone(),
            metric,
            confidence: distribution.confidence(),
            mean: distribution.mean(),
            variance: distribution.variance(),
            entropy: uncertainty::entropy(&distribution),
            information_gain: uncertainty::information_gain(&distribution),
            stability_score: uncertainty::stability_score(
                &state.tracker,
                self.config.estimation.max_stability,
            ),
            samples: state.tracker.len(),
            observations: state.observations,
            last_observed: state.last_observed,
            phase: self.scheduler.phase(&key),
            probe_interval: self.scheduler.interval(&key),
            distribution,
        })
    }

    fn rank_entities<F>(&self, limit: usize, score: F) -> Vec<EntityRanking>
    where
        F: Fn(&PairState) -> f64,
    {
        let mut totals: BTreeMap<&EntityId, (f64, usize)> = BTreeMap::new();
        for (key, state) in self.store.iter() {
            let entry = totals.entry(&key.entity).or_default();
            entry.0 += score(state);
            entry.1 += 1;
        }

        let mut ranking: Vec<EntityRanking> = totals
            .into_iter()
            .map(|(entity, (sum, count))| EntityRanking {
                entity: entity.clone(),
                score: sum / count as f64,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        ranking.truncate(limit);
        ranking
    }

    /// Entities ranked by mean normalized entropy across their metrics.
    pub fn top_uncertain(&self, limit: usize) -> Vec<EntityRanking> {
        let max_uncertainty = self.config.estimation.max_uncertainty;
        self.rank_entities(limit, |state| {
            uncertainty::normalized_uncertainty(&state.distribution, max_uncertainty)
        })
    }

    /// Entities ranked by mean stability score across their metrics.
    pub fn top_unstable(&self, limit: usize) -> Vec<EntityRanking> {
        let max_stability = self.config.estimation.max_stability;
        self.rank_entities(limit, |state| {
            uncertainty::stability_score(&state.tracker, max_stability)
        })
    }

    pub fn open_events(&self) -> Vec<Event> {
        self.events.open_events()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.events.recent_events(limit)
    }

    pub fn events_for_entity(&self, entity: &EntityId) -> Vec<Event> {
        self.events.events_for_entity(entity)
    }

    pub fn anomaly_summary(&self) -> AnomalySummary {
        self.events.anomaly_summary()
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> MonitorStats {
        let fusion = self.fusion.stats().clone();
        MonitorStats {
            rounds: self.rounds,
            uptime_secs: (now - self.started_at).num_seconds(),
            entities: self.topology.len(),
            links: self.topology.count(EntityKind::Link),
            hosts: self.topology.count(EntityKind::Host),
            pairs: self.store.len(),
            scheduler: self.scheduler.stats(),
            success_rate: fusion.success_rate(),
            fusion,
            events: self.events.stats(),
        }
    }
}
