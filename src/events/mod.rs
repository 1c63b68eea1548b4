//! Event manager
//!
//! After every fused update the manager derives an anomaly score in `[0, 1]`
//! for the pair and runs it through one hysteresis machine per severity:
//!
//! - liveness scores `1 - confidence`
//! - continuous metrics score the deviation of the posterior mean from the
//!   pair's recent means, in units of `deviation_scale` standard deviations
//!
//! A raise is emitted to the alert sink once, and so is the matching clear.

pub mod hysteresis;
pub mod sink;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    EntityId, Metric, PairKey,
    config::{EventsConfig, duration_secs},
    state::StateDistribution,
};

pub use hysteresis::HysteresisEvaluation;
pub use sink::{AlertSink, BroadcastSink, CollectingSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LivenessLow,
    ValueDeviation,
}

impl From<Metric> for EventKind {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Liveness => EventKind::LivenessLow,
            _ => EventKind::ValueDeviation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: u64,
    pub entity: EntityId,
    pub metric: Metric,
    pub severity: Severity,
    pub kind: EventKind,
    /// Anomaly score that raised the event
    pub score: f64,
    pub raised_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_open(&self) -> bool {
        self.cleared_at.is_none()
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.entity.clone(), self.metric)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventStats {
    pub open: usize,
    pub recent: usize,
    pub raised: u64,
    pub cleared: u64,
    pub raised_by_severity: BTreeMap<Severity, u64>,
    pub raised_by_metric: BTreeMap<Metric, u64>,
    pub raised_by_entity: BTreeMap<EntityId, u64>,
    pub active_triggers: usize,
}

/// Open events grouped by what kind of problem they describe.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnomalySummary {
    pub liveness_issues: Vec<Event>,
    pub value_deviations: Vec<Event>,
}

pub struct EventManager {
    config: EventsConfig,
    core_entities: HashSet<EntityId>,
    sink: Box<dyn AlertSink>,
    open: BTreeMap<(PairKey, Severity), Event>,
    recent: VecDeque<Event>,
    /// Recent posterior means per continuous pair
    history: HashMap<PairKey, VecDeque<f64>>,
    next_id: u64,
    stats: EventStats,
}

impl EventManager {
    pub fn new(config: EventsConfig, sink: Box<dyn AlertSink>) -> Self {
        let core_entities = config.core_entities.iter().cloned().collect();
        Self {
            config,
            core_entities,
            sink,
            open: BTreeMap::new(),
            recent: VecDeque::new(),
            history: HashMap::new(),
            next_id: 1,
            stats: EventStats::default(),
        }
    }

    fn thresholds(&self) -> [(Severity, f64); 2] {
        [
            (Severity::Warning, self.config.alert_threshold),
            (Severity::Critical, self.config.critical_threshold),
        ]
    }

    /// Score the pair's new state and advance its hysteresis machines.
    ///
    /// Returns the events emitted by this update, raises and clears alike.
    #[instrument(skip(self, distribution), fields(pair = %key))]
    pub fn on_fused(
        &mut self,
        key: &PairKey,
        distribution: &StateDistribution,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let score = self.anomaly_score(key, distribution);
        let mut emitted = vec![];

        for (severity, threshold) in self.thresholds() {
            let slot = (key.clone(), severity);
            let raised = self.open.contains_key(&slot);
            let evaluation = HysteresisEvaluation::evaluate(
                score,
                threshold,
                self.config.hysteresis_margin,
                raised,
            );

            match evaluation {
                HysteresisEvaluation::Clear | HysteresisEvaluation::Held => {}
                HysteresisEvaluation::Raise => {
                    let event = Event {
                        id: self.next_id,
                        entity: key.entity.clone(),
                        metric: key.metric,
                        severity,
                        kind: key.metric.into(),
                        score,
                        raised_at: now,
                        cleared_at: None,
                    };
                    self.next_id += 1;
                    info!(?severity, score, "raising event");
                    self.record_raise(&event);
                    self.sink.emit(&event);
                    self.open.insert(slot, event.clone());
                    emitted.push(event);
                }
                HysteresisEvaluation::Recover => {
                    if let Some(event) = self.close(&slot, now) {
                        emitted.push(event);
                    }
                }
            }
        }

        self.expire_recent(now);
        emitted
    }

    /// Anomaly score of the pair's current belief, in `[0, 1]`.
    ///
    /// For continuous metrics this also appends the current mean to the
    /// pair's history, after scoring against the previous means.
    fn anomaly_score(&mut self, key: &PairKey, distribution: &StateDistribution) -> f64 {
        match distribution {
            StateDistribution::Binary(belief) => (1.0 - belief.confidence()).clamp(0.0, 1.0),
            StateDistribution::Continuous(belief) => {
                let history = self.history.entry(key.clone()).or_default();
                let score = deviation_score(
                    history,
                    belief.mean,
                    self.config.min_history,
                    self.config.deviation_scale,
                );

                history.push_back(belief.mean);
                while history.len() > self.config.history_size {
                    history.pop_front();
                }
                score
            }
        }
    }

    fn record_raise(&mut self, event: &Event) {
        self.stats.raised += 1;
        *self.stats.raised_by_severity.entry(event.severity).or_default() += 1;
        *self.stats.raised_by_metric.entry(event.metric).or_default() += 1;
        *self
            .stats
            .raised_by_entity
            .entry(event.entity.clone())
            .or_default() += 1;
    }

    fn close(&mut self, slot: &(PairKey, Severity), now: DateTime<Utc>) -> Option<Event> {
        let mut event = self.open.remove(slot)?;
        event.cleared_at = Some(now);
        info!(severity = ?event.severity, pair = %slot.0, "clearing event");

        self.stats.cleared += 1;
        self.sink.emit(&event);
        self.recent.push_back(event.clone());
        Some(event)
    }

    /// Pairs that currently deserve focused probing.
    ///
    /// Every pair with an open event is triggered. A latency event on a core
    /// entity also triggers that entity's loss and bandwidth pairs.
    pub fn triggers(&self) -> BTreeSet<PairKey> {
        let mut triggered = BTreeSet::new();
        for (key, _) in self.open.keys() {
            triggered.insert(key.clone());
            if key.metric == Metric::Latency && self.core_entities.contains(&key.entity) {
                triggered.insert(PairKey::new(key.entity.clone(), Metric::Loss));
                triggered.insert(PairKey::new(key.entity.clone(), Metric::Bandwidth));
            }
        }
        triggered
    }

    /// Close every open event of a removed entity and drop its history.
    pub fn forget_entity(&mut self, entity: &EntityId, now: DateTime<Utc>) -> Vec<Event> {
        let slots: Vec<(PairKey, Severity)> = self
            .open
            .keys()
            .filter(|(key, _)| &key.entity == entity)
            .cloned()
            .collect();

        let closed: Vec<Event> = slots
            .iter()
            .filter_map(|slot| self.close(slot, now))
            .collect();
        if !closed.is_empty() {
            debug!(%entity, closed = closed.len(), "closed events of removed entity");
        }

        self.history.retain(|key, _| &key.entity != entity);
        self.stats.raised_by_entity.remove(entity);
        closed
    }

    /// Drop cleared events past their retention, and beyond the size bound.
    pub fn expire_recent(&mut self, now: DateTime<Utc>) {
        let cutoff = now.checked_sub_signed(duration_secs(self.config.event_retention));
        while cutoff.is_some_and(|cutoff| {
            self.recent
                .front()
                .is_some_and(|event| event.cleared_at.is_some_and(|at| at < cutoff))
        }) {
            self.recent.pop_front();
        }
        while self.recent.len() > self.config.max_recent_events {
            self.recent.pop_front();
        }
    }

    pub fn is_open(&self, key: &PairKey, severity: Severity) -> bool {
        self.open.contains_key(&(key.clone(), severity))
    }

    pub fn open_events(&self) -> Vec<Event> {
        self.open.values().cloned().collect()
    }

    /// Cleared events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Open and recently cleared events of one entity.
    pub fn events_for_entity(&self, entity: &EntityId) -> Vec<Event> {
        self.open
            .values()
            .chain(self.recent.iter().rev())
            .filter(|event| &event.entity == entity)
            .cloned()
            .collect()
    }

    pub fn anomaly_summary(&self) -> AnomalySummary {
        let mut summary = AnomalySummary::default();
        for event in self.open.values() {
            match event.kind {
                EventKind::LivenessLow => summary.liveness_issues.push(event.clone()),
                EventKind::ValueDeviation => summary.value_deviations.push(event.clone()),
            }
        }
        summary
    }

    pub fn stats(&self) -> EventStats {
        EventStats {
            open: self.open.len(),
            recent: self.recent.len(),
            active_triggers: self.triggers().len(),
            ..self.stats.clone()
        }
    }
}

/// Deviation of `current` from the mean of `history`, scaled to `[0, 1]`.
///
/// Needs at least `min_history` values with a non-zero spread, otherwise 0.
fn deviation_score(
    history: &VecDeque<f64>,
    current: f64,
    min_history: usize,
    deviation_scale: f64,
) -> f64 {
    if history.is_empty() || history.len() < min_history {
        return 0.0;
    }

    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let std = (history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if !(std > 0.0) {
        return 0.0;
    }

    ((current - mean).abs() / (deviation_scale * std)).min(1.0)
}
