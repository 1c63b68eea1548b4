use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::{
    EntityId, Metric, PairKey,
    config::MetricsConfig,
    error::{MonitorError, MonitorResult},
};

use super::{
    distribution::{BeliefModel, Observation, StateDistribution},
    stability::StabilityTracker,
};

/// Everything the store keeps for one pair
#[derive(Debug, Clone)]
pub struct PairState {
    pub distribution: StateDistribution,
    pub tracker: StabilityTracker,
    pub observations: u64,
    pub last_observed: Option<DateTime<Utc>>,
}

/// Owner of every pair's belief and stability window.
///
/// Mutation goes through [`StateStore::apply_observation`] only. An update is
/// computed on a copy and committed in one assignment, so a failed update
/// never leaves a half-applied belief behind.
#[derive(Debug, Clone)]
pub struct StateStore {
    priors: MetricsConfig,
    window: Duration,
    pairs: BTreeMap<PairKey, PairState>,
}

impl StateStore {
    pub fn new(priors: MetricsConfig, window: Duration) -> Self {
        Self {
            priors,
            window,
            pairs: BTreeMap::new(),
        }
    }

    /// Snapshot of the pair's current belief.
    pub fn get(&self, entity: &EntityId, metric: Metric) -> Option<StateDistribution> {
        self.pairs
            .get(&PairKey::new(entity.clone(), metric))
            .map(|state| state.distribution.to_snapshot())
    }

    pub fn pair(&self, key: &PairKey) -> Option<&PairState> {
        self.pairs.get(key)
    }

    /// Create the pair with its metric's prior. Returns `false` if it already existed.
    pub fn ensure(&mut self, entity: &EntityId, metric: Metric) -> bool {
        let key = PairKey::new(entity.clone(), metric);
        if self.pairs.contains_key(&key) {
            return false;
        }

        trace!(pair = %key, "creating pair with prior");
        self.pairs.insert(
            key,
            PairState {
                distribution: self.priors.initial_distribution(metric),
                tracker: StabilityTracker::new(self.window),
                observations: 0,
                last_observed: None,
            },
        );
        true
    }

    /// Fuse an observation into the pair's belief and record its raw value.
    pub fn apply_observation(
        &mut self,
        key: &PairKey,
        observation: &Observation,
        at: DateTime<Utc>,
    ) -> MonitorResult<StateDistribution> {
        let state = self
            .pairs
            .get_mut(key)
            .ok_or_else(|| MonitorError::UnknownPair(key.to_string()))?;

        let mut updated = state.distribution;
        updated.update(observation)?;

        state.distribution = updated;
        state.tracker.insert(at, observation.raw_value());
        state.observations += 1;
        state.last_observed = Some(state.last_observed.map_or(at, |last| last.max(at)));

        Ok(updated)
    }

    /// Purge every metric of a retired entity. Returns the number of pairs removed.
    pub fn remove(&mut self, entity: &EntityId) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|key, _| &key.entity != entity);
        before - self.pairs.len()
    }

    /// Evict stale samples from every stability window.
    pub fn expire_windows(&mut self, now: DateTime<Utc>) {
        for state in self.pairs.values_mut() {
            state.tracker.expire(now);
        }
    }

    pub fn tracker(&self, key: &PairKey) -> Option<&StabilityTracker> {
        self.pairs.get(key).map(|state| &state.tracker)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PairKey> {
        self.pairs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, &PairState)> {
        self.pairs.iter()
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.pairs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
