use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::{
    EntityId, PairKey,
    error::{MonitorError, MonitorResult},
    probe::TaskId,
};

use super::strategy::Strategy;

/// Bookkeeping for one outstanding probe
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    pub task_id: TaskId,
    pub strategy: Strategy,
    pub dispatched_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub expected_gain: f64,
    pub cost: f64,
}

/// Pairs with a dispatched, unresolved probe. A pair appears at most once.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    by_pair: BTreeMap<PairKey, InFlight>,
    by_task: HashMap<TaskId, PairKey>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PairKey, entry: InFlight) -> MonitorResult<()> {
        if self.by_pair.contains_key(&key) {
            return Err(MonitorError::AlreadyInFlight(key.to_string()));
        }
        self.by_task.insert(entry.task_id, key.clone());
        self.by_pair.insert(key, entry);
        Ok(())
    }

    /// Remove the entry for `task_id`, provided it is registered under `key`.
    pub fn take(&mut self, task_id: TaskId, key: &PairKey) -> Option<InFlight> {
        if self.by_task.get(&task_id) != Some(key) {
            return None;
        }
        self.by_task.remove(&task_id);
        self.by_pair.remove(key)
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.by_pair.contains_key(key)
    }

    pub fn get(&self, key: &PairKey) -> Option<&InFlight> {
        self.by_pair.get(key)
    }

    /// Entries whose deadline is at or before `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<(PairKey, TaskId)> {
        self.by_pair
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(key, entry)| (key.clone(), entry.task_id))
            .collect()
    }

    /// Drop every entry of an entity; later outcomes for them become stale.
    pub fn remove_entity(&mut self, entity: &EntityId) -> usize {
        let keys: Vec<PairKey> = self
            .by_pair
            .keys()
            .filter(|key| &key.entity == entity)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(entry) = self.by_pair.remove(key) {
                self.by_task.remove(&entry.task_id);
            }
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}
