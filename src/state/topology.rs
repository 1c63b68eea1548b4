use std::collections::BTreeMap;

use tracing::debug;

use crate::{Entity, EntityId, EntityKind, Metric};

use super::store::StateStore;

/// Entities currently reported by the topology collaborator.
///
/// The store is the only place that knows which entities exist. Topology
/// callbacks go through it, and it keeps the state store's pair set in step.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    entities: BTreeMap<EntityId, Entity>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity and create a pair for every enabled metric.
    ///
    /// Returns `false` if the entity was already known.
    pub fn on_entity_added(
        &mut self,
        entity: Entity,
        metrics: &[Metric],
        store: &mut StateStore,
    ) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }

        for metric in metrics {
            store.ensure(&entity.id, *metric);
        }
        debug!(entity = %entity.id, kind = ?entity.kind, "entity added");
        self.entities.insert(entity.id.clone(), entity);
        true
    }

    /// Forget an entity and purge its pairs. Returns the removed entity, if it was known.
    pub fn on_entity_removed(&mut self, id: &EntityId, store: &mut StateStore) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        let purged = store.remove(id);
        debug!(entity = %id, purged, "entity removed");
        Some(entity)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
