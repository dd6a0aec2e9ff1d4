use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::item::{EntityId, EntityItem, PhysicalProperties};

/// Entity graph shared between the network, scripts and the simulation
pub type SharedEntityTree = Arc<RwLock<EntityTree>>;

/// Owns every entity in the scene, keyed by id
#[derive(Debug)]
pub struct EntityTree {
    entities: FxHashMap<EntityId, EntityItem>,
    next_entity_id: u32,
}

impl Default for EntityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTree {
    pub fn new() -> Self {
        Self {
            entities: FxHashMap::default(),
            next_entity_id: 1,
        }
    }

    /// Wrap the tree in its lock
    pub fn into_shared(self) -> SharedEntityTree {
        Arc::new(RwLock::new(self))
    }

    pub fn add_entity(&mut self, properties: PhysicalProperties) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        self.entities.insert(id, EntityItem::new(id, properties));
        id
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Option<EntityItem> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityItem> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityItem> {
        self.entities.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityItem> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EntityItem> {
        self.entities.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut tree = EntityTree::new();
        let a = tree.add_entity(PhysicalProperties::default());
        let b = tree.add_entity(PhysicalProperties::default());
        assert_ne!(a, b);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_entity() {
        let mut tree = EntityTree::new();
        let id = tree.add_entity(PhysicalProperties::default());
        assert!(tree.remove_entity(id).is_some());
        assert!(tree.get(id).is_none());
        assert!(tree.is_empty());
    }
}
