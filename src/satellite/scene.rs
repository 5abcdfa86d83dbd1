//! Primitive container consumed by the lifecycle manager
//!
//! The renderer owns the real scene; the core only needs to add, remove and
//! look up primitives by identity and to ask for a redraw. [`SceneGraph`] is
//! the in-memory container used headlessly and in tests.

use std::collections::HashMap;

use crate::core::{CartesianPosition, GeodeticPosition};
use crate::satellite::components::{BatchKey, ComponentKind, GraphicDescriptor, ObjectId};

/// Identity of a primitive in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveId {
    /// Exclusive component of one object
    Component(ObjectId, ComponentKind),
    /// Shared primitive; the generation changes with every completed rebuild
    Batch(BatchKey, u64),
    GroundStation,
}

/// One member's geometry inside a shared primitive
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedInstance {
    pub owner: ObjectId,
    pub positions: Vec<CartesianPosition>,
    pub closed: bool,
    pub show: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Single(GraphicDescriptor),
    Batched {
        key: BatchKey,
        instances: Vec<BatchedInstance>,
    },
    GroundStation(GeodeticPosition),
}

pub trait PrimitiveContainer {
    /// Insert or replace the primitive stored under `id`
    fn add(&mut self, id: PrimitiveId, primitive: Primitive);

    /// Returns false when nothing was stored under `id`
    fn remove(&mut self, id: PrimitiveId) -> bool;

    fn contains(&self, id: PrimitiveId) -> bool;

    fn get(&self, id: PrimitiveId) -> Option<&Primitive>;

    fn get_mut(&mut self, id: PrimitiveId) -> Option<&mut Primitive>;

    fn ids(&self) -> Vec<PrimitiveId>;

    fn request_redraw(&mut self);

    /// Toggle the visibility of an exclusive primitive
    fn set_shown(&mut self, id: PrimitiveId, show: bool) -> bool {
        match self.get_mut(id) {
            Some(Primitive::Single(descriptor)) => {
                descriptor.show = show;
                true
            }
            _ => false,
        }
    }

    /// Toggle one member inside a shared primitive without rebuilding it
    fn set_instance_shown(&mut self, id: PrimitiveId, owner: ObjectId, show: bool) -> bool {
        match self.get_mut(id) {
            Some(Primitive::Batched { instances, .. }) => {
                match instances.iter_mut().find(|i| i.owner == owner) {
                    Some(instance) => {
                        instance.show = show;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    primitives: HashMap<PrimitiveId, Primitive>,
    redraw_requests: u64,
}

impl SceneGraph {
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn redraw_requests(&self) -> u64 {
        self.redraw_requests
    }

    /// Exclusive primitives owned by `owner`
    pub fn owned_by(&self, owner: ObjectId) -> Vec<ComponentKind> {
        let mut kinds: Vec<_> = self
            .primitives
            .keys()
            .filter_map(|id| match id {
                PrimitiveId::Component(o, kind) if *o == owner => Some(*kind),
                _ => None,
            })
            .collect();
        kinds.sort();
        kinds
    }

    pub fn batch_ids(&self, key: BatchKey) -> Vec<PrimitiveId> {
        self.primitives
            .keys()
            .filter(|id| matches!(id, PrimitiveId::Batch(k, _) if *k == key))
            .copied()
            .collect()
    }
}

impl PrimitiveContainer for SceneGraph {
    fn add(&mut self, id: PrimitiveId, primitive: Primitive) {
        self.primitives.insert(id, primitive);
    }

    fn remove(&mut self, id: PrimitiveId) -> bool {
        self.primitives.remove(&id).is_some()
    }

    fn contains(&self, id: PrimitiveId) -> bool {
        self.primitives.contains_key(&id)
    }

    fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.primitives.get(&id)
    }

    fn get_mut(&mut self, id: PrimitiveId) -> Option<&mut Primitive> {
        self.primitives.get_mut(&id)
    }

    fn ids(&self) -> Vec<PrimitiveId> {
        self.primitives.keys().copied().collect()
    }

    fn request_redraw(&mut self) {
        self.redraw_requests += 1;
    }
}
