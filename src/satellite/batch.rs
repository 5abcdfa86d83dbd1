//! Shared primitives merged from many objects' geometry
//!
//! Each [`BatchKey`] owns a member list and a build state machine advanced
//! once per clock tick:
//!
//! `Idle -> Pending -> Building(step..) -> Ready`
//!
//! Registrations coalesce into one pending rebuild. A membership change while
//! building drops the staged work and goes back to `Pending`. A geometry
//! update for an already folded member lets the build finish and queues one
//! follow-up rebuild. The finished primitive replaces the live one in a single
//! step.

use std::collections::{BTreeMap, HashMap};

use bevy::log::{debug, warn};

use crate::config::BatchConfig;
use crate::core::{CartesianPosition, TrackError};
use crate::satellite::components::{BatchKey, ObjectId};
use crate::satellite::scene::{BatchedInstance, Primitive, PrimitiveContainer, PrimitiveId};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum BuildState {
    /// No members and no primitive
    #[default]
    Idle,
    /// Rebuild requested, starts on the next tick
    Pending,
    Building {
        revision: u64,
        order: Vec<ObjectId>,
        staged: Vec<BatchedInstance>,
    },
    /// Live primitive matches the member list
    Ready,
}

#[derive(Debug, Clone)]
struct BatchMember {
    positions: Vec<CartesianPosition>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Batch {
    members: BTreeMap<ObjectId, BatchMember>,
    /// Bumped when a member joins or leaves
    revision: u64,
    /// Staged geometry went out of date during the current build
    follow_up: bool,
    state: BuildState,
    live: Option<PrimitiveId>,
    generation: u64,
}

impl Batch {
    fn schedule(&mut self, key: BatchKey) {
        if matches!(self.state, BuildState::Building { .. }) {
            debug!("batch {:?}: membership changed mid-build, restarting", key);
        }
        self.follow_up = false;
        self.state = BuildState::Pending;
    }

    /// Geometry of an existing member changed.
    fn refresh(&mut self, key: BatchKey, owner: ObjectId) {
        match &self.state {
            BuildState::Building { order, staged, .. } => {
                if order[..staged.len()].contains(&owner) {
                    debug!("batch {:?}: {} updated mid-build, follow-up queued", key, owner);
                    self.follow_up = true;
                }
            }
            _ => self.state = BuildState::Pending,
        }
    }

    /// Advance one step. Returns true when a new primitive went live.
    fn step(
        &mut self,
        key: BatchKey,
        members_per_step: usize,
        scene: &mut dyn PrimitiveContainer,
    ) -> Result<bool, TrackError> {
        match std::mem::take(&mut self.state) {
            BuildState::Idle => Ok(false),
            BuildState::Ready => {
                self.state = BuildState::Ready;
                Ok(false)
            }
            BuildState::Pending => {
                let order: Vec<ObjectId> = self.members.keys().copied().collect();
                self.follow_up = false;
                self.state = BuildState::Building {
                    revision: self.revision,
                    staged: Vec::with_capacity(order.len()),
                    order,
                };
                Ok(false)
            }
            BuildState::Building {
                revision,
                order,
                mut staged,
            } => {
                if revision != self.revision {
                    self.state = BuildState::Pending;
                    return Ok(false);
                }

                let from = staged.len();
                let to = (from + members_per_step.max(1)).min(order.len());
                for owner in &order[from..to] {
                    let Some(member) = self.members.get(owner) else {
                        self.state = BuildState::Pending;
                        return Ok(false);
                    };
                    if member.positions.iter().any(|p| !p.is_finite()) {
                        // Previous primitive stays live; retried on the next tick
                        self.state = BuildState::Pending;
                        return Err(TrackError::BatchBuild {
                            key,
                            reason: format!("non-finite vertex in geometry of {}", owner),
                        });
                    }
                    staged.push(BatchedInstance {
                        owner: *owner,
                        positions: member.positions.clone(),
                        closed: member.closed,
                        show: true,
                    });
                }

                if staged.len() < order.len() {
                    self.state = BuildState::Building {
                        revision,
                        order,
                        staged,
                    };
                    return Ok(false);
                }

                self.generation += 1;
                let id = PrimitiveId::Batch(key, self.generation);
                scene.add(
                    id,
                    Primitive::Batched {
                        key,
                        instances: staged,
                    },
                );
                if let Some(old) = self.live.replace(id) {
                    scene.remove(old);
                }
                scene.request_redraw();
                self.state = if std::mem::take(&mut self.follow_up) {
                    BuildState::Pending
                } else {
                    BuildState::Ready
                };
                debug!(
                    "batch {:?}: generation {} live with {} members",
                    key,
                    self.generation,
                    order.len()
                );
                Ok(true)
            }
        }
    }
}

/// All shared primitives, keyed by component kind
#[derive(Debug, Default)]
pub struct BatchRegistry {
    members_per_step: usize,
    batches: HashMap<BatchKey, Batch>,
    builds_completed: u64,
}

impl BatchRegistry {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            members_per_step: config.members_per_step,
            ..Default::default()
        }
    }

    /// Add `owner` to the batch or replace its geometry, scheduling a rebuild.
    pub fn register(
        &mut self,
        key: BatchKey,
        owner: ObjectId,
        positions: Vec<CartesianPosition>,
        closed: bool,
        scene: &mut dyn PrimitiveContainer,
    ) {
        let batch = self.batches.entry(key).or_default();
        let joined = batch
            .members
            .insert(owner, BatchMember { positions, closed })
            .is_none();
        if let Some(live) = batch.live {
            scene.set_instance_shown(live, owner, true);
        }
        if joined {
            batch.revision += 1;
            batch.schedule(key);
        } else {
            batch.refresh(key, owner);
        }
    }

    /// Remove `owner` from the batch. Its instance is hidden in the live
    /// primitive right away; removing the last member destroys the primitive.
    pub fn unregister(
        &mut self,
        key: BatchKey,
        owner: ObjectId,
        scene: &mut dyn PrimitiveContainer,
    ) -> bool {
        let Some(batch) = self.batches.get_mut(&key) else {
            return false;
        };
        if batch.members.remove(&owner).is_none() {
            return false;
        }
        batch.revision += 1;

        if batch.members.is_empty() {
            if let Some(live) = batch.live.take() {
                scene.remove(live);
                scene.request_redraw();
            }
            batch.state = BuildState::Idle;
            debug!("batch {:?}: last member left, primitive destroyed", key);
        } else {
            if let Some(live) = batch.live {
                if scene.set_instance_shown(live, owner, false) {
                    scene.request_redraw();
                }
            }
            batch.schedule(key);
        }
        true
    }

    /// Advance every batch by one build step.
    ///
    /// Failures are returned after being logged; they never stop other batches.
    pub fn advance(&mut self, scene: &mut dyn PrimitiveContainer) -> Vec<TrackError> {
        let mut errors = Vec::new();
        for (key, batch) in self.batches.iter_mut() {
            match batch.step(*key, self.members_per_step, scene) {
                Ok(true) => self.builds_completed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("{}", e);
                    errors.push(e);
                }
            }
        }
        errors
    }

    pub fn state(&self, key: BatchKey) -> Option<&BuildState> {
        self.batches.get(&key).map(|b| &b.state)
    }

    pub fn live_primitive(&self, key: BatchKey) -> Option<PrimitiveId> {
        self.batches.get(&key).and_then(|b| b.live)
    }

    pub fn member_count(&self, key: BatchKey) -> usize {
        self.batches.get(&key).map_or(0, |b| b.members.len())
    }

    pub fn is_member(&self, key: BatchKey, owner: ObjectId) -> bool {
        self.batches
            .get(&key)
            .is_some_and(|b| b.members.contains_key(&owner))
    }

    pub fn builds_completed(&self) -> u64 {
        self.builds_completed
    }

    /// No batch has a rebuild pending or in progress
    pub fn is_settled(&self) -> bool {
        self.batches
            .values()
            .all(|b| matches!(b.state, BuildState::Idle | BuildState::Ready))
    }
}
