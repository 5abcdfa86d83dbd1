//! Satellite management module
//!
//! Tracked objects, their visual components and the shared primitives those
//! components are batched into. The registry is a Bevy resource ticked from
//! the simulation clock.

use bevy::prelude::*;

pub mod batch;
pub mod components;
pub mod events;
pub mod lifecycle;
pub mod registry;
pub mod scene;
pub mod systems;

pub use batch::{BatchRegistry, BuildState};
pub use components::{BatchKey, ComponentKind, GraphicDescriptor, ObjectId};
pub use events::{EventBus, EventKind, SceneEvent, SubscriptionHandle};
pub use lifecycle::{LifecycleState, TrackedSatellite};
pub use registry::{IngestReport, SatelliteRegistry};
pub use scene::{Primitive, PrimitiveContainer, PrimitiveId, SceneGraph};
pub use systems::tick_registry_system;

use crate::config::TrackerConfig;
use crate::orbital::advance_simulation_clock;

/// Plugin for tracked-object management
pub struct SatellitePlugin;

impl Plugin for SatellitePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TrackerConfig>()
            .init_resource::<SatelliteRegistry>()
            .add_systems(Update, tick_registry_system.after(advance_simulation_clock));
    }
}
