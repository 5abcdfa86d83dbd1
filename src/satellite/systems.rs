//! Systems driving the registry from the simulation clock

use bevy::prelude::*;

use crate::orbital::SimulationTime;
use crate::satellite::registry::SatelliteRegistry;

/// Tick every created object and step pending batch builds
pub fn tick_registry_system(sim_time: Res<SimulationTime>, mut registry: ResMut<SatelliteRegistry>) {
    registry.tick(sim_time.current_utc);
}
