//! Orbital mechanics module
//!
//! Propagation of element sets, the sliding sample window used for
//! rendering, visibility (transit) search and the simulation clock.

use bevy::prelude::*;

pub mod orbit;
pub mod propagation;
pub mod time;
pub mod trajectory;
pub mod transit;

pub use orbit::{Orbit, OrbitState};
pub use propagation::minutes_since_epoch;
pub use time::{SimulationTime, advance_simulation_clock};
pub use trajectory::{SampleWindow, SampledTrajectory};
pub use transit::{Transit, TransitFinder, TransitSet};

/// Plugin for the simulation clock
pub struct OrbitalPlugin;

impl Plugin for OrbitalPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimulationTime>()
            .add_systems(Update, advance_simulation_clock);
    }
}
