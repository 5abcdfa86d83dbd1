//! Satellite tracking core: orbit propagation, sampled trajectories, transit
//! prediction and the lifecycle of the visual components built from them.

pub mod config;
pub mod core;
pub mod orbital;
pub mod satellite;
pub mod tle;

pub use config::TrackerConfig;
pub use crate::core::TrackError;
pub use orbital::OrbitalPlugin;
pub use satellite::{SatellitePlugin, SatelliteRegistry};
