//! Simulation clock driving the tracking core

use bevy::prelude::*;
use chrono::{DateTime, Duration, Utc};

/// Simulation time resource
#[derive(Resource)]
pub struct SimulationTime {
    pub current_utc: DateTime<Utc>,
    pub time_scale: f32,
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self {
            current_utc: Utc::now(),
            time_scale: 1.0,
        }
    }
}

impl SimulationTime {
    pub fn starting_at(current_utc: DateTime<Utc>) -> Self {
        Self {
            current_utc,
            time_scale: 1.0,
        }
    }
}

/// Convert fractional seconds to a chrono duration with millisecond resolution
pub fn duration_from_secs(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// Signed seconds from `from` to `to`
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta.num_seconds() as f64 + (delta.subsec_nanos() as f64) * 1e-9
}

/// System to advance simulation UTC by scale
pub fn advance_simulation_clock(time: Res<Time>, mut sim_time: ResMut<SimulationTime>) {
    let scaled = (time.delta_secs() * sim_time.time_scale).max(0.0);
    let whole = scaled.trunc() as i64;
    let nanos = ((scaled - scaled.trunc()) * 1_000_000_000.0) as i64;
    if whole != 0 {
        sim_time.current_utc += Duration::seconds(whole);
    }
    if nanos != 0 {
        sim_time.current_utc += Duration::nanoseconds(nanos);
    }
}
