//! Orbital propagation utilities

use bevy::math::DVec3;
use chrono::{DateTime, Utc};

use crate::core::TrackError;

/// Calculate minutes since epoch for SGP4 propagation
pub fn minutes_since_epoch(sim_utc: DateTime<Utc>, epoch: DateTime<Utc>) -> f64 {
    let delta = sim_utc - epoch;
    delta.num_seconds() as f64 / 60.0 + (delta.subsec_nanos() as f64) / 60.0 / 1.0e9
}

/// Inertial state in SI units (meters, meters per second)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialState {
    pub position: DVec3,
    pub velocity: DVec3,
}

/// Run SGP4/SDP4 for one instant and convert the km-based prediction to meters.
pub fn propagate_inertial(
    constants: &sgp4::Constants,
    catalog: u32,
    epoch: DateTime<Utc>,
    t: DateTime<Utc>,
) -> Result<InertialState, TrackError> {
    let minutes = minutes_since_epoch(t, epoch);
    let prediction = constants
        .propagate(sgp4::MinutesSinceEpoch(minutes))
        .map_err(|e| TrackError::PropagationDiverged {
            catalog,
            minutes,
            reason: e.to_string(),
        })?;

    let position = DVec3::from_array(prediction.position) * 1000.0;
    let velocity = DVec3::from_array(prediction.velocity) * 1000.0;
    if !position.is_finite() || !velocity.is_finite() {
        return Err(TrackError::PropagationDiverged {
            catalog,
            minutes,
            reason: "non-finite state".to_string(),
        });
    }
    Ok(InertialState { position, velocity })
}
