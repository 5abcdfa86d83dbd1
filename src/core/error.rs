use thiserror::Error;

use crate::satellite::{BatchKey, ObjectId};

/// Errors raised by the tracking core.
///
/// None of these abort a registry batch operation: callers isolate them per
/// object and log them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// The element set could not be parsed or rejected by the propagator.
    /// The object is excluded from tracking.
    #[error("invalid element set {name:?}: {reason}")]
    InvalidElementSet { name: String, reason: String },

    /// Numerical breakdown for one timestamp (decayed orbit, deep space resonance).
    /// The position at that instant is unknown.
    #[error("propagation diverged for #{catalog} at {minutes:.3} min past epoch: {reason}")]
    PropagationDiverged {
        catalog: u32,
        minutes: f64,
        reason: String,
    },

    /// No sample window has been built yet.
    #[error("no orbit data sampled yet")]
    NoOrbitData,

    /// Transit search requested without an observer.
    #[error("no ground position set")]
    NoGroundPosition,

    /// Query time lies outside the refresh tolerance of the current window.
    #[error("query is {offset_secs:.0} s away from the sample window reference")]
    StaleWindowExtrapolation { offset_secs: f64 },

    #[error("unknown tracked object {0}")]
    UnknownObject(ObjectId),

    /// Shared primitive construction failed; the previous primitive stays live.
    #[error("batch {key:?} build failed: {reason}")]
    BatchBuild { key: BatchKey, reason: String },
}
