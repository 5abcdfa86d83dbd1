//! Core shared types: coordinate frames, geodesy and the error taxonomy.

pub mod coordinates;
pub mod error;

pub use coordinates::{
    CartesianPosition, Frame, GeodeticPosition, LookAngles, ecef_to_geodetic, eci_to_ecef,
    gmst_rad, inertial_to_fixed, look_angles,
};
pub use error::TrackError;
