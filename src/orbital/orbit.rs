//! One orbiting object: element set, propagator and a one-slot geodetic cache.

use bevy::log::debug;
use chrono::{DateTime, Utc};

use crate::core::{
    CartesianPosition, Frame, GeodeticPosition, TrackError, ecef_to_geodetic, inertial_to_fixed,
};
use crate::orbital::propagation::{InertialState, propagate_inertial};
use crate::tle::OrbitalElementSet;

/// Position and velocity in one frame (meters, meters per second)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    pub position: CartesianPosition,
    pub velocity: CartesianPosition,
}

pub struct Orbit {
    elements: OrbitalElementSet,
    catalog: u32,
    epoch: DateTime<Utc>,
    constants: sgp4::Constants,
    /// Most recent geodetic query: (timestamp, result)
    last: Option<(DateTime<Utc>, GeodeticPosition)>,
}

impl Orbit {
    /// Parse the element set and initialise the propagator.
    pub fn new(elements: OrbitalElementSet) -> Result<Self, TrackError> {
        let invalid = |reason: String| TrackError::InvalidElementSet {
            name: elements.name().to_string(),
            reason,
        };

        let catalog = elements
            .catalog_number()
            .ok_or_else(|| invalid("unreadable catalog number".to_string()))?;
        let epoch = elements
            .epoch()
            .ok_or_else(|| invalid("unreadable epoch".to_string()))?;
        let sgp_elements = sgp4::Elements::from_tle(
            Some(elements.name().to_string()),
            elements.line1().as_bytes(),
            elements.line2().as_bytes(),
        )
        .map_err(|e| invalid(e.to_string()))?;
        let constants =
            sgp4::Constants::from_elements(&sgp_elements).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            elements,
            catalog,
            epoch,
            constants,
            last: None,
        })
    }

    pub fn elements(&self) -> &OrbitalElementSet {
        &self.elements
    }

    pub fn name(&self) -> &str {
        self.elements.name()
    }

    pub fn catalog_number(&self) -> u32 {
        self.catalog
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Orbital period in minutes, from the mean motion on line 2
    pub fn period_minutes(&self) -> Option<f64> {
        self.elements.period_minutes()
    }

    fn inertial(&self, t: DateTime<Utc>) -> Result<InertialState, TrackError> {
        propagate_inertial(&self.constants, self.catalog, self.epoch, t)
    }

    /// Inertial position and velocity at `t`
    pub fn state_eci(&self, t: DateTime<Utc>) -> Result<OrbitState, TrackError> {
        let state = self.inertial(t)?;
        Ok(OrbitState {
            position: CartesianPosition::from_dvec3(state.position, Frame::Inertial),
            velocity: CartesianPosition::from_dvec3(state.velocity, Frame::Inertial),
        })
    }

    /// Inertial-frame position at `t`
    pub fn position_eci(&self, t: DateTime<Utc>) -> Result<CartesianPosition, TrackError> {
        self.state_eci(t).map(|s| s.position)
    }

    /// Earth-fixed position at `t`
    pub fn position_ecef(&self, t: DateTime<Utc>) -> Result<CartesianPosition, TrackError> {
        Ok(inertial_to_fixed(&self.position_eci(t)?, t))
    }

    /// Geodetic position at `t`.
    ///
    /// With `use_cache`, a query for exactly the previous timestamp returns the
    /// stored result. A failed propagation clears the slot.
    pub fn position_geodetic(
        &mut self,
        t: DateTime<Utc>,
        use_cache: bool,
    ) -> Result<GeodeticPosition, TrackError> {
        if use_cache {
            if let Some((cached_t, cached)) = self.last {
                if cached_t == t {
                    return Ok(cached);
                }
            }
        }

        match self.position_ecef(t) {
            Ok(ecef) => {
                let geodetic = ecef_to_geodetic(&ecef);
                self.last = Some((t, geodetic));
                Ok(geodetic)
            }
            Err(e) => {
                debug!("orbit #{} geodetic query failed: {}", self.catalog, e);
                self.last = None;
                Err(e)
            }
        }
    }

    /// Timestamp held in the geodetic cache slot
    pub fn cached_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last.map(|(t, _)| t)
    }
}
