//! Core coordinate utilities
//!
//! Frame-tagged Cartesian positions, WGS84 geodetic positions, the Earth
//! rotation used to go from the propagator's inertial frame to Earth-fixed,
//! and topocentric look angles for a ground observer.

use bevy::math::DVec3;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// WGS84 semi-major axis in meters
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

// ============================== Positions ==============================

/// Reference frame a Cartesian position is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frame {
    /// True-equator mean-equinox inertial frame used by SGP4
    Inertial,
    /// Earth-centered Earth-fixed
    Fixed,
}

/// Cartesian position in meters, tagged with its frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub frame: Frame,
}

impl CartesianPosition {
    pub fn new(x: f64, y: f64, z: f64, frame: Frame) -> Self {
        Self { x, y, z, frame }
    }

    pub fn from_dvec3(v: DVec3, frame: Frame) -> Self {
        Self::new(v.x, v.y, v.z, frame)
    }

    pub fn to_dvec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    pub fn distance(&self, other: &CartesianPosition) -> f64 {
        (self.to_dvec3() - other.to_dvec3()).length()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Geodetic position on the WGS84 ellipsoid.
/// Longitude and latitude in radians, height in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl GeodeticPosition {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    pub fn from_degrees(longitude_deg: f64, latitude_deg: f64, height: f64) -> Self {
        Self::new(longitude_deg.to_radians(), latitude_deg.to_radians(), height)
    }

    /// (longitude, latitude) in degrees
    pub fn as_degrees(&self) -> (f64, f64) {
        (self.longitude.to_degrees(), self.latitude.to_degrees())
    }

    /// Earth-fixed position of this point
    pub fn to_ecef(&self) -> CartesianPosition {
        let (slat, clat) = self.latitude.sin_cos();
        let (slon, clon) = self.longitude.sin_cos();
        let n = WGS84_A / (1.0 - WGS84_E2 * slat * slat).sqrt();
        CartesianPosition::new(
            (n + self.height) * clat * clon,
            (n + self.height) * clat * slon,
            (n * (1.0 - WGS84_E2) + self.height) * slat,
            Frame::Fixed,
        )
    }
}

/// Convert an Earth-fixed position to geodetic coordinates (Bowring iteration).
pub fn ecef_to_geodetic(ecef: &CartesianPosition) -> GeodeticPosition {
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let longitude = ecef.y.atan2(ecef.x);
    let mut latitude = ecef.z.atan2(p * (1.0 - WGS84_E2));
    let mut height = 0.0;
    for _ in 0..6 {
        let (slat, clat) = latitude.sin_cos();
        let n = WGS84_A / (1.0 - WGS84_E2 * slat * slat).sqrt();
        height = if clat.abs() > 1e-10 {
            p / clat - n
        } else {
            ecef.z.abs() - n * (1.0 - WGS84_E2)
        };
        latitude = ecef.z.atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
    }
    GeodeticPosition::new(longitude, latitude, height)
}

// ========================= Earth orientation =========================

/// Compute the Julian Date (UTC) for a given timestamp.
/// Uses the standard Gregorian calendar to JD conversion.
pub fn julian_date_utc(t: DateTime<Utc>) -> f64 {
    let mut y = t.year();
    let mut m = t.month() as i32;
    let d = t.day() as i32;

    let hour = t.hour() as f64;
    let minute = t.minute() as f64;
    let sec = t.second() as f64 + (t.nanosecond() as f64) * 1e-9_f64;
    let day_fraction = (hour + (minute + sec / 60.0) / 60.0) / 24.0;

    if m <= 2 {
        y -= 1;
        m += 12;
    }

    let a = (y as f64 / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();

    let jd0 = (365.25 * (y as f64 + 4716.0)).floor()
        + (30.6001 * ((m + 1) as f64)).floor()
        + d as f64
        + b
        - 1524.5;

    jd0 + day_fraction
}

/// Greenwich Mean Sidereal Time (radians), IAU 1982 polynomial.
/// Assumes UT1 ~= UTC.
pub fn gmst_rad(t: DateTime<Utc>) -> f64 {
    let jd = julian_date_utc(t);
    let t_cent = (jd - 2451545.0) / 36525.0;

    let gmst_sec =
        67310.54841 + (876600.0 * 3600.0 + 8640184.812866) * t_cent + 0.093104 * t_cent * t_cent
            - 6.2e-6 * t_cent * t_cent * t_cent;

    gmst_sec.rem_euclid(86400.0) * (TAU / 86400.0)
}

/// Rotate inertial (TEME) -> Earth-fixed by -GMST about Z
pub fn eci_to_ecef(eci: DVec3, gmst: f64) -> DVec3 {
    let (s, c) = gmst.sin_cos();
    DVec3::new(c * eci.x + s * eci.y, -s * eci.x + c * eci.y, eci.z)
}

/// Inertial position at `t` expressed in the Earth-fixed frame.
pub fn inertial_to_fixed(position: &CartesianPosition, t: DateTime<Utc>) -> CartesianPosition {
    match position.frame {
        Frame::Fixed => *position,
        Frame::Inertial => {
            CartesianPosition::from_dvec3(eci_to_ecef(position.to_dvec3(), gmst_rad(t)), Frame::Fixed)
        }
    }
}

// ============================ Look angles ============================

/// Topocentric direction from an observer to a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    /// Clockwise from north, degrees in [0, 360)
    pub azimuth_deg: f64,
    /// Above the local horizon, degrees
    pub elevation_deg: f64,
    pub range_m: f64,
}

/// Azimuth/elevation/range of an Earth-fixed target seen from `observer`.
pub fn look_angles(observer: &GeodeticPosition, target: &CartesianPosition) -> LookAngles {
    let origin = observer.to_ecef().to_dvec3();
    let d = target.to_dvec3() - origin;
    let range_m = d.length();

    let (slat, clat) = observer.latitude.sin_cos();
    let (slon, clon) = observer.longitude.sin_cos();
    let east = DVec3::new(-slon, clon, 0.0);
    let north = DVec3::new(-slat * clon, -slat * slon, clat);
    let up = DVec3::new(clat * clon, clat * slon, slat);

    if range_m < 1e-6 {
        return LookAngles {
            azimuth_deg: 0.0,
            elevation_deg: 90.0,
            range_m,
        };
    }

    let elevation_deg = (d.dot(up) / range_m).clamp(-1.0, 1.0).asin().to_degrees();
    let azimuth_deg = d.dot(east).atan2(d.dot(north)).to_degrees().rem_euclid(360.0);

    LookAngles {
        azimuth_deg,
        elevation_deg,
        range_m,
    }
}
