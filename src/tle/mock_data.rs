//! TLE fixtures shared by the unit tests.

use crate::tle::OrbitalElementSet;

pub const ISS_2008: &str = r#"ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
"#;

pub const ISS_2018: &str = r#"ISS (ZARYA)
1 25544U 98067A   18342.69352573  .00002284  00000-0  42040-4 0  9998
2 25544  51.6407 229.0798 0005166 124.8214 225.4418 15.54069435145167
"#;

/// Geostationary-class object (period ~ 1 sidereal day)
pub const GEO_2006: &str = r#"XM-3
1 28626U 05008A   06176.46683397 -.00000205  00000-0  10000-3 0  2190
2 28626   0.0019 286.9433 0000335  13.7918  55.6504  1.00270176  4891
"#;

pub fn element_set(text: &str) -> OrbitalElementSet {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    OrbitalElementSet::new(lines[0], lines[1], lines[2])
}

pub fn iss_2008() -> OrbitalElementSet {
    element_set(ISS_2008)
}

pub fn iss_2018() -> OrbitalElementSet {
    element_set(ISS_2018)
}

pub fn geo_2006() -> OrbitalElementSet {
    element_set(GEO_2006)
}
