//! Visibility windows (rise, culmination, set) of one orbit over one observer.
//!
//! The search walks the interval at a coarse step, brackets horizon
//! crossings and local elevation maxima, then refines each bracket by
//! bisection (crossings) or golden-section search (culmination) down to the
//! configured time precision.

use bevy::log::debug;
use chrono::{DateTime, Utc};

use crate::config::TransitConfig;
use crate::core::{GeodeticPosition, TrackError, look_angles};
use crate::orbital::orbit::Orbit;
use crate::orbital::time::{duration_from_secs, seconds_between};

/// Bracket refinement never runs longer than this
const MAX_REFINE_ITERATIONS: usize = 64;
/// Below-horizon local maxima lower than this are not refined
const GRAZE_SEARCH_MARGIN_DEG: f64 = 10.0;
const GOLDEN: f64 = 0.618_033_988_749_895;

/// One continuous interval above the observer's elevation mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Transit {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub culmination: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub azimuth_at_max_elevation_deg: f64,
    pub azimuth_start_deg: f64,
    pub azimuth_end_deg: f64,
    /// Already above the mask at the start of the searched range
    pub clamped_start: bool,
    /// Still above the mask at the end of the searched range
    pub clamped_end: bool,
}

impl Transit {
    pub fn duration_secs(&self) -> f64 {
        seconds_between(self.start, self.end)
    }

    pub fn is_partial(&self) -> bool {
        self.clamped_start || self.clamped_end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// Time-ordered, non-overlapping transits for one (observer, range) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitSet {
    pub ground: GeodeticPosition,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub min_elevation_deg: f64,
    transits: Vec<Transit>,
}

impl TransitSet {
    fn empty(ground: GeodeticPosition, start: DateTime<Utc>, end: DateTime<Utc>, min_el: f64) -> Self {
        Self {
            ground,
            start,
            end,
            min_elevation_deg: min_el,
            transits: Vec::new(),
        }
    }

    pub fn transits(&self) -> &[Transit] {
        &self.transits
    }

    pub fn len(&self) -> usize {
        self.transits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transits.is_empty()
    }

    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && self.end >= end
    }

    /// Transits overlapping `[start, end]`
    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Transit> {
        self.transits
            .iter()
            .filter(|t| t.overlaps(start, end))
            .cloned()
            .collect()
    }

    /// First transit that has not ended yet at `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<&Transit> {
        self.transits.iter().find(|t| t.end > now)
    }
}

/// Elevation above the mask, sampled through the propagator.
struct ElevationProbe<'a> {
    orbit: &'a Orbit,
    ground: &'a GeodeticPosition,
    min_elevation_deg: f64,
}

impl ElevationProbe<'_> {
    /// Elevation minus mask in degrees; unknown positions count as far below.
    fn margin(&self, t: DateTime<Utc>) -> f64 {
        match self.orbit.position_ecef(t) {
            Ok(p) => look_angles(self.ground, &p).elevation_deg - self.min_elevation_deg,
            Err(e) => {
                debug!("transit probe: {}", e);
                f64::NEG_INFINITY
            }
        }
    }

    fn azimuth(&self, t: DateTime<Utc>) -> f64 {
        self.orbit
            .position_ecef(t)
            .map(|p| look_angles(self.ground, &p).azimuth_deg)
            .unwrap_or(f64::NAN)
    }

    /// Time of the horizon crossing between `below` and `above`.
    fn crossing(&self, below: DateTime<Utc>, above: DateTime<Utc>, precision_secs: f64) -> DateTime<Utc> {
        let (mut lo, mut hi) = (below, above);
        for _ in 0..MAX_REFINE_ITERATIONS {
            let span = seconds_between(lo, hi).abs();
            if span <= precision_secs {
                break;
            }
            let mid = lo + duration_from_secs(seconds_between(lo, hi) / 2.0);
            if self.margin(mid) > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        // Report the instant on the visible side
        hi
    }

    /// Golden-section search for the elevation maximum inside `[a, b]`.
    fn culmination(&self, a: DateTime<Utc>, b: DateTime<Utc>, precision_secs: f64) -> (DateTime<Utc>, f64) {
        let at = |s: f64| a + duration_from_secs(s);
        let (mut lo, mut hi) = (0.0, seconds_between(a, b));
        let mut x1 = hi - GOLDEN * (hi - lo);
        let mut x2 = lo + GOLDEN * (hi - lo);
        let mut f1 = self.margin(at(x1));
        let mut f2 = self.margin(at(x2));
        for _ in 0..MAX_REFINE_ITERATIONS {
            if hi - lo <= precision_secs {
                break;
            }
            if f1 < f2 {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + GOLDEN * (hi - lo);
                f2 = self.margin(at(x2));
            } else {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - GOLDEN * (hi - lo);
                f1 = self.margin(at(x1));
            }
        }

        // The maximum of a clamped pass may sit on the bracket edge
        let mut best = (at((lo + hi) / 2.0), self.margin(at((lo + hi) / 2.0)));
        for edge in [a, b] {
            let m = self.margin(edge);
            if m > best.1 {
                best = (edge, m);
            }
        }
        best
    }
}

/// Per-object transit search with a cached result for the current observer.
#[derive(Debug, Clone, Default)]
pub struct TransitFinder {
    config: TransitConfig,
    ground: Option<GeodeticPosition>,
    cache: Option<TransitSet>,
}

impl TransitFinder {
    pub fn new(config: TransitConfig) -> Self {
        Self {
            config,
            ground: None,
            cache: None,
        }
    }

    pub fn ground_position(&self) -> Option<GeodeticPosition> {
        self.ground
    }

    /// Change the observer; any cached set is invalidated.
    pub fn set_ground_position(&mut self, ground: Option<GeodeticPosition>) {
        if self.ground != ground {
            self.ground = ground;
            self.invalidate();
        }
    }

    /// Clear the cached transit set
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn cached(&self) -> Option<&TransitSet> {
        self.cache.as_ref()
    }

    /// Search `[start, end]` for transits of `orbit` above `ground`.
    ///
    /// Geostationary-class orbits never set and yield an empty set.
    pub fn find_transits(
        &self,
        orbit: &Orbit,
        ground: &GeodeticPosition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_elevation_deg: f64,
    ) -> TransitSet {
        let mut set = TransitSet::empty(*ground, start, end, min_elevation_deg);
        if end <= start {
            return set;
        }
        let geostationary = orbit
            .period_minutes()
            .is_none_or(|p| p > self.config.geostationary_period_hours * 60.0);
        if geostationary {
            return set;
        }

        let probe = ElevationProbe {
            orbit,
            ground,
            min_elevation_deg,
        };
        let precision = self.config.precision_secs.max(1e-3);
        let step = self.config.coarse_step_secs.max(precision);
        let total = seconds_between(start, end);

        let mut push = |rise: DateTime<Utc>, set_t: DateTime<Utc>, clamped_start: bool, clamped_end: bool| {
            let (culmination, margin) = probe.culmination(rise, set_t, precision);
            let transit = Transit {
                start: rise,
                end: set_t,
                culmination,
                max_elevation_deg: margin + min_elevation_deg,
                azimuth_at_max_elevation_deg: probe.azimuth(culmination),
                azimuth_start_deg: probe.azimuth(rise),
                azimuth_end_deg: probe.azimuth(set_t),
                clamped_start,
                clamped_end,
            };
            if !transit.is_partial() && transit.duration_secs() < self.config.min_duration_secs {
                debug!(
                    "discarding {:.1} s graze of #{}",
                    transit.duration_secs(),
                    orbit.catalog_number()
                );
                return;
            }
            set.transits.push(transit);
        };

        let mut prev2: Option<(DateTime<Utc>, f64)> = None;
        let mut prev = (start, probe.margin(start));
        let mut rise = (prev.1 > 0.0).then_some(start);
        let mut offset = 0.0;

        while offset < total {
            offset = (offset + step).min(total);
            let t = start + duration_from_secs(offset);
            let cur = (t, probe.margin(t));

            match rise {
                None if cur.1 > 0.0 => {
                    rise = Some(probe.crossing(prev.0, cur.0, precision));
                }
                Some(r) if cur.1 <= 0.0 => {
                    let set_t = probe.crossing(cur.0, prev.0, precision);
                    push(r, set_t, r == start, false);
                    rise = None;
                }
                None => {
                    // Brief pass hidden between three below-horizon samples
                    if let Some(p2) = prev2 {
                        let peaked = prev.1 > p2.1 && prev.1 >= cur.1;
                        if peaked && prev.1 > -GRAZE_SEARCH_MARGIN_DEG {
                            let (top, margin) = probe.culmination(p2.0, cur.0, precision);
                            if margin > 0.0 {
                                let r = probe.crossing(p2.0, top, precision);
                                let s = probe.crossing(cur.0, top, precision);
                                push(r, s, false, false);
                            }
                        }
                    }
                }
                Some(_) => {}
            }

            prev2 = Some(prev);
            prev = cur;
        }

        if let Some(r) = rise {
            push(r, end, r == start, true);
        }

        set
    }

    /// Like [`Self::find_transits`] for the configured observer.
    pub fn try_find(
        &self,
        orbit: &Orbit,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TransitSet, TrackError> {
        let ground = self.ground.ok_or(TrackError::NoGroundPosition)?;
        Ok(self.find_transits(orbit, &ground, start, end, self.config.min_elevation_deg))
    }

    /// Transits overlapping `[start, end]` for the configured observer.
    /// Reuses the cached set when it covers the range, otherwise recomputes
    /// it wholesale. Without an observer the result is empty.
    pub fn transits_in_range(
        &mut self,
        orbit: &Orbit,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Transit> {
        if let Some(cache) = self.cache.as_ref().filter(|c| c.covers(start, end)) {
            return cache.in_range(start, end);
        }
        match self.try_find(orbit, start, end) {
            Ok(set) => {
                let result = set.in_range(start, end);
                self.cache = Some(set);
                result
            }
            Err(_) => Vec::new(),
        }
    }

    /// True when the cached set no longer covers the lookbehind/lookahead
    /// range around `now` with at least half the lookahead left.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.cache {
            None => true,
            Some(c) => {
                let horizon = now + duration_from_secs(self.config.lookahead_secs / 2.0);
                now < c.start || c.end < horizon
            }
        }
    }

    /// Recompute the cached set around `now` if it expired.
    /// Returns whether a recomputation happened.
    pub fn refresh_around(&mut self, orbit: &Orbit, now: DateTime<Utc>) -> bool {
        if self.ground.is_none() || !self.is_expired(now) {
            return false;
        }
        let start = now - duration_from_secs(self.config.lookbehind_secs);
        let end = now + duration_from_secs(self.config.lookahead_secs);
        self.cache = self.try_find(orbit, start, end).ok();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tle::mock_data::{geo_2006, iss_2008, iss_2018};
    use chrono::{Duration, TimeZone};

    fn munich() -> GeodeticPosition {
        GeodeticPosition::from_degrees(11.5820, 48.1351, 519.0)
    }

    fn assert_well_formed(set: &TransitSet) {
        for t in set.transits() {
            assert!(t.start < t.end, "start must precede end: {:?}", t);
            assert!(t.start >= set.start && t.end <= set.end);
            assert!(t.culmination >= t.start && t.culmination <= t.end);
            assert!(t.max_elevation_deg >= set.min_elevation_deg - 1e-6);
            assert!((0.0..360.0).contains(&t.azimuth_at_max_elevation_deg));
        }
        for pair in set.transits().windows(2) {
            assert!(
                pair[0].end < pair[1].start,
                "transits overlap: {:?} / {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_transits_are_ordered_and_disjoint() {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let finder = TransitFinder::new(TransitConfig::default());
        let start = orbit.epoch();
        let set = finder.find_transits(&orbit, &munich(), start, start + Duration::days(2), 0.0);

        assert!(set.len() >= 4, "expected several passes in two days, got {}", set.len());
        assert_well_formed(&set);
        for t in set.transits() {
            assert!(t.duration_secs() >= 5.0);
            assert!(t.duration_secs() < 15.0 * 60.0, "LEO passes are short: {:?}", t);
        }
    }

    #[test]
    fn test_higher_mask_keeps_subset_of_passes() {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let finder = TransitFinder::new(TransitConfig::default());
        let start = orbit.epoch();
        let end = start + Duration::days(3);
        let low = finder.find_transits(&orbit, &munich(), start, end, 0.0);
        let high = finder.find_transits(&orbit, &munich(), start, end, 10.0);

        assert!(high.len() <= low.len());
        assert_well_formed(&high);
        for t in high.transits() {
            assert!(t.max_elevation_deg >= 10.0);
            assert!(low.transits().iter().any(|l| l.start <= t.start && l.end >= t.end));
        }
    }

    #[test]
    fn test_pass_in_progress_is_clamped_to_range_start() {
        let mut orbit = Orbit::new(iss_2008()).unwrap();
        let t0 = orbit.epoch() + Duration::minutes(30);
        let sub = orbit.position_geodetic(t0, true).unwrap();
        let ground = GeodeticPosition::new(sub.longitude, sub.latitude, 0.0);

        let finder = TransitFinder::new(TransitConfig::default());
        let set = finder.find_transits(&orbit, &ground, t0, t0 + Duration::hours(3), 0.0);
        let first = &set.transits()[0];
        assert_eq!(first.start, t0);
        assert!(first.clamped_start);
        assert!(!first.clamped_end);
        assert!(first.max_elevation_deg > 85.0, "{:?}", first);
        assert_well_formed(&set);
    }

    #[test]
    fn test_pass_still_running_is_clamped_to_range_end() {
        let mut orbit = Orbit::new(iss_2008()).unwrap();
        let t0 = orbit.epoch() + Duration::minutes(30);
        let sub = orbit.position_geodetic(t0, true).unwrap();
        let ground = GeodeticPosition::new(sub.longitude, sub.latitude, 0.0);

        let finder = TransitFinder::new(TransitConfig::default());
        let set = finder.find_transits(&orbit, &ground, t0 - Duration::hours(3), t0, 0.0);
        let last = set.transits().last().expect("pass at the range end");
        assert_eq!(last.end, t0);
        assert!(last.clamped_end);
        assert_well_formed(&set);
    }

    #[test]
    fn test_geostationary_yields_empty_set() {
        let orbit = Orbit::new(geo_2006()).unwrap();
        let finder = TransitFinder::new(TransitConfig::default());
        let ground = GeodeticPosition::from_degrees(-85.0, 10.0, 0.0);
        let start = orbit.epoch();
        let set = finder.find_transits(&orbit, &ground, start, start + Duration::days(1), 0.0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_no_ground_position_is_empty_not_error() {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let mut finder = TransitFinder::new(TransitConfig::default());
        let start = orbit.epoch();
        assert_eq!(
            finder.try_find(&orbit, start, start + Duration::hours(6)),
            Err(TrackError::NoGroundPosition)
        );
        assert!(finder
            .transits_in_range(&orbit, start, start + Duration::hours(6))
            .is_empty());
        assert!(finder.cached().is_none());
    }

    #[test]
    fn test_cache_reused_within_range_and_invalidated_on_ground_change() {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let mut finder = TransitFinder::new(TransitConfig::default());
        finder.set_ground_position(Some(munich()));
        let start = orbit.epoch();

        let day = finder.transits_in_range(&orbit, start, start + Duration::days(1));
        let cached_end = finder.cached().unwrap().end;
        let half = finder.transits_in_range(&orbit, start, start + Duration::hours(12));
        assert_eq!(finder.cached().unwrap().end, cached_end, "sub-range served from cache");
        assert!(half.len() <= day.len());

        finder.set_ground_position(Some(munich()));
        assert!(finder.cached().is_some(), "same observer keeps the cache");

        finder.set_ground_position(Some(GeodeticPosition::from_degrees(-70.0, -33.0, 0.0)));
        assert!(finder.cached().is_none());
    }

    #[test]
    fn test_refresh_around_recomputes_only_when_expired() {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let mut config = TransitConfig::default();
        config.lookahead_secs = 86_400.0;
        config.lookbehind_secs = 3_600.0;
        let mut finder = TransitFinder::new(config);
        let now = orbit.epoch();

        assert!(!finder.refresh_around(&orbit, now), "no observer, nothing to do");
        finder.set_ground_position(Some(munich()));
        assert!(finder.refresh_around(&orbit, now));
        assert!(!finder.refresh_around(&orbit, now + Duration::hours(6)));
        assert!(finder.refresh_around(&orbit, now + Duration::hours(13)));
        assert!(finder.cached().unwrap().covers(
            now + Duration::hours(13),
            now + Duration::hours(36)
        ));
    }

    #[test]
    fn test_iss_over_munich_two_weeks() {
        let orbit = Orbit::new(iss_2018()).unwrap();
        let finder = TransitFinder::new(TransitConfig::default());
        let start = Utc.with_ymd_and_hms(2018, 12, 8, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2018, 12, 22, 0, 0, 0).unwrap();

        let set = finder.find_transits(&orbit, &munich(), start, end, 0.0);
        assert_well_formed(&set);
        // 87 listed passes, plus a 0.07 deg graze of about 51 s on
        // 2018-12-18 around 16:27 UTC that a horizon mask may or may not list
        assert!(
            (87..=88).contains(&set.len()),
            "expected 87 or 88 passes, got {}",
            set.len()
        );
    }
}
