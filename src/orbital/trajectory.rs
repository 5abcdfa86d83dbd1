//! Sliding window of sampled positions around "now".
//!
//! Windows are rebuilt wholesale once the clock drifts past the refresh
//! threshold. Each rebuild shifts its reference by a random offset so that
//! thousands of objects do not all rebuild in the same frame.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::SamplingConfig;
use crate::core::{CartesianPosition, TrackError, inertial_to_fixed};
use crate::orbital::orbit::Orbit;
use crate::orbital::time::{duration_from_secs, seconds_between};

/// Immutable set of inertial samples spanning
/// `[reference - backward, reference + forward]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    pub reference_epoch: DateTime<Utc>,
    pub backward_secs: f64,
    pub forward_secs: f64,
    pub step_secs: f64,
    samples: Vec<(DateTime<Utc>, CartesianPosition)>,
}

impl SampleWindow {
    /// Propagate every sample of a window centred on `reference`.
    ///
    /// Fails as a whole if any sample cannot be propagated.
    pub fn build(
        orbit: &Orbit,
        reference: DateTime<Utc>,
        config: &SamplingConfig,
    ) -> Result<Self, TrackError> {
        let backward = config.backward_steps as i64;
        let forward = config.forward_steps as i64;
        let samples = (-backward..=forward)
            .map(|k| {
                let t = reference + duration_from_secs(k as f64 * config.step_secs);
                orbit.position_eci(t).map(|p| (t, p))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            reference_epoch: reference,
            backward_secs: backward as f64 * config.step_secs,
            forward_secs: forward as f64 * config.step_secs,
            step_secs: config.step_secs,
            samples,
        })
    }

    pub fn samples(&self) -> &[(DateTime<Utc>, CartesianPosition)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|(t, _)| *t)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|(t, _)| *t)
    }

    /// Interpolated inertial position; outside the window the nearest edge
    /// sample is held.
    pub fn value_at(&self, t: DateTime<Utc>) -> Option<CartesianPosition> {
        let (first, last) = (self.samples.first()?, self.samples.last()?);
        if t <= first.0 {
            return Some(first.1);
        }
        if t >= last.0 {
            return Some(last.1);
        }
        if self.samples.len() < 3 {
            return Some(self.linear(t));
        }

        // Three samples around the nearest one
        let upper = self.samples.partition_point(|(ts, _)| *ts <= t);
        let lower = upper - 1;
        let nearest = if seconds_between(self.samples[lower].0, t)
            <= seconds_between(t, self.samples[upper].0)
        {
            lower
        } else {
            upper
        };
        let center = nearest.clamp(1, self.samples.len() - 2);
        Some(quadratic(&self.samples[center - 1..=center + 1], t))
    }

    fn linear(&self, t: DateTime<Utc>) -> CartesianPosition {
        let upper = self.samples.partition_point(|(ts, _)| *ts <= t);
        let (t0, p0) = self.samples[upper - 1];
        let (t1, p1) = self.samples[upper];
        let f = seconds_between(t0, t) / seconds_between(t0, t1);
        let v = p0.to_dvec3().lerp(p1.to_dvec3(), f);
        CartesianPosition::from_dvec3(v, p0.frame)
    }
}

/// Degree-2 Lagrange interpolation through three samples.
fn quadratic(points: &[(DateTime<Utc>, CartesianPosition)], t: DateTime<Utc>) -> CartesianPosition {
    let origin = points[0].0;
    let x: Vec<f64> = points.iter().map(|(ts, _)| seconds_between(origin, *ts)).collect();
    let s = seconds_between(origin, t);

    let l0 = (s - x[1]) * (s - x[2]) / ((x[0] - x[1]) * (x[0] - x[2]));
    let l1 = (s - x[0]) * (s - x[2]) / ((x[1] - x[0]) * (x[1] - x[2]));
    let l2 = (s - x[0]) * (s - x[1]) / ((x[2] - x[0]) * (x[2] - x[1]));

    let v = points[0].1.to_dvec3() * l0 + points[1].1.to_dvec3() * l1 + points[2].1.to_dvec3() * l2;
    CartesianPosition::from_dvec3(v, points[0].1.frame)
}

/// Per-object sampled trajectory with jittered refresh scheduling.
#[derive(Debug, Clone, Default)]
pub struct SampledTrajectory {
    config: SamplingConfig,
    window: Option<SampleWindow>,
}

impl SampledTrajectory {
    pub fn new(config: SamplingConfig) -> Self {
        Self {
            config,
            window: None,
        }
    }

    pub fn window(&self) -> Option<&SampleWindow> {
        self.window.as_ref()
    }

    /// Drop the current window (trajectory subscription torn down)
    pub fn clear(&mut self) {
        self.window = None;
    }

    /// Rebuild the window around `reference_time` plus a random offset in
    /// `[0, max_jitter)`. On failure the previous window is kept.
    pub fn refresh<R: Rng + ?Sized>(
        &mut self,
        orbit: &Orbit,
        reference_time: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<&SampleWindow, TrackError> {
        let jitter = if self.config.max_jitter_secs > 0.0 {
            rng.random_range(0.0..self.config.max_jitter_secs)
        } else {
            0.0
        };
        self.refresh_exact(orbit, reference_time + duration_from_secs(jitter))
    }

    /// Rebuild the window with exactly `reference` as its reference epoch.
    pub fn refresh_exact(
        &mut self,
        orbit: &Orbit,
        reference: DateTime<Utc>,
    ) -> Result<&SampleWindow, TrackError> {
        let window = SampleWindow::build(orbit, reference, &self.config)?;
        Ok(self.window.insert(window))
    }

    /// True when no window exists or `current_time` drifted at least the
    /// refresh threshold away from the window reference.
    pub fn needs_refresh(&self, current_time: DateTime<Utc>) -> bool {
        match &self.window {
            None => true,
            Some(w) => {
                seconds_between(w.reference_epoch, current_time).abs()
                    >= self.config.refresh_threshold_secs
            }
        }
    }

    /// Interpolated inertial position, holding edge samples outside the window.
    pub fn value_at(&self, t: DateTime<Utc>) -> Result<CartesianPosition, TrackError> {
        self.window
            .as_ref()
            .and_then(|w| w.value_at(t))
            .ok_or(TrackError::NoOrbitData)
    }

    /// Like [`Self::value_at`] but refuses to answer outside the refresh
    /// tolerance, so the caller can rebuild instead of extrapolating.
    pub fn sample(&self, t: DateTime<Utc>) -> Result<CartesianPosition, TrackError> {
        let window = self.window.as_ref().ok_or(TrackError::NoOrbitData)?;
        let offset_secs = seconds_between(window.reference_epoch, t);
        if offset_secs.abs() >= self.config.refresh_threshold_secs {
            return Err(TrackError::StaleWindowExtrapolation { offset_secs });
        }
        self.value_at(t)
    }

    /// Inertial positions covering one revolution centred on the window
    /// reference, closed back onto the first point when the window spans a
    /// full period. Used as orbit line geometry.
    pub fn orbit_geometry(&self, period_minutes: f64) -> Vec<CartesianPosition> {
        let Some(window) = &self.window else {
            return Vec::new();
        };
        let half_period_secs = period_minutes * 30.0;
        let mut points: Vec<CartesianPosition> = window
            .samples()
            .iter()
            .filter(|(t, _)| seconds_between(window.reference_epoch, *t).abs() <= half_period_secs)
            .map(|(_, p)| *p)
            .collect();
        let span_secs = window.backward_secs.min(window.forward_secs) * 2.0;
        if span_secs >= period_minutes * 60.0 {
            if let Some(first) = points.first().copied() {
                points.push(first);
            }
        }
        points
    }

    /// Earth-fixed sub-track of the whole window
    pub fn ground_track(&self) -> Vec<CartesianPosition> {
        self.window
            .as_ref()
            .map(|w| {
                w.samples()
                    .iter()
                    .map(|(t, p)| inertial_to_fixed(p, *t))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frame;
    use crate::tle::mock_data::iss_2008;
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn setup() -> (Orbit, SampledTrajectory, SmallRng) {
        let orbit = Orbit::new(iss_2008()).unwrap();
        let trajectory = SampledTrajectory::new(SamplingConfig::default());
        (orbit, trajectory, SmallRng::seed_from_u64(42))
    }

    #[test]
    fn test_window_spans_asymmetric_range() {
        let (orbit, mut trajectory, _) = setup();
        let reference = orbit.epoch();
        let window = trajectory.refresh_exact(&orbit, reference).unwrap();

        assert_eq!(window.len(), 271);
        assert_eq!(window.start(), Some(reference - Duration::minutes(60)));
        assert_eq!(window.end(), Some(reference + Duration::minutes(75)));
        assert!(
            window.samples().windows(2).all(|w| w[0].0 < w[1].0),
            "samples must be strictly increasing in time"
        );
    }

    #[test]
    fn test_refresh_jitter_stays_below_threshold() {
        let (orbit, mut trajectory, mut rng) = setup();
        let requested = orbit.epoch();
        let mut offsets = Vec::new();
        for _ in 0..20 {
            let window = trajectory.refresh(&orbit, requested, &mut rng).unwrap();
            let offset = seconds_between(requested, window.reference_epoch);
            assert!((0.0..900.0).contains(&offset), "offset {}", offset);
            offsets.push(offset);
        }
        offsets.dedup();
        assert!(offsets.len() > 1, "refresh offsets should be decorrelated");
    }

    #[test]
    fn test_needs_refresh_threshold() {
        let (orbit, mut trajectory, _) = setup();
        let reference = orbit.epoch();
        assert!(trajectory.needs_refresh(reference));
        trajectory.refresh_exact(&orbit, reference).unwrap();

        assert!(!trajectory.needs_refresh(reference + Duration::minutes(14)));
        assert!(!trajectory.needs_refresh(reference - Duration::minutes(14)));
        assert!(trajectory.needs_refresh(reference + Duration::minutes(15)));
        assert!(trajectory.needs_refresh(reference - Duration::minutes(16)));
    }

    #[test]
    fn test_value_at_sample_times_matches_propagation() {
        let (orbit, mut trajectory, _) = setup();
        trajectory.refresh_exact(&orbit, orbit.epoch()).unwrap();
        let window = trajectory.window().unwrap().clone();

        for (t, _) in window.samples().iter().step_by(7) {
            let interpolated = trajectory.value_at(*t).unwrap();
            let direct = orbit.position_eci(*t).unwrap();
            assert!(
                interpolated.distance(&direct) < 1.0,
                "deviation {} m at {}",
                interpolated.distance(&direct),
                t
            );
        }
    }

    #[test]
    fn test_value_between_samples_is_close_to_propagation() {
        let (orbit, mut trajectory, _) = setup();
        trajectory.refresh_exact(&orbit, orbit.epoch()).unwrap();
        for k in 0..40 {
            let t = orbit.epoch() + Duration::seconds(15 + 61 * k);
            let interpolated = trajectory.value_at(t).unwrap();
            let direct = orbit.position_eci(t).unwrap();
            assert!(
                interpolated.distance(&direct) < 100.0,
                "deviation {} m",
                interpolated.distance(&direct)
            );
        }
    }

    #[test]
    fn test_value_at_holds_edges_outside_window() {
        let (orbit, mut trajectory, _) = setup();
        let window = trajectory.refresh_exact(&orbit, orbit.epoch()).unwrap().clone();
        let first = window.samples()[0].1;
        let last = window.samples()[window.len() - 1].1;

        let before = trajectory
            .value_at(window.start().unwrap() - Duration::hours(3))
            .unwrap();
        let after = trajectory
            .value_at(window.end().unwrap() + Duration::hours(3))
            .unwrap();
        assert_eq!(before, first);
        assert_eq!(after, last);
    }

    #[test]
    fn test_sample_reports_stale_window() {
        let (orbit, mut trajectory, _) = setup();
        assert_eq!(
            trajectory.value_at(orbit.epoch()),
            Err(TrackError::NoOrbitData)
        );
        trajectory.refresh_exact(&orbit, orbit.epoch()).unwrap();

        assert!(trajectory.sample(orbit.epoch() + Duration::minutes(5)).is_ok());
        match trajectory.sample(orbit.epoch() + Duration::minutes(40)) {
            Err(TrackError::StaleWindowExtrapolation { offset_secs }) => {
                assert!((offset_secs - 2400.0).abs() < 1e-6)
            }
            other => panic!("expected stale window, got {:?}", other),
        }
    }

    #[test]
    fn test_orbit_geometry_is_closed_loop() {
        let (orbit, mut trajectory, _) = setup();
        assert!(trajectory.orbit_geometry(92.0).is_empty());
        trajectory.refresh_exact(&orbit, orbit.epoch()).unwrap();
        let line = trajectory.orbit_geometry(orbit.period_minutes().unwrap());
        // +-45.8 minutes around the reference, plus the closing point
        assert_eq!(line.len(), 184);
        assert_eq!(line.first(), line.last());

        let track = trajectory.ground_track();
        assert_eq!(track.len(), 271);
        assert!(track.iter().all(|p| p.frame == Frame::Fixed));
    }
}
