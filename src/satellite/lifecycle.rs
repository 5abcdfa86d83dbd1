//! Per-object component lifecycle
//!
//! A tracked object starts `Uninitialized`. Enabling its first component
//! creates the scaffolding (clock, selection and tracking subscriptions plus
//! the description provider) and moves it to `Created`. Disabling its last
//! component tears all of that down again and drops the sample window.

use std::collections::BTreeSet;

use bevy::log::debug;
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;

use crate::config::{LabelConfig, TrackerConfig};
use crate::core::{CartesianPosition, GeodeticPosition, TrackError};
use crate::orbital::{Orbit, SampledTrajectory, Transit, TransitFinder};
use crate::satellite::batch::BatchRegistry;
use crate::satellite::components::{ComponentKind, DescriptorContext, ObjectId};
use crate::satellite::events::{EventBus, EventKind, SceneEvent, SubscriptionHandle};
use crate::satellite::scene::{Primitive, PrimitiveContainer, PrimitiveId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Created,
}

/// Shared collaborators a lifecycle operation may touch
pub struct LifecycleContext<'a> {
    pub scene: &'a mut dyn PrimitiveContainer,
    pub batches: &'a mut BatchRegistry,
    pub events: &'a mut EventBus,
    pub rng: &'a mut SmallRng,
    pub ground: Option<GeodeticPosition>,
    pub selected: Option<ObjectId>,
    pub tracked: Option<ObjectId>,
    pub now: DateTime<Utc>,
}

#[derive(Debug)]
struct Scaffolding {
    clock: SubscriptionHandle,
    selection: SubscriptionHandle,
    tracking: SubscriptionHandle,
}

pub struct TrackedSatellite {
    id: ObjectId,
    orbit: Orbit,
    trajectory: SampledTrajectory,
    transits: TransitFinder,
    tags: BTreeSet<String>,
    scaffolding: Option<Scaffolding>,
    enabled: BTreeSet<ComponentKind>,
    labels: LabelConfig,
    min_elevation_deg: f64,
    selected: bool,
    tracked: bool,
}

impl TrackedSatellite {
    pub fn new(id: ObjectId, orbit: Orbit, tags: BTreeSet<String>, config: &TrackerConfig) -> Self {
        Self {
            id,
            orbit,
            trajectory: SampledTrajectory::new(config.sampling.clone()),
            transits: TransitFinder::new(config.transits.clone()),
            tags,
            scaffolding: None,
            enabled: BTreeSet::new(),
            labels: config.labels.clone(),
            min_elevation_deg: config.transits.min_elevation_deg,
            selected: false,
            tracked: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.orbit.name()
    }

    pub fn orbit(&self) -> &Orbit {
        &self.orbit
    }

    pub fn trajectory(&self) -> &SampledTrajectory {
        &self.trajectory
    }

    pub fn transit_finder(&self) -> &TransitFinder {
        &self.transits
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }

    /// Merge tags, returning the ones that were new
    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = String>) -> Vec<String> {
        tags.into_iter()
            .filter(|t| self.tags.insert(t.clone()))
            .collect()
    }

    pub fn state(&self) -> LifecycleState {
        if self.scaffolding.is_some() {
            LifecycleState::Created
        } else {
            LifecycleState::Uninitialized
        }
    }

    pub fn enabled_components(&self) -> Vec<ComponentKind> {
        self.enabled.iter().copied().collect()
    }

    pub fn is_enabled(&self, kind: ComponentKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn is_visible(&self) -> bool {
        !self.enabled.is_empty()
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    fn create(&mut self, ctx: &mut LifecycleContext) {
        self.scaffolding = Some(Scaffolding {
            clock: ctx.events.subscribe(EventKind::ClockTick, self.id),
            selection: ctx.events.subscribe(EventKind::SelectionChanged, self.id),
            tracking: ctx.events.subscribe(EventKind::TrackedChanged, self.id),
        });
        self.selected = ctx.selected == Some(self.id);
        self.tracked = ctx.tracked == Some(self.id);
        self.transits.set_ground_position(ctx.ground);
        debug!("{} ({}) created", self.name(), self.id);
    }

    fn teardown(&mut self, ctx: &mut LifecycleContext) {
        if let Some(s) = self.scaffolding.take() {
            ctx.events.unsubscribe(s.clock);
            ctx.events.unsubscribe(s.selection);
            ctx.events.unsubscribe(s.tracking);
        }
        self.trajectory.clear();
        self.transits.invalidate();
        self.selected = false;
        self.tracked = false;
        debug!("{} ({}) torn down", self.name(), self.id);
    }

    fn descriptor_context(&self, ground: Option<GeodeticPosition>) -> DescriptorContext<'_> {
        let label_offset_px = if self.enabled.contains(&ComponentKind::Model) {
            self.labels.model_offset_px
        } else {
            self.labels.offset_px
        };
        DescriptorContext {
            owner: self.id,
            name: self.orbit.name(),
            trajectory: &self.trajectory,
            period_minutes: self.orbit.period_minutes(),
            ground,
            label_offset_px,
            min_elevation_deg: self.min_elevation_deg,
        }
    }

    /// Construct (or replace) the primitive backing `kind`
    fn build_component(&self, kind: ComponentKind, ctx: &mut LifecycleContext) -> bool {
        let descriptors = self.descriptor_context(ctx.ground);
        if let Some(key) = kind.batch_key() {
            let (positions, closed) = descriptors.geometry(kind);
            ctx.batches
                .register(key, self.id, positions, closed, &mut *ctx.scene);
            return true;
        }
        match descriptors.describe(kind) {
            Some(descriptor) => {
                ctx.scene.add(
                    PrimitiveId::Component(self.id, kind),
                    Primitive::Single(descriptor),
                );
                true
            }
            None => false,
        }
    }

    fn ensure_window(&mut self, ctx: &mut LifecycleContext) -> Result<(), TrackError> {
        if self.trajectory.needs_refresh(ctx.now) {
            self.trajectory
                .refresh(&self.orbit, ctx.now, &mut *ctx.rng)?;
        }
        Ok(())
    }

    /// Make `kind` visible, creating scaffolding and the component on first use.
    /// Returns false when nothing changed.
    pub fn enable_component(
        &mut self,
        kind: ComponentKind,
        ctx: &mut LifecycleContext,
    ) -> Result<bool, TrackError> {
        if self.enabled.contains(&kind) {
            return Ok(false);
        }
        if kind.requires_ground() && ctx.ground.is_none() {
            debug!("{}: {} needs a ground position", self.id, kind);
            return Ok(false);
        }

        if self.scaffolding.is_none() {
            self.create(ctx);
        }
        if let Err(e) = self.ensure_window(ctx) {
            if self.enabled.is_empty() {
                self.teardown(ctx);
            }
            return Err(e);
        }

        if !self.build_component(kind, ctx) {
            if self.enabled.is_empty() {
                self.teardown(ctx);
            }
            return Ok(false);
        }
        self.enabled.insert(kind);

        // Model and label share screen space
        if kind == ComponentKind::Model && self.enabled.contains(&ComponentKind::Label) {
            self.build_component(ComponentKind::Label, ctx);
        }
        Ok(true)
    }

    /// Hide `kind` on this tick. Disabling the last component tears the
    /// object down. Returns false when it was not enabled.
    pub fn disable_component(&mut self, kind: ComponentKind, ctx: &mut LifecycleContext) -> bool {
        if !self.enabled.remove(&kind) {
            return false;
        }
        match kind.batch_key() {
            Some(key) => {
                ctx.batches.unregister(key, self.id, &mut *ctx.scene);
            }
            None => {
                ctx.scene.remove(PrimitiveId::Component(self.id, kind));
            }
        }

        if kind == ComponentKind::Model && self.enabled.contains(&ComponentKind::Label) {
            self.build_component(ComponentKind::Label, ctx);
        }
        if self.enabled.is_empty() {
            self.teardown(ctx);
        }
        true
    }

    pub fn disable_all(&mut self, ctx: &mut LifecycleContext) {
        for kind in self.enabled_components() {
            self.disable_component(kind, ctx);
        }
    }

    /// React to an event this object subscribed to.
    pub fn handle_event(
        &mut self,
        event: &SceneEvent,
        ctx: &mut LifecycleContext,
    ) -> Result<(), TrackError> {
        match *event {
            SceneEvent::ClockTick(now) => {
                if self.trajectory.needs_refresh(now) {
                    self.trajectory
                        .refresh(&self.orbit, now, &mut *ctx.rng)?;
                    for kind in self.enabled_components() {
                        if kind.follows_window() {
                            self.build_component(kind, ctx);
                        }
                    }
                }
            }
            SceneEvent::SelectionChanged(selected) => self.selected = selected == Some(self.id),
            SceneEvent::TrackedChanged(tracked) => self.tracked = tracked == Some(self.id),
        }
        if self.selected || self.tracked {
            self.transits.refresh_around(&self.orbit, ctx.now);
        }
        Ok(())
    }

    /// New observer for transits and the ground link
    pub fn set_ground_position(&mut self, ctx: &mut LifecycleContext) {
        self.transits.set_ground_position(ctx.ground);
        if self.state() == LifecycleState::Created && (self.selected || self.tracked) {
            self.transits.refresh_around(&self.orbit, ctx.now);
        }
        if self.enabled.contains(&ComponentKind::GroundStationLink) {
            if ctx.ground.is_some() {
                self.build_component(ComponentKind::GroundStationLink, ctx);
            } else {
                self.disable_component(ComponentKind::GroundStationLink, ctx);
            }
        }
    }

    /// Inertial position from the sample window. A query outside the window
    /// tolerance rebuilds the window around `t` first.
    pub fn position_at(
        &mut self,
        t: DateTime<Utc>,
        rng: &mut SmallRng,
    ) -> Result<CartesianPosition, TrackError> {
        match self.trajectory.sample(t) {
            Err(TrackError::StaleWindowExtrapolation { .. } | TrackError::NoOrbitData) => {
                debug!("{}: rebuilding sample window around {}", self.id, t);
                self.trajectory.refresh(&self.orbit, t, rng)?;
                self.trajectory.value_at(t)
            }
            other => other,
        }
    }

    pub fn position_geodetic(&mut self, t: DateTime<Utc>) -> Result<GeodeticPosition, TrackError> {
        self.orbit.position_geodetic(t, true)
    }

    pub fn transits_in_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Transit> {
        self.transits.transits_in_range(&self.orbit, start, end)
    }

    /// Plain-text description; only available while created
    pub fn describe(&mut self, now: DateTime<Utc>) -> Option<String> {
        self.scaffolding.as_ref()?;

        let mut text = format!("{} (NORAD {})\n", self.orbit.name(), self.orbit.catalog_number());
        match self.orbit.position_geodetic(now, true) {
            Ok(g) => {
                let (lon, lat) = g.as_degrees();
                text.push_str(&format!(
                    "Position: {:.3}° lat, {:.3}° lon, {:.1} km\n",
                    lat,
                    lon,
                    g.height / 1000.0
                ));
            }
            Err(e) => text.push_str(&format!("Position unknown: {}\n", e)),
        }
        if let Some(period) = self.orbit.period_minutes() {
            text.push_str(&format!("Period: {:.1} min\n", period));
        }
        if let Some(next) = self.transits.cached().and_then(|s| s.next_after(now)) {
            text.push_str(&format!(
                "Next pass: {} to {}, max elevation {:.1}°\n",
                next.start.format("%Y-%m-%d %H:%M:%S"),
                next.end.format("%H:%M:%S"),
                next.max_elevation_deg
            ));
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::components::{BatchKey, ShapeParams};
    use crate::satellite::scene::SceneGraph;
    use crate::tle::mock_data::iss_2008;
    use chrono::Duration;
    use rand::SeedableRng;

    struct Harness {
        scene: SceneGraph,
        batches: BatchRegistry,
        events: EventBus,
        rng: SmallRng,
        ground: Option<GeodeticPosition>,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new(now: DateTime<Utc>) -> Self {
            Self {
                scene: SceneGraph::default(),
                batches: BatchRegistry::default(),
                events: EventBus::default(),
                rng: SmallRng::seed_from_u64(42),
                ground: None,
                now,
            }
        }

        fn ctx(&mut self) -> LifecycleContext<'_> {
            LifecycleContext {
                scene: &mut self.scene,
                batches: &mut self.batches,
                events: &mut self.events,
                rng: &mut self.rng,
                ground: self.ground,
                selected: None,
                tracked: None,
                now: self.now,
            }
        }
    }

    fn iss() -> TrackedSatellite {
        let orbit = Orbit::new(iss_2008()).unwrap();
        TrackedSatellite::new(ObjectId(1), orbit, BTreeSet::new(), &TrackerConfig::default())
    }

    fn label_offset(scene: &SceneGraph) -> [f32; 2] {
        match scene.get(PrimitiveId::Component(ObjectId(1), ComponentKind::Label)) {
            Some(Primitive::Single(d)) => match &d.shape {
                ShapeParams::Label { offset_px, .. } => *offset_px,
                other => panic!("unexpected shape {:?}", other),
            },
            other => panic!("label missing: {:?}", other),
        }
    }

    #[test]
    fn test_enable_twice_leaves_one_instance() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());

        assert_eq!(sat.enable_component(ComponentKind::Point, &mut h.ctx()), Ok(true));
        assert_eq!(sat.enable_component(ComponentKind::Point, &mut h.ctx()), Ok(false));
        assert_eq!(h.scene.owned_by(ObjectId(1)), vec![ComponentKind::Point]);
        assert_eq!(sat.state(), LifecycleState::Created);
        assert_eq!(sat.enabled_components(), vec![ComponentKind::Point]);
    }

    #[test]
    fn test_repeated_cycles_never_duplicate_listeners() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());

        for _ in 0..3 {
            sat.enable_component(ComponentKind::Point, &mut h.ctx()).unwrap();
            sat.enable_component(ComponentKind::Label, &mut h.ctx()).unwrap();
            assert_eq!(h.events.listener_count(EventKind::ClockTick), 1);
            assert_eq!(h.events.listener_count(EventKind::SelectionChanged), 1);
            assert_eq!(h.events.subscriptions_of(ObjectId(1)), 3);
            assert!(sat.trajectory().window().is_some());

            sat.disable_component(ComponentKind::Point, &mut h.ctx());
            assert_eq!(sat.state(), LifecycleState::Created);
            sat.disable_component(ComponentKind::Label, &mut h.ctx());

            assert_eq!(sat.state(), LifecycleState::Uninitialized);
            assert_eq!(h.events.subscriptions_of(ObjectId(1)), 0);
            assert!(sat.trajectory().window().is_none());
            assert!(h.scene.is_empty());
        }
    }

    #[test]
    fn test_model_moves_label_and_restores_it() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());
        let labels = LabelConfig::default();

        sat.enable_component(ComponentKind::Label, &mut h.ctx()).unwrap();
        assert_eq!(label_offset(&h.scene), labels.offset_px);
        sat.enable_component(ComponentKind::Model, &mut h.ctx()).unwrap();
        assert_eq!(label_offset(&h.scene), labels.model_offset_px);
        sat.disable_component(ComponentKind::Model, &mut h.ctx());
        assert_eq!(label_offset(&h.scene), labels.offset_px);
    }

    #[test]
    fn test_orbit_line_joins_batch_and_leaves_on_disable() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());

        sat.enable_component(ComponentKind::Orbit, &mut h.ctx()).unwrap();
        assert!(h.batches.is_member(BatchKey::OrbitLines, ObjectId(1)));
        assert!(h.scene.owned_by(ObjectId(1)).is_empty());
        while !h.batches.is_settled() {
            h.batches.advance(&mut h.scene);
        }
        assert!(h.batches.live_primitive(BatchKey::OrbitLines).is_some());

        sat.disable_component(ComponentKind::Orbit, &mut h.ctx());
        assert_eq!(h.batches.member_count(BatchKey::OrbitLines), 0);
        assert!(h.scene.is_empty(), "last member destroys the shared primitive");
    }

    #[test]
    fn test_ground_link_follows_ground_position() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());
        let link = PrimitiveId::Component(ObjectId(1), ComponentKind::GroundStationLink);

        assert_eq!(
            sat.enable_component(ComponentKind::GroundStationLink, &mut h.ctx()),
            Ok(false)
        );
        assert_eq!(sat.state(), LifecycleState::Uninitialized);

        h.ground = Some(GeodeticPosition::from_degrees(11.58, 48.14, 519.0));
        sat.enable_component(ComponentKind::Point, &mut h.ctx()).unwrap();
        assert_eq!(
            sat.enable_component(ComponentKind::GroundStationLink, &mut h.ctx()),
            Ok(true)
        );
        assert!(h.scene.contains(link));

        h.ground = None;
        sat.set_ground_position(&mut h.ctx());
        assert!(!h.scene.contains(link));
        assert!(!sat.is_enabled(ComponentKind::GroundStationLink));
        assert!(sat.is_enabled(ComponentKind::Point));
    }

    #[test]
    fn test_clock_tick_rebuilds_stale_window_and_tracks() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());
        sat.enable_component(ComponentKind::GroundTrack, &mut h.ctx()).unwrap();
        let first = sat.trajectory().window().unwrap().reference_epoch;

        let later = h.now + Duration::minutes(40);
        h.now = later;
        sat.handle_event(&SceneEvent::ClockTick(later), &mut h.ctx())
            .unwrap();
        let second = sat.trajectory().window().unwrap().reference_epoch;
        assert!(second > first);
        assert!(second >= later && second < later + Duration::minutes(15));

        match h
            .scene
            .get(PrimitiveId::Component(ObjectId(1), ComponentKind::GroundTrack))
        {
            Some(Primitive::Single(d)) => match &d.shape {
                ShapeParams::Polyline { positions, .. } => assert_eq!(positions.len(), 271),
                other => panic!("unexpected shape {:?}", other),
            },
            other => panic!("ground track missing: {:?}", other),
        }
    }

    #[test]
    fn test_stale_query_refreshes_synchronously() {
        let mut sat = iss();
        let mut rng = SmallRng::seed_from_u64(3);
        let t = sat.orbit().epoch() + Duration::hours(5);

        let sampled = sat.position_at(t, &mut rng).unwrap();
        let direct = sat.orbit().position_eci(t).unwrap();
        assert!(sampled.distance(&direct) < 1_000.0);
        let reference = sat.trajectory().window().unwrap().reference_epoch;
        assert!(reference >= t && reference < t + Duration::minutes(15));
    }

    #[test]
    fn test_description_only_while_created() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());
        assert!(sat.describe(h.now).is_none());

        sat.enable_component(ComponentKind::Point, &mut h.ctx()).unwrap();
        let text = sat.describe(h.now).unwrap();
        assert!(text.starts_with("ISS (ZARYA) (NORAD 25544)"));
        assert!(text.contains("Period:"));
    }

    #[test]
    fn test_selection_event_enables_transit_cache() {
        let mut sat = iss();
        let mut h = Harness::new(sat.orbit().epoch());
        h.ground = Some(GeodeticPosition::from_degrees(11.58, 48.14, 519.0));
        sat.enable_component(ComponentKind::Point, &mut h.ctx()).unwrap();
        assert!(sat.transit_finder().cached().is_none());

        sat.handle_event(&SceneEvent::SelectionChanged(Some(ObjectId(1))), &mut h.ctx())
            .unwrap();
        assert!(sat.is_selected());
        assert!(sat.transit_finder().cached().is_some());

        sat.handle_event(&SceneEvent::SelectionChanged(Some(ObjectId(2))), &mut h.ctx())
            .unwrap();
        assert!(!sat.is_selected());
    }
}
