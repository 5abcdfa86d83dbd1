//! Registry of tracked objects
//!
//! Owns every [`TrackedSatellite`] together with the collaborators they share:
//! the primitive container, the batch registry, the event bus and the jitter
//! source. Tag and component enable sets are applied as diffs, so toggling a
//! tag only touches the objects carrying it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bevy::log::{debug, info, warn};
use bevy::prelude::*;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::config::TrackerConfig;
use crate::core::{CartesianPosition, GeodeticPosition, TrackError};
use crate::orbital::{Orbit, SimulationTime, Transit};
use crate::satellite::batch::BatchRegistry;
use crate::satellite::components::{ComponentKind, ObjectId};
use crate::satellite::events::{EventBus, SceneEvent};
use crate::satellite::lifecycle::{LifecycleContext, TrackedSatellite};
use crate::satellite::scene::{Primitive, PrimitiveContainer, PrimitiveId, SceneGraph};
use crate::tle::{OrbitalElementSet, ParseFailure, SatelliteKey, parse_element_sets};

/// Outcome of ingesting a text block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub added: Vec<ObjectId>,
    /// Already tracked; tags were merged
    pub merged: Vec<ObjectId>,
    pub parse_failures: Vec<ParseFailure>,
    /// Parsed but refused by the propagator
    pub rejected: Vec<TrackError>,
}

#[derive(Resource)]
pub struct SatelliteRegistry {
    config: TrackerConfig,
    satellites: BTreeMap<ObjectId, TrackedSatellite>,
    keys: HashMap<SatelliteKey, ObjectId>,
    next_id: u32,
    enabled_tags: BTreeSet<String>,
    enabled_components: BTreeSet<ComponentKind>,
    ground: Option<GeodeticPosition>,
    selected: Option<ObjectId>,
    tracked: Option<ObjectId>,
    scene: Box<dyn PrimitiveContainer + Send + Sync>,
    batches: BatchRegistry,
    events: EventBus,
    rng: SmallRng,
    now: DateTime<Utc>,
}

impl FromWorld for SatelliteRegistry {
    fn from_world(world: &mut World) -> Self {
        let config = world
            .get_resource::<TrackerConfig>()
            .cloned()
            .unwrap_or_default();
        let mut registry = Self::new(config, Box::new(SceneGraph::default()));
        if let Some(sim_time) = world.get_resource::<SimulationTime>() {
            registry.now = sim_time.current_utc;
        }
        registry
    }
}

impl SatelliteRegistry {
    pub fn new(config: TrackerConfig, scene: Box<dyn PrimitiveContainer + Send + Sync>) -> Self {
        let rng = match config.sampling.jitter_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self {
            batches: BatchRegistry::new(&config.batching),
            enabled_components: BTreeSet::from([ComponentKind::Point, ComponentKind::Label]),
            config,
            satellites: BTreeMap::new(),
            keys: HashMap::new(),
            next_id: 0,
            enabled_tags: BTreeSet::new(),
            ground: None,
            selected: None,
            tracked: None,
            scene,
            events: EventBus::default(),
            rng,
            now: Utc::now(),
        }
    }

    /// Run `f` on one object with the shared collaborators borrowed alongside
    fn with_satellite<T>(
        &mut self,
        id: ObjectId,
        f: impl FnOnce(&mut TrackedSatellite, &mut LifecycleContext<'_>) -> T,
    ) -> Option<T> {
        let Self {
            satellites,
            scene,
            batches,
            events,
            rng,
            ground,
            selected,
            tracked,
            now,
            ..
        } = self;
        let satellite = satellites.get_mut(&id)?;
        let mut ctx = LifecycleContext {
            scene: &mut **scene,
            batches,
            events,
            rng,
            ground: *ground,
            selected: *selected,
            tracked: *tracked,
            now: *now,
        };
        Some(f(satellite, &mut ctx))
    }

    fn enable_on(&mut self, id: ObjectId, kind: ComponentKind) {
        if let Some(Err(e)) = self.with_satellite(id, |s, ctx| s.enable_component(kind, ctx)) {
            warn!("{}: could not enable {}: {}", id, kind, e);
        }
    }

    fn disable_on(&mut self, id: ObjectId, kind: ComponentKind) {
        self.with_satellite(id, |s, ctx| s.disable_component(kind, ctx));
    }

    fn show(&mut self, id: ObjectId) {
        let kinds: Vec<_> = self.enabled_components.iter().copied().collect();
        for kind in kinds {
            self.enable_on(id, kind);
        }
    }

    fn hide(&mut self, id: ObjectId) {
        self.with_satellite(id, |s, ctx| s.disable_all(ctx));
    }

    fn wanted(&self, id: ObjectId) -> bool {
        self.satellites
            .get(&id)
            .is_some_and(|s| s.has_any_tag(&self.enabled_tags))
    }

    /// Start tracking an element set, or merge `tags` into the object that
    /// already has the same catalog number and name.
    pub fn add<S: Into<String>>(
        &mut self,
        elements: OrbitalElementSet,
        tags: impl IntoIterator<Item = S>,
    ) -> Result<ObjectId, TrackError> {
        let key = elements.key().ok_or_else(|| TrackError::InvalidElementSet {
            name: elements.name().to_string(),
            reason: "unreadable catalog number".to_string(),
        })?;
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();

        if let Some(&id) = self.keys.get(&key) {
            let new_tags = self
                .satellites
                .get_mut(&id)
                .map(|s| s.add_tags(tags))
                .unwrap_or_default();
            let newly_wanted = new_tags.iter().any(|t| self.enabled_tags.contains(t));
            if newly_wanted && !self.is_visible(id) {
                self.show(id);
            }
            return Ok(id);
        }

        let orbit = Orbit::new(elements)?;
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        debug!("tracking {} as {}", orbit.name(), id);
        self.satellites
            .insert(id, TrackedSatellite::new(id, orbit, tags, &self.config));
        self.keys.insert(key, id);
        if self.wanted(id) {
            self.show(id);
        }
        Ok(id)
    }

    /// Ingest a block of element sets. Bad records are reported, never fatal.
    pub fn add_from_text<S: Into<String> + Clone>(&mut self, text: &str, tags: &[S]) -> IngestReport {
        let (sets, parse_failures) = parse_element_sets(text);
        let mut report = IngestReport {
            parse_failures,
            ..Default::default()
        };
        for failure in &report.parse_failures {
            warn!("skipping element set at line {}: {}", failure.line, failure.reason);
        }

        for elements in sets {
            let before = self.satellites.len();
            match self.add(elements, tags.iter().cloned()) {
                Ok(id) if self.satellites.len() > before => report.added.push(id),
                Ok(id) => report.merged.push(id),
                Err(e) => {
                    warn!("{}", e);
                    report.rejected.push(e);
                }
            }
        }

        info!(
            "ingested {} new, {} merged, {} skipped",
            report.added.len(),
            report.merged.len(),
            report.parse_failures.len() + report.rejected.len()
        );
        report
    }

    /// Stop tracking `id`, releasing every component and subscription.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), TrackError> {
        if !self.satellites.contains_key(&id) {
            return Err(TrackError::UnknownObject(id));
        }
        self.hide(id);
        if let Some(satellite) = self.satellites.remove(&id) {
            if let Some(key) = satellite.orbit().elements().key() {
                self.keys.remove(&key);
            }
        }
        if self.selected == Some(id) {
            self.selected = None;
            self.dispatch(SceneEvent::SelectionChanged(None));
        }
        if self.tracked == Some(id) {
            self.tracked = None;
            self.dispatch(SceneEvent::TrackedChanged(None));
        }
        Ok(())
    }

    /// Replace the enabled tag set, showing and hiding only the objects whose
    /// visibility changes.
    pub fn set_enabled_tags<S: Into<String>>(&mut self, tags: impl IntoIterator<Item = S>) {
        let new: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        if new == self.enabled_tags {
            return;
        }
        let old = std::mem::replace(&mut self.enabled_tags, new);
        let changed: BTreeSet<String> = old
            .symmetric_difference(&self.enabled_tags)
            .cloned()
            .collect();

        let affected: Vec<(ObjectId, bool, bool)> = self
            .satellites
            .values()
            .filter(|s| s.has_any_tag(&changed))
            .map(|s| (s.id(), s.has_any_tag(&old), s.has_any_tag(&self.enabled_tags)))
            .collect();
        for (id, was, is) in affected {
            match (was, is) {
                (false, true) => self.show(id),
                (true, false) => self.hide(id),
                _ => {}
            }
        }
    }

    pub fn enable_tag(&mut self, tag: &str) {
        let mut tags = self.enabled_tags.clone();
        tags.insert(tag.to_string());
        self.set_enabled_tags(tags);
    }

    pub fn disable_tag(&mut self, tag: &str) {
        let mut tags = self.enabled_tags.clone();
        tags.remove(tag);
        self.set_enabled_tags(tags);
    }

    /// Replace the enabled component set, applying only the difference to
    /// shown objects.
    pub fn set_enabled_components(&mut self, kinds: impl IntoIterator<Item = ComponentKind>) {
        let new: BTreeSet<ComponentKind> = kinds.into_iter().collect();
        let added: Vec<_> = new.difference(&self.enabled_components).copied().collect();
        let removed: Vec<_> = self.enabled_components.difference(&new).copied().collect();
        self.enabled_components = new;

        for id in self.wanted_satellites() {
            for kind in &removed {
                self.disable_on(id, *kind);
            }
            for kind in &added {
                self.enable_on(id, *kind);
            }
        }
    }

    pub fn enable_component(&mut self, kind: ComponentKind) {
        let mut kinds = self.enabled_components.clone();
        kinds.insert(kind);
        self.set_enabled_components(kinds);
    }

    pub fn disable_component(&mut self, kind: ComponentKind) {
        let mut kinds = self.enabled_components.clone();
        kinds.remove(&kind);
        self.set_enabled_components(kinds);
    }

    /// Move (or clear) the observer for every object and the ground station
    pub fn set_ground_position(&mut self, ground: Option<GeodeticPosition>) {
        if self.ground == ground {
            return;
        }
        self.ground = ground;
        match ground {
            Some(g) => {
                self.scene
                    .add(PrimitiveId::GroundStation, Primitive::GroundStation(g));
                let (lon, lat) = g.as_degrees();
                info!("ground position set to {:.4}°, {:.4}°, {:.0} m", lat, lon, g.height);
            }
            None => {
                self.scene.remove(PrimitiveId::GroundStation);
                info!("ground position cleared");
            }
        }
        self.scene.request_redraw();

        let ids: Vec<ObjectId> = self.satellites.keys().copied().collect();
        for id in ids {
            self.with_satellite(id, |s, ctx| s.set_ground_position(ctx));
        }

        // Links that could not exist without an observer
        if ground.is_some() && self.enabled_components.contains(&ComponentKind::GroundStationLink) {
            for id in self.wanted_satellites() {
                self.enable_on(id, ComponentKind::GroundStationLink);
            }
        }
    }

    pub fn select(&mut self, id: Option<ObjectId>) -> Result<(), TrackError> {
        self.check_known(id)?;
        if self.selected != id {
            self.selected = id;
            self.dispatch(SceneEvent::SelectionChanged(id));
        }
        Ok(())
    }

    pub fn track(&mut self, id: Option<ObjectId>) -> Result<(), TrackError> {
        self.check_known(id)?;
        if self.tracked != id {
            self.tracked = id;
            self.dispatch(SceneEvent::TrackedChanged(id));
        }
        Ok(())
    }

    fn check_known(&self, id: Option<ObjectId>) -> Result<(), TrackError> {
        match id {
            Some(id) if !self.satellites.contains_key(&id) => Err(TrackError::UnknownObject(id)),
            _ => Ok(()),
        }
    }

    fn dispatch(&mut self, event: SceneEvent) {
        for id in self.events.recipients(&event) {
            if let Some(Err(e)) = self.with_satellite(id, |s, ctx| s.handle_event(&event, ctx)) {
                warn!("{}: {}", id, e);
            }
        }
    }

    /// Advance to `now`: notify subscribed objects, then step batch builds.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.now = now;
        self.dispatch(SceneEvent::ClockTick(now));
        self.batches.advance(&mut *self.scene);
    }

    pub fn position_at(&mut self, id: ObjectId, t: DateTime<Utc>) -> Result<CartesianPosition, TrackError> {
        let Self { satellites, rng, .. } = self;
        satellites
            .get_mut(&id)
            .ok_or(TrackError::UnknownObject(id))?
            .position_at(t, rng)
    }

    pub fn position_geodetic(
        &mut self,
        id: ObjectId,
        t: DateTime<Utc>,
    ) -> Result<GeodeticPosition, TrackError> {
        self.satellites
            .get_mut(&id)
            .ok_or(TrackError::UnknownObject(id))?
            .position_geodetic(t)
    }

    /// Transits of `id` over the current observer; empty without one.
    pub fn transits_in_range(
        &mut self,
        id: ObjectId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transit>, TrackError> {
        Ok(self
            .satellites
            .get_mut(&id)
            .ok_or(TrackError::UnknownObject(id))?
            .transits_in_range(start, end))
    }

    pub fn describe(&mut self, id: ObjectId) -> Option<String> {
        let now = self.now;
        self.satellites.get_mut(&id)?.describe(now)
    }

    /// Component kinds shown for every visible object
    pub fn enabled_components(&self) -> &BTreeSet<ComponentKind> {
        &self.enabled_components
    }

    /// Components actually live on `id`
    pub fn components_of(&self, id: ObjectId) -> Vec<ComponentKind> {
        self.satellites
            .get(&id)
            .map(|s| s.enabled_components())
            .unwrap_or_default()
    }

    /// Every tag carried by at least one object
    pub fn tags(&self) -> BTreeSet<String> {
        self.satellites
            .values()
            .flat_map(|s| s.tags().iter().cloned())
            .collect()
    }

    pub fn tags_of(&self, id: ObjectId) -> Option<&BTreeSet<String>> {
        self.satellites.get(&id).map(|s| s.tags())
    }

    pub fn enabled_tags(&self) -> &BTreeSet<String> {
        &self.enabled_tags
    }

    pub fn is_visible(&self, id: ObjectId) -> bool {
        self.satellites.get(&id).is_some_and(|s| s.is_visible())
    }

    pub fn satellites_with_tag(&self, tag: &str) -> Vec<ObjectId> {
        self.satellites
            .values()
            .filter(|s| s.tags().contains(tag))
            .map(|s| s.id())
            .collect()
    }

    pub fn visible_satellites(&self) -> Vec<ObjectId> {
        self.satellites
            .values()
            .filter(|s| s.is_visible())
            .map(|s| s.id())
            .collect()
    }

    /// Objects whose tags are enabled, shown or not
    fn wanted_satellites(&self) -> Vec<ObjectId> {
        self.satellites
            .values()
            .filter(|s| s.has_any_tag(&self.enabled_tags))
            .map(|s| s.id())
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.satellites
            .values()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .map(|s| s.id())
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedSatellite> {
        self.satellites.get(&id)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.satellites.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    pub fn tracked(&self) -> Option<ObjectId> {
        self.tracked
    }

    pub fn ground_position(&self) -> Option<GeodeticPosition> {
        self.ground
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn scene(&self) -> &dyn PrimitiveContainer {
        self.scene.as_ref()
    }

    pub fn batches(&self) -> &BatchRegistry {
        &self.batches
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
