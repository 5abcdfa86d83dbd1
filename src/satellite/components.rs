//! Visual component identities and the renderer-agnostic descriptors built for them

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{CartesianPosition, GeodeticPosition};
use crate::orbital::SampledTrajectory;

/// Identity of one tracked object inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object-{}", self.0)
    }
}

/// Key of a primitive shared by many objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BatchKey {
    OrbitLines,
}

/// Named visual capability of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Point,
    Label,
    Model,
    /// Full orbit line, merged with every other object's into one primitive
    Orbit,
    /// Sampled path over the current window in the inertial frame
    OrbitTrack,
    GroundTrack,
    VisibilityArea,
    HeightStick,
    SensorCone,
    GroundStationLink,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::Point,
        ComponentKind::Label,
        ComponentKind::Model,
        ComponentKind::Orbit,
        ComponentKind::OrbitTrack,
        ComponentKind::GroundTrack,
        ComponentKind::VisibilityArea,
        ComponentKind::HeightStick,
        ComponentKind::SensorCone,
        ComponentKind::GroundStationLink,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Point => "Point",
            ComponentKind::Label => "Label",
            ComponentKind::Model => "Model",
            ComponentKind::Orbit => "Orbit",
            ComponentKind::OrbitTrack => "Orbit track",
            ComponentKind::GroundTrack => "Ground track",
            ComponentKind::VisibilityArea => "Visibility area",
            ComponentKind::HeightStick => "Height stick",
            ComponentKind::SensorCone => "Sensor cone",
            ComponentKind::GroundStationLink => "Ground station link",
        }
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Shared primitive this component is merged into, if any
    pub fn batch_key(self) -> Option<BatchKey> {
        match self {
            ComponentKind::Orbit => Some(BatchKey::OrbitLines),
            _ => None,
        }
    }

    pub fn is_batched(self) -> bool {
        self.batch_key().is_some()
    }

    /// Only meaningful while a ground position is set
    pub fn requires_ground(self) -> bool {
        matches!(self, ComponentKind::GroundStationLink)
    }

    /// Geometry derived from the sample window; rebuilt when the window refreshes
    pub fn follows_window(self) -> bool {
        matches!(
            self,
            ComponentKind::Orbit | ComponentKind::OrbitTrack | ComponentKind::GroundTrack
        )
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the renderer reads a component's position from
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSource {
    /// Interpolated from the owner's sample window (`position_at`)
    Sampled(ObjectId),
    /// Sub-satellite point of the owner, at zero height
    SubSatellite(ObjectId),
    Fixed(CartesianPosition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Unoriented,
    /// Along the velocity vector
    Prograde,
    /// Pointing at Earth's center
    Nadir,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeParams {
    Point { pixel_size: f32 },
    Label { text: String, offset_px: [f32; 2] },
    Model { scale: f32 },
    Polyline { positions: Vec<CartesianPosition>, closed: bool },
    /// Footprint on the ground for the given minimum elevation
    Footprint { min_elevation_deg: f64 },
    /// Vertical line from the sub-satellite point up to the object
    Stick,
    Cone { half_angle_deg: f64 },
    Link { ground: GeodeticPosition },
}

/// Everything a renderer needs to draw one component
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicDescriptor {
    pub owner: ObjectId,
    pub kind: ComponentKind,
    pub position: PositionSource,
    pub orientation: Orientation,
    pub shape: ShapeParams,
    pub show: bool,
}

/// Inputs for building a descriptor
pub struct DescriptorContext<'a> {
    pub owner: ObjectId,
    pub name: &'a str,
    pub trajectory: &'a SampledTrajectory,
    pub period_minutes: Option<f64>,
    pub ground: Option<GeodeticPosition>,
    pub label_offset_px: [f32; 2],
    pub min_elevation_deg: f64,
}

impl DescriptorContext<'_> {
    /// Polyline vertices for window-derived components
    pub fn geometry(&self, kind: ComponentKind) -> (Vec<CartesianPosition>, bool) {
        match kind {
            // Already closed onto its first vertex when it spans a revolution
            ComponentKind::Orbit => (
                self.trajectory
                    .orbit_geometry(self.period_minutes.unwrap_or(0.0)),
                false,
            ),
            ComponentKind::OrbitTrack => (
                self.trajectory
                    .window()
                    .map(|w| w.samples().iter().map(|(_, p)| *p).collect())
                    .unwrap_or_default(),
                false,
            ),
            ComponentKind::GroundTrack => (self.trajectory.ground_track(), false),
            _ => (Vec::new(), false),
        }
    }

    /// Descriptor for an exclusive component; `None` when it cannot exist right now
    pub fn describe(&self, kind: ComponentKind) -> Option<GraphicDescriptor> {
        let sampled = PositionSource::Sampled(self.owner);
        let (position, orientation, shape) = match kind {
            ComponentKind::Point => (sampled, Orientation::Unoriented, ShapeParams::Point { pixel_size: 6.0 }),
            ComponentKind::Label => (
                sampled,
                Orientation::Unoriented,
                ShapeParams::Label {
                    text: self.name.to_string(),
                    offset_px: self.label_offset_px,
                },
            ),
            ComponentKind::Model => (sampled, Orientation::Prograde, ShapeParams::Model { scale: 1.0 }),
            ComponentKind::OrbitTrack | ComponentKind::GroundTrack => {
                let (positions, closed) = self.geometry(kind);
                (
                    PositionSource::Fixed(positions.first().copied()?),
                    Orientation::Unoriented,
                    ShapeParams::Polyline { positions, closed },
                )
            }
            ComponentKind::VisibilityArea => (
                PositionSource::SubSatellite(self.owner),
                Orientation::Unoriented,
                ShapeParams::Footprint {
                    min_elevation_deg: self.min_elevation_deg,
                },
            ),
            ComponentKind::HeightStick => (sampled, Orientation::Nadir, ShapeParams::Stick),
            ComponentKind::SensorCone => (
                sampled,
                Orientation::Nadir,
                ShapeParams::Cone { half_angle_deg: 30.0 },
            ),
            ComponentKind::GroundStationLink => (
                sampled,
                Orientation::Unoriented,
                ShapeParams::Link { ground: self.ground? },
            ),
            ComponentKind::Orbit => return None,
        };
        Some(GraphicDescriptor {
            owner: self.owner,
            kind,
            position,
            orientation,
            shape,
            show: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Point", ComponentKind::Point)]
    #[case("orbit", ComponentKind::Orbit)]
    #[case(" Ground track ", ComponentKind::GroundTrack)]
    #[case("SENSOR CONE", ComponentKind::SensorCone)]
    fn test_component_from_name(#[case] name: &str, #[case] expected: ComponentKind) {
        assert_eq!(ComponentKind::from_name(name), Some(expected));
    }

    #[test]
    fn test_only_orbit_lines_are_batched() {
        let batched: Vec<_> = ComponentKind::ALL
            .into_iter()
            .filter(|k| k.is_batched())
            .collect();
        assert_eq!(batched, vec![ComponentKind::Orbit]);
        assert_eq!(ComponentKind::from_name("Teapot"), None);
    }

    #[test]
    fn test_link_needs_ground_and_track_needs_samples() {
        let trajectory = SampledTrajectory::default();
        let ctx = DescriptorContext {
            owner: ObjectId(1),
            name: "ISS",
            trajectory: &trajectory,
            period_minutes: Some(92.0),
            ground: None,
            label_offset_px: [15.0, 0.0],
            min_elevation_deg: 0.0,
        };
        assert!(ctx.describe(ComponentKind::GroundStationLink).is_none());
        assert!(ctx.describe(ComponentKind::GroundTrack).is_none());
        match ctx.describe(ComponentKind::Label).map(|d| d.shape) {
            Some(ShapeParams::Label { text, offset_px }) => {
                assert_eq!(text, "ISS");
                assert_eq!(offset_px, [15.0, 0.0]);
            }
            other => panic!("unexpected label shape {:?}", other),
        }
    }
}
