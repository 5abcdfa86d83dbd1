//! Headless tracker: ingest a TLE file, place an observer and list upcoming passes.
//!
//! Usage: `satvis <tle-file> <longitude-deg> <latitude-deg> [height-m] [hours]`

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bevy::log::LogPlugin;
use bevy::prelude::*;
use chrono::Duration;

use satvis::core::GeodeticPosition;
use satvis::orbital::SimulationTime;
use satvis::{OrbitalPlugin, SatellitePlugin, SatelliteRegistry, TrackerConfig};

const TAG: &str = "cli";

struct Args {
    tle_path: PathBuf,
    ground: GeodeticPosition,
    hours: i64,
}

impl Args {
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        if args.len() < 3 {
            bail!("usage: satvis <tle-file> <longitude-deg> <latitude-deg> [height-m] [hours]");
        }
        let number = |i: usize, what: &str| -> Result<f64> {
            args[i]
                .parse::<f64>()
                .with_context(|| format!("invalid {}: {:?}", what, args[i]))
        };
        let longitude = number(1, "longitude")?;
        let latitude = number(2, "latitude")?;
        let height = if args.len() > 3 { number(3, "height")? } else { 0.0 };
        let hours = if args.len() > 4 { number(4, "hours")? as i64 } else { 24 };
        if !(-90.0..=90.0).contains(&latitude) {
            bail!("latitude out of range: {}", latitude);
        }

        Ok(Self {
            tle_path: PathBuf::from(&args[0]),
            ground: GeodeticPosition::from_degrees(longitude, latitude, height),
            hours: hours.max(1),
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse()?;
    let config = TrackerConfig::load()?;
    let text = fs::read_to_string(&args.tle_path)
        .with_context(|| format!("reading {}", args.tle_path.display()))?;

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()))
        .insert_resource(config)
        .insert_resource(SimulationTime::default())
        .add_plugins((OrbitalPlugin, SatellitePlugin));

    {
        let mut registry = app.world_mut().resource_mut::<SatelliteRegistry>();
        let report = registry.add_from_text(&text, &[TAG]);
        if registry.is_empty() {
            bail!(
                "no usable element sets in {} ({} malformed, {} rejected)",
                args.tle_path.display(),
                report.parse_failures.len(),
                report.rejected.len()
            );
        }
        registry.set_ground_position(Some(args.ground));
        registry.enable_tag(TAG);
    }

    // First tick starts batch builds and refreshes windows
    app.update();
    app.update();

    let mut registry = app.world_mut().resource_mut::<SatelliteRegistry>();
    let start = registry.now();
    let end = start + Duration::hours(args.hours);
    for id in registry.ids() {
        let name = registry
            .get(id)
            .map(|s| s.name().to_string())
            .unwrap_or_default();
        let passes = registry.transits_in_range(id, start, end)?;
        println!("{} - {} passes in the next {} h", name, passes.len(), args.hours);
        for pass in passes {
            println!(
                "  {}  ->  {}  max {:5.1}° at az {:5.1}°{}",
                pass.start.format("%Y-%m-%d %H:%M:%S"),
                pass.end.format("%H:%M:%S"),
                pass.max_elevation_deg,
                pass.azimuth_at_max_elevation_deg,
                if pass.is_partial() { "  (partial)" } else { "" }
            );
        }
    }
    info!("tracked {} objects", registry.len());
    Ok(())
}
