//! Orbital element set types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tle::parser::{parse_catalog_number, parse_mean_motion, parse_tle_epoch_to_utc};

/// Immutable two-line element set plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitalElementSet {
    name: String,
    line1: String,
    line2: String,
}

impl OrbitalElementSet {
    pub fn new(name: impl Into<String>, line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            line1: line1.into().trim_end().to_string(),
            line2: line2.into().trim_end().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line1(&self) -> &str {
        &self.line1
    }

    pub fn line2(&self) -> &str {
        &self.line2
    }

    /// NORAD catalog number from line 1
    pub fn catalog_number(&self) -> Option<u32> {
        parse_catalog_number(&self.line1)
    }

    pub fn epoch(&self) -> Option<DateTime<Utc>> {
        parse_tle_epoch_to_utc(&self.line1)
    }

    /// Mean motion in revolutions per day
    pub fn mean_motion(&self) -> Option<f64> {
        parse_mean_motion(&self.line2)
    }

    /// Orbital period in minutes
    pub fn period_minutes(&self) -> Option<f64> {
        self.mean_motion()
            .filter(|n| *n > 0.0)
            .map(|n| 1440.0 / n)
    }

    /// Identity used to de-duplicate ingested objects
    pub fn key(&self) -> Option<SatelliteKey> {
        Some(SatelliteKey {
            catalog: self.catalog_number()?,
            name: self.name.clone(),
        })
    }
}

/// Identity of a tracked object: (catalog number, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SatelliteKey {
    pub catalog: u32,
    pub name: String,
}

/// A record the ingestion boundary could not turn into an element set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// 1-based line number where the record starts
    pub line: usize,
    pub reason: String,
}
