//! TLE (Two-Line Element) data module
//!
//! Element set types and the ingestion parser that turns raw text blocks
//! (name line + two element lines per object) into element sets.

pub mod parser;
pub mod types;

#[cfg(test)]
pub mod mock_data;

pub use parser::{parse_element_sets, parse_tle_epoch_to_utc};
pub use types::{OrbitalElementSet, ParseFailure, SatelliteKey};
