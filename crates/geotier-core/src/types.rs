//! Shared types used across geotier crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of a backing storage pool.
pub type PoolName = String;

/// Name of a placement (CRUSH) rule.
pub type RuleName = String;

/// A point on the Earth's surface in decimal degrees (WGS-84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PointError {
    #[error("expected \"lat,lon\", got {0:?}")]
    Malformed(String),
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, PointError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(PointError::Latitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(PointError::Longitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Parse a `"lat,lon"` pair. Whitespace around either number is ignored.
    pub fn parse(s: &str) -> Result<Self, PointError> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| PointError::Malformed(s.to_string()))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| PointError::Malformed(s.to_string()))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| PointError::Malformed(s.to_string()))?;
        Self::new(lat, lon)
    }

    /// True when both coordinates are finite and in range.
    pub fn is_valid(&self) -> bool {
        Self::new(self.lat, self.lon).is_ok()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}
