use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AtlasLinkError, Result};

/// Geographic bounding box a client asks the server to notify it about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    /// Northern latitude edge (degrees, -90..=90)
    pub north: f64,
    /// Southern latitude edge (degrees, -90..=90)
    pub south: f64,
    /// Eastern longitude edge (degrees, -180..=180)
    pub east: f64,
    /// Western longitude edge (degrees, -180..=180)
    pub west: f64,
}

/// Exact-coordinate identity of a [`RegionBounds`], usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundsKey([u64; 4]);

impl RegionBounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Reject boxes the server could never honour.
    ///
    /// A box whose `west` is greater than `east` is accepted: it crosses the
    /// antimeridian.
    pub fn validate(&self) -> Result<()> {
        let edges = [
            ("north", self.north),
            ("south", self.south),
            ("east", self.east),
            ("west", self.west),
        ];
        for (name, value) in edges {
            if !value.is_finite() {
                return Err(AtlasLinkError::ConfigurationError(format!(
                    "Region {} edge must be finite, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [("north", self.north), ("south", self.south)] {
            if !(-90.0..=90.0).contains(&value) {
                return Err(AtlasLinkError::ConfigurationError(format!(
                    "Region {} latitude {} is outside -90..=90",
                    name, value
                )));
            }
        }
        for (name, value) in [("east", self.east), ("west", self.west)] {
            if !(-180.0..=180.0).contains(&value) {
                return Err(AtlasLinkError::ConfigurationError(format!(
                    "Region {} longitude {} is outside -180..=180",
                    name, value
                )));
            }
        }
        if self.north < self.south {
            return Err(AtlasLinkError::ConfigurationError(format!(
                "Region north edge {} lies south of south edge {}",
                self.north, self.south
            )));
        }
        Ok(())
    }

    /// Registry key. `-0.0` and `0.0` map to the same key.
    pub fn key(&self) -> BoundsKey {
        fn bits(v: f64) -> u64 {
            if v == 0.0 {
                0.0f64.to_bits()
            } else {
                v.to_bits()
            }
        }
        BoundsKey([
            bits(self.north),
            bits(self.south),
            bits(self.east),
            bits(self.west),
        ])
    }
}

impl fmt::Display for RegionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[N {} S {} E {} W {}]",
            self.north, self.south, self.east, self.west
        )
    }
}
