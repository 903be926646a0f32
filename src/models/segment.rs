// SPDX-License-Identifier: MIT

//! Cached walking-path segments between consecutive positions.

use serde::{Deserialize, Serialize};

/// One point of a segment geometry, longitude first (GeoJSON order).
///
/// Stored as a map rather than a `[lng, lat]` pair because Firestore does
/// not allow arrays nested inside arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// A cached directional walking path between two positions.
///
/// Keyed by the ordered pair of position ids; direction matters. Once
/// written, a segment is never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from_id: String,
    pub to_id: String,
    pub geometry: Vec<LngLat>,
    pub distance_km: Option<f64>,
    /// None for straight-line fallbacks, where no pace is known.
    pub duration_min: Option<f64>,
    /// Routing tier that produced this segment: "ors", "osrm" or "straight".
    pub source: String,
}

impl Segment {
    /// Cache key for the ordered pair of position ids.
    pub fn key_for(from_id: &str, to_id: &str) -> String {
        format!("{from_id}__{to_id}")
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.from_id, &self.to_id)
    }
}
