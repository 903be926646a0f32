// SPDX-License-Identifier: MIT

//! Reported trek positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label attached to every reported position.
pub const STREAMER: &str = "Team";

/// A single reported location.
///
/// `id` is opaque and backend-specific: the relational store uses an
/// auto-incrementing integer rendered as a string, the document store a
/// generated document key. Ids are not comparable across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub streamer: String,
    pub lat: f64,
    pub lng: f64,
    /// Civil ISO-8601 timestamp carrying the seasonal offset.
    pub created_at: String,
    /// Backend-native instant mirror of `created_at`, used only for
    /// ordering in the document backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_ts: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(id: String, lat: f64, lng: f64, created_at: String) -> Self {
        let created_at_ts = crate::time_utils::parse_instant(&created_at);
        Self {
            id,
            streamer: STREAMER.to_string(),
            lat,
            lng,
            created_at,
            created_at_ts,
        }
    }
}

/// Partial update of a position (patch semantics).
#[derive(Debug, Clone, Default)]
pub struct PositionUpdate {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub created_at: Option<String>,
}

impl PositionUpdate {
    /// Apply this update on top of an existing record, refreshing the
    /// timestamp mirror when the civil string changes.
    pub fn apply(&self, existing: &Position) -> Position {
        let created_at = self
            .created_at
            .clone()
            .unwrap_or_else(|| existing.created_at.clone());
        let created_at_ts = crate::time_utils::parse_instant(&created_at);
        Position {
            id: existing.id.clone(),
            streamer: existing.streamer.clone(),
            lat: self.lat.unwrap_or(existing.lat),
            lng: self.lng.unwrap_or(existing.lng),
            created_at,
            created_at_ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_apply_preserves_untouched_fields() {
        let p = Position::new(
            "7".to_string(),
            43.6,
            3.88,
            "2025-09-08T16:15:00+02:00".to_string(),
        );

        let patched = PositionUpdate {
            lat: Some(44.0),
            ..Default::default()
        }
        .apply(&p);

        assert_eq!(patched.lat, 44.0);
        assert_eq!(patched.lng, 3.88);
        assert_eq!(patched.created_at, p.created_at);
        assert_eq!(patched.created_at_ts, p.created_at_ts);
    }

    #[test]
    fn test_update_apply_refreshes_mirror() {
        let p = Position::new(
            "7".to_string(),
            43.6,
            3.88,
            "2025-09-08T16:15:00+02:00".to_string(),
        );

        let patched = PositionUpdate {
            created_at: Some("2025-09-09T08:00:00+02:00".to_string()),
            ..Default::default()
        }
        .apply(&p);

        assert_eq!(
            patched.created_at_ts.unwrap().to_rfc3339(),
            "2025-09-09T06:00:00+00:00"
        );
    }
}
