// SPDX-License-Identifier: MIT

//! Planned route waypoints.

use serde::{Deserialize, Serialize};

/// A planned waypoint along the trek. Read-mostly; `arrival_time` is the
/// only field mutated after seeding.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RouteStop {
    pub id: i64,
    pub seq: i64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub arrival_time: Option<String>,
}
