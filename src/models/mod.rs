// SPDX-License-Identifier: MIT

//! Data models shared between the stores and the API.

pub mod position;
pub mod route;
pub mod segment;

pub use position::{Position, PositionUpdate};
pub use route::RouteStop;
pub use segment::{LngLat, Segment};
