// SPDX-License-Identifier: MIT

//! Business logic services.

pub mod routing;
pub mod segments;
pub mod twitch;

pub use routing::{RouteProvider, RoutedPath, RoutingClient};
pub use segments::SegmentService;
pub use twitch::TwitchService;
