// SPDX-License-Identifier: MIT

//! Live trek tracker backend: position history over a dual-backend
//! store, cached walking segments, planned-route metadata and a Twitch
//! live-status probe.

pub mod config;
pub mod db;
pub mod error;
pub mod geo_utils;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use crate::config::Config;
use crate::db::PositionStore;
use crate::services::{RoutingClient, SegmentService, TwitchService};
use std::sync::Arc;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub store: PositionStore,
    pub segments: SegmentService,
    pub routing: Arc<RoutingClient>,
    pub twitch: TwitchService,
}
