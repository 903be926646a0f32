// SPDX-License-Identifier: MIT

//! Walking-segment materialization engine.
//!
//! Turns the ordered position list into cached polyline segments. A
//! segment is computed at most once per ordered pair of position ids;
//! once present it is never refreshed. When routing fails or budgets run
//! out, pairs degrade to a straight line rather than being dropped.

use crate::config::Config;
use crate::db::SegmentStore;
use crate::error::AppError;
use crate::geo_utils::haversine_km;
use crate::models::{LngLat, Position, Segment};
use crate::services::routing::{RouteProvider, SOURCE_STRAIGHT};
use futures_util::{stream, StreamExt};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A position counts as "already at the start" within this distance.
const START_MATCH_KM: f64 = 0.01;

/// Concurrency bound for cache lookups during track assembly.
const MAX_CONCURRENT_LOOKUPS: usize = 16;

/// Synthetic id for the prepended start point.
const START_ID: &str = "start";

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct RebuildReport {
    pub created: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct SegmentService {
    /// Segment persistence, owned by the document backend. None when no
    /// primary is configured; everything then degrades to straight lines.
    store: Option<Arc<dyn SegmentStore>>,
    router: Arc<dyn RouteProvider>,
    route_timeout: Duration,
    max_live_pairs: usize,
    track_budget: Duration,
}

impl SegmentService {
    pub fn new(
        store: Option<Arc<dyn SegmentStore>>,
        router: Arc<dyn RouteProvider>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            router,
            route_timeout: Duration::from_millis(config.route_timeout_ms),
            max_live_pairs: config.max_live_pairs.max(5),
            track_budget: Duration::from_millis(config.track_budget_ms),
        }
    }

    /// Get or create the walking segment between two consecutive
    /// positions. Cache hits are returned unchanged; misses are routed
    /// and persisted; total routing failure persists a straight line.
    pub async fn ensure_segment(
        &self,
        prev: &Position,
        curr: &Position,
    ) -> Result<Segment, AppError> {
        self.ensure_with_timeout(prev, curr, self.route_timeout).await
    }

    async fn ensure_with_timeout(
        &self,
        prev: &Position,
        curr: &Position,
        timeout: Duration,
    ) -> Result<Segment, AppError> {
        let key = Segment::key_for(&prev.id, &curr.id);

        if let Some(store) = &self.store {
            if let Some(existing) = store.get_segment(&key).await? {
                return Ok(existing);
            }
        }

        let segment = match self
            .router
            .walking_route((prev.lat, prev.lng), (curr.lat, curr.lng), timeout)
            .await
        {
            Ok(path) => Segment {
                from_id: prev.id.clone(),
                to_id: curr.id.clone(),
                geometry: path.geometry,
                distance_km: path.distance_km,
                duration_min: path.duration_min,
                source: path.source,
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Routing failed, storing straight line");
                straight_segment(prev, curr)
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.put_segment(&key, &segment).await {
                tracing::warn!(key = %key, error = %e, "Segment persist failed");
            }
        }

        Ok(segment)
    }

    /// Bulk materialization over the full history: one segment per
    /// consecutive pair, skipping pairs already cached.
    pub async fn rebuild(&self, positions: &[Position]) -> Result<RebuildReport, AppError> {
        let store = self.store.as_ref().ok_or_else(|| {
            AppError::BadRequest("document backend not configured, nothing to rebuild".to_string())
        })?;

        let mut report = RebuildReport::default();
        for pair in positions.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if !has_coordinates(prev) || !has_coordinates(curr) {
                report.skipped += 1;
                continue;
            }

            let key = Segment::key_for(&prev.id, &curr.id);
            match store.get_segment(&key).await {
                Ok(Some(_)) => report.skipped += 1,
                Ok(None) => match self.ensure_segment(prev, curr).await {
                    Ok(_) => report.created += 1,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Rebuild pair failed");
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Rebuild existence check failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "Segment rebuild finished"
        );
        Ok(report)
    }

    /// Assemble the walking track as a GeoJSON FeatureCollection.
    ///
    /// Full mode covers every pair but never routes live (cache or
    /// straight line). Reduced mode guarantees only the most recent
    /// `max_live_pairs` pairs, computing missing ones under the global
    /// time budget and omitting uncached older pairs.
    pub async fn assemble_track(
        &self,
        positions: &[Position],
        full: bool,
        start: Option<(f64, f64)>,
    ) -> FeatureCollection {
        let positions = with_synthetic_start(positions, start);
        let total_pairs = positions.len().saturating_sub(1);
        let mut indexed: Vec<(usize, Segment)> = Vec::with_capacity(total_pairs);

        if full {
            for i in 0..total_pairs {
                let (prev, curr) = (&positions[i], &positions[i + 1]);
                let segment = match self.cached(prev, curr).await {
                    Some(s) => s,
                    None => straight_segment(prev, curr),
                };
                indexed.push((i, segment));
            }
        } else {
            let live_from = total_pairs.saturating_sub(self.max_live_pairs);
            let deadline = tokio::time::Instant::now() + self.track_budget;

            // Older pairs: cached segments only, gaps are omitted. The
            // lookups are independent reads, so they run concurrently.
            let older: Vec<(usize, Segment)> = stream::iter(0..live_from)
                .map(|i| {
                    let (prev, curr) = (&positions[i], &positions[i + 1]);
                    async move { self.cached(prev, curr).await.map(|s| (i, s)) }
                })
                .buffer_unordered(MAX_CONCURRENT_LOOKUPS)
                .filter_map(|found| async move { found })
                .collect()
                .await;
            indexed.extend(older);

            // Recent pairs, newest first so the budget favors them.
            for i in (live_from..total_pairs).rev() {
                let (prev, curr) = (&positions[i], &positions[i + 1]);
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                let segment = if remaining.is_zero() {
                    straight_segment(prev, curr)
                } else {
                    let timeout = self.route_timeout.min(remaining);
                    match self.ensure_with_timeout(prev, curr, timeout).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "Track pair degraded to straight line");
                            straight_segment(prev, curr)
                        }
                    }
                };
                indexed.push((i, segment));
            }
        }

        // Chronological ascending, whatever order processing ran in.
        indexed.sort_by_key(|(i, _)| *i);

        FeatureCollection {
            bbox: None,
            features: indexed.into_iter().map(|(_, s)| feature_for(&s)).collect(),
            foreign_members: None,
        }
    }

    async fn cached(&self, prev: &Position, curr: &Position) -> Option<Segment> {
        let store = self.store.as_ref()?;
        let key = Segment::key_for(&prev.id, &curr.id);
        match store.get_segment(&key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Segment lookup failed");
                None
            }
        }
    }
}

fn has_coordinates(p: &Position) -> bool {
    p.lat.is_finite() && p.lng.is_finite()
}

/// Two-point fallback segment. Distance comes from haversine; duration
/// is unknown for a straight line.
fn straight_segment(prev: &Position, curr: &Position) -> Segment {
    Segment {
        from_id: prev.id.clone(),
        to_id: curr.id.clone(),
        geometry: vec![
            LngLat::new(prev.lng, prev.lat),
            LngLat::new(curr.lng, curr.lat),
        ],
        distance_km: Some(haversine_km(prev.lat, prev.lng, curr.lat, curr.lng)),
        duration_min: None,
        source: SOURCE_STRAIGHT.to_string(),
    }
}

/// Prepend the declared trek start unless the first real position is
/// already within ~10 m of it, so the rendered track always originates
/// at the starting point.
fn with_synthetic_start(positions: &[Position], start: Option<(f64, f64)>) -> Vec<Position> {
    let mut out: Vec<Position> = positions.to_vec();
    if let (Some((lat, lng)), Some(first)) = (start, positions.first()) {
        if haversine_km(lat, lng, first.lat, first.lng) > START_MATCH_KM {
            out.insert(
                0,
                Position {
                    id: START_ID.to_string(),
                    streamer: first.streamer.clone(),
                    lat,
                    lng,
                    created_at: String::new(),
                    created_at_ts: None,
                },
            );
        }
    }
    out
}

fn feature_for(segment: &Segment) -> Feature {
    let coords: Vec<Vec<f64>> = segment
        .geometry
        .iter()
        .map(|p| vec![p.lng, p.lat])
        .collect();

    let mut properties = geojson::JsonObject::new();
    properties.insert("from".to_string(), segment.from_id.clone().into());
    properties.insert("to".to_string(), segment.to_id.clone().into());
    properties.insert("source".to_string(), segment.source.clone().into());
    properties.insert(
        "distance_km".to_string(),
        serde_json::to_value(segment.distance_km).unwrap_or(serde_json::Value::Null),
    );
    properties.insert(
        "duration_min".to_string(),
        serde_json::to_value(segment.duration_min).unwrap_or(serde_json::Value::Null),
    );

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coords))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}
