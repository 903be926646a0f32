// SPDX-License-Identifier: MIT

//! Walking-directions client with two provider tiers.
//!
//! Tier 1 (OpenRouteService) is used only when an API key is configured
//! and never raises to the caller: any failure falls through to tier 2.
//! Tier 2 (public OSRM) needs no key; a failure there surfaces as a
//! routing error. Straight-line degradation is the caller's job.

use crate::error::AppError;
use crate::models::LngLat;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SOURCE_ORS: &str = "ors";
pub const SOURCE_OSRM: &str = "osrm";
pub const SOURCE_STRAIGHT: &str = "straight";

/// A routed walking path in canonical shape: geometry is always ordered
/// `(lng, lat)` pairs regardless of which tier answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedPath {
    pub geometry: Vec<LngLat>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    pub source: String,
}

/// Seam for the segment cache; lets tests count and stub routing calls.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Walking route from `(lat, lng)` to `(lat, lng)`.
    async fn walking_route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        timeout: Duration,
    ) -> Result<RoutedPath, AppError>;
}

pub struct RoutingClient {
    http: reqwest::Client,
    ors_api_key: Option<String>,
    ors_base_url: String,
    osrm_base_url: String,
}

impl RoutingClient {
    pub fn new(ors_api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            ors_api_key,
            ors_base_url: "https://api.openrouteservice.org".to_string(),
            osrm_base_url: "https://router.project-osrm.org".to_string(),
        }
    }

    /// Tier 1: OpenRouteService pedestrian profile, shortest preference,
    /// avoiding road classes unsuitable for a walking stream. Returns
    /// None on any failure so the caller falls through to tier 2.
    async fn try_ors(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        timeout: Duration,
    ) -> Option<RoutedPath> {
        let key = self.ors_api_key.as_deref()?;

        let url = format!(
            "{}/v2/directions/foot-walking/geojson",
            self.ors_base_url
        );
        let body = serde_json::json!({
            "coordinates": [[from.1, from.0], [to.1, to.0]],
            "preference": "shortest",
            "options": {
                "avoid_features": ["highways", "fords", "steps", "tracks", "unpaved"]
            }
        });

        let response = self
            .http
            .post(&url)
            .header("Authorization", key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "ORS returned non-success, trying OSRM");
            return None;
        }

        let parsed: OrsResponse = response.json().await.ok()?;
        let feature = parsed.features.into_iter().next()?;
        if feature.geometry.coordinates.len() < 2 {
            return None;
        }

        Some(RoutedPath {
            geometry: feature
                .geometry
                .coordinates
                .into_iter()
                .map(|c| LngLat::new(c[0], c[1]))
                .collect(),
            distance_km: feature.properties.summary.as_ref().map(|s| s.distance / 1000.0),
            duration_min: feature.properties.summary.as_ref().map(|s| s.duration / 60.0),
            source: SOURCE_ORS.to_string(),
        })
    }

    /// Tier 2: public OSRM, no key required. Failures raise.
    async fn osrm(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        timeout: Duration,
    ) -> Result<RoutedPath, AppError> {
        let url = format!(
            "{}/route/v1/foot/{},{};{},{}?overview=full&geometries=geojson",
            self.osrm_base_url, from.1, from.0, to.1, to.0
        );

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AppError::Routing(format!("OSRM request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Routing(format!(
                "OSRM returned HTTP {}",
                response.status()
            )));
        }

        let parsed: OsrmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Routing(format!("OSRM response parse error: {e}")))?;

        if parsed.code != "Ok" {
            return Err(AppError::Routing(format!("OSRM code {}", parsed.code)));
        }
        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Routing("OSRM returned no routes".to_string()))?;

        Ok(RoutedPath {
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(|c| LngLat::new(c[0], c[1]))
                .collect(),
            distance_km: Some(route.distance / 1000.0),
            duration_min: Some(route.duration / 60.0),
            source: SOURCE_OSRM.to_string(),
        })
    }
}

#[async_trait]
impl RouteProvider for RoutingClient {
    async fn walking_route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        timeout: Duration,
    ) -> Result<RoutedPath, AppError> {
        if let Some(path) = self.try_ors(from, to, timeout).await {
            return Ok(path);
        }
        self.osrm(from, to, timeout).await
    }
}

// ─── Provider Response Shapes ────────────────────────────────────

#[derive(Deserialize)]
struct OrsResponse {
    features: Vec<OrsFeature>,
}

#[derive(Deserialize)]
struct OrsFeature {
    geometry: GeoJsonLineString,
    properties: OrsProperties,
}

#[derive(Deserialize)]
struct OrsProperties {
    summary: Option<OrsSummary>,
}

#[derive(Deserialize)]
struct OrsSummary {
    distance: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct GeoJsonLineString {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: GeoJsonLineString,
    distance: f64,
    duration: f64,
}
