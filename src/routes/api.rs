// SPDX-License-Identifier: MIT

//! Public and admin API routes for positions, the planned route and the
//! walking track.

use crate::error::{AppError, Result};
use crate::models::{Position, PositionUpdate, RouteStop};
use crate::services::routing::RouteProvider;
use crate::time_utils;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Routes that need no admin code.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/start", get(get_start))
        .route("/api/admin/verify", post(verify_admin))
        .route("/api/positions", get(list_positions))
        .route("/api/route", get(get_route))
        .route("/api/walking-track", get(get_walking_track))
        .route("/api/walking-route", get(get_walking_route))
        .route("/api/twitch-status", get(get_twitch_status))
}

/// Routes guarded by the admin-code middleware (applied in routes/mod.rs).
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/positions", post(create_position))
        .route("/api/positions/quick", get(create_position_quick))
        .route("/api/positions/{id}", patch(update_position))
        .route("/api/positions/{id}", delete(delete_position))
        .route("/api/positions/by-place", post(create_position_by_place))
        .route("/api/route/arrival", post(set_arrival))
}

// ─── Start Meta ──────────────────────────────────────────────

/// Start time/place/coordinates from the meta table.
async fn get_start(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let rows = state.store.secondary().start_meta().await?;
    let map: serde_json::Map<String, serde_json::Value> = rows
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    Ok(Json(serde_json::Value::Object(map)))
}

// ─── Admin Verification ──────────────────────────────────────

#[derive(Deserialize)]
struct VerifyBody {
    code: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponse {
    ok: bool,
}

/// Check a candidate admin code without side effects.
async fn verify_admin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<VerifyResponse>> {
    let Some(code) = body.code else {
        return Ok(Json(VerifyResponse { ok: false }));
    };
    let secret = state.store.secondary().get_meta("admin_code").await?;
    Ok(Json(VerifyResponse {
        ok: secret.as_deref() == Some(code.as_str()),
    }))
}

// ─── Positions ───────────────────────────────────────────────

#[derive(Deserialize)]
struct SourceQuery {
    source: Option<String>,
}

fn force_secondary(source: Option<&str>) -> bool {
    source == Some("sqlite")
}

/// Ordered position list; `?source=sqlite` forces the relational store.
async fn list_positions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SourceQuery>,
) -> Result<Json<Vec<Position>>> {
    let positions = state
        .store
        .list_positions(force_secondary(params.source.as_deref()))
        .await?;
    Ok(Json(positions))
}

#[derive(Deserialize)]
struct NewPositionBody {
    lat: Option<f64>,
    lng: Option<f64>,
    date: Option<String>,
    time: Option<String>,
}

#[derive(Serialize)]
struct CreatedResponse {
    ok: bool,
    position: Position,
}

/// Turn optional date/time inputs into a civil timestamp. Accepts a bare
/// `HH:MM` (combined with the date or today), a bare date (midnight of
/// current time-of-day handled by the builder), or a full ISO string
/// passed through. None means "let the store default to now".
fn resolve_created_at(date: Option<&str>, time: Option<&str>) -> Option<String> {
    match (date, time) {
        (_, Some(t)) if time_utils::is_hhmm(t) => Some(time_utils::build_civil_iso(date, Some(t))),
        (Some(d), None) => Some(time_utils::build_civil_iso(Some(d), None)),
        (_, Some(t)) if t.contains('T') => Some(t.to_string()),
        _ => None,
    }
}

/// Materialize the walking segment from the new position's immediate
/// predecessor. Failures are logged, never surfaced to the reporter.
async fn link_to_predecessor(state: &AppState, position: &Position) {
    let positions = match state.store.list_positions(false).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot list positions for segment linking");
            return;
        }
    };
    let Some(index) = positions.iter().position(|p| p.id == position.id) else {
        return;
    };
    if index == 0 {
        return;
    }
    if let Err(e) = state
        .segments
        .ensure_segment(&positions[index - 1], position)
        .await
    {
        tracing::warn!(id = %position.id, error = %e, "Segment materialization failed");
    }
}

async fn create_position(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewPositionBody>,
) -> Result<Json<CreatedResponse>> {
    let (Some(lat), Some(lng)) = (body.lat, body.lng) else {
        return Err(AppError::BadRequest("Missing lat/lng".to_string()));
    };
    let created_at = resolve_created_at(body.date.as_deref(), body.time.as_deref());
    let position = state.store.add_position(lat, lng, created_at).await?;
    link_to_predecessor(&state, &position).await;
    Ok(Json(CreatedResponse { ok: true, position }))
}

#[derive(Deserialize)]
struct QuickQuery {
    lat: Option<f64>,
    lng: Option<f64>,
    date: Option<String>,
    time: Option<String>,
}

/// Query-string variant of position creation, for link-based quick entry.
async fn create_position_quick(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuickQuery>,
) -> Result<Json<CreatedResponse>> {
    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return Err(AppError::BadRequest("lat & lng required".to_string()));
    };
    let created_at = resolve_created_at(params.date.as_deref(), params.time.as_deref());
    let position = state.store.add_position(lat, lng, created_at).await?;
    link_to_predecessor(&state, &position).await;
    Ok(Json(CreatedResponse { ok: true, position }))
}

#[derive(Deserialize)]
struct PatchPositionBody {
    lat: Option<f64>,
    lng: Option<f64>,
    date: Option<String>,
    time: Option<String>,
}

async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchPositionBody>,
) -> Result<Json<Position>> {
    let existing = state
        .store
        .get_position(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("position {id}")))?;

    let created_at = if body.date.is_some() || body.time.is_some() {
        let existing_date = existing.created_at.get(0..10);
        let existing_time = existing.created_at.get(11..16);
        match (body.date.as_deref(), body.time.as_deref()) {
            (d, Some(t)) if time_utils::is_hhmm(t) => {
                Some(time_utils::build_civil_iso(d.or(existing_date), Some(t)))
            }
            (Some(d), None) => Some(time_utils::build_civil_iso(Some(d), existing_time)),
            (_, Some(t)) if t.contains('T') => Some(t.to_string()),
            _ => None,
        }
    } else {
        None
    };

    let update = PositionUpdate {
        lat: body.lat,
        lng: body.lng,
        created_at,
    };
    let updated = state.store.update_position(&id, &update).await?;
    Ok(Json(updated))
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn delete_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>> {
    state.store.delete_position(&id).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
struct ByPlaceBody {
    name: Option<String>,
}

/// Record a position at a planned stop's coordinates, looked up by
/// case-insensitive name.
async fn create_position_by_place(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ByPlaceBody>,
) -> Result<Json<CreatedResponse>> {
    let Some(name) = body.name else {
        return Err(AppError::BadRequest("Missing name".to_string()));
    };
    let stop = state
        .store
        .secondary()
        .find_stop(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("place {name} not in planned route")))?;

    let position = state.store.add_position(stop.lat, stop.lng, None).await?;
    link_to_predecessor(&state, &position).await;
    Ok(Json(CreatedResponse { ok: true, position }))
}

// ─── Planned Route ───────────────────────────────────────────

async fn get_route(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RouteStop>>> {
    Ok(Json(state.store.secondary().list_route().await?))
}

#[derive(Deserialize)]
struct ArrivalBody {
    name: Option<String>,
    time: Option<String>,
}

#[derive(Serialize)]
struct ArrivalResponse {
    ok: bool,
    arrival_time: String,
}

async fn set_arrival(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ArrivalBody>,
) -> Result<Json<ArrivalResponse>> {
    let (Some(name), Some(time)) = (body.name, body.time) else {
        return Err(AppError::BadRequest("name & time required".to_string()));
    };
    let stop = state
        .store
        .secondary()
        .find_stop(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("place {name}")))?;

    let iso = if time_utils::is_hhmm(&time) {
        time_utils::build_civil_iso(None, Some(&time))
    } else {
        time
    };
    state.store.secondary().set_arrival_time(stop.id, &iso).await?;
    Ok(Json(ArrivalResponse {
        ok: true,
        arrival_time: iso,
    }))
}

// ─── Walking Track ───────────────────────────────────────────

#[derive(Deserialize)]
struct TrackQuery {
    full: Option<String>,
    source: Option<String>,
}

/// GeoJSON FeatureCollection of the walking track. `?full=true` covers
/// the whole history without live routing calls.
async fn get_walking_track(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrackQuery>,
) -> Result<Json<geojson::FeatureCollection>> {
    let full = matches!(params.full.as_deref(), Some("true") | Some("1"));
    let positions = state
        .store
        .list_positions(force_secondary(params.source.as_deref()))
        .await?;

    let start = start_coordinates(&state).await;
    let track = state.segments.assemble_track(&positions, full, start).await;
    Ok(Json(track))
}

async fn start_coordinates(state: &AppState) -> Option<(f64, f64)> {
    let sqlite = state.store.secondary();
    let lat = sqlite.get_meta("start_lat").await.ok()??.parse().ok()?;
    let lng = sqlite.get_meta("start_lng").await.ok()??.parse().ok()?;
    Some((lat, lng))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalkingRouteQuery {
    from_lat: f64,
    from_lng: f64,
    to_lat: f64,
    to_lng: f64,
}

/// Single on-demand routed path between two arbitrary points.
async fn get_walking_route(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WalkingRouteQuery>,
) -> Result<Json<crate::services::RoutedPath>> {
    let timeout = Duration::from_millis(state.config.route_timeout_ms);
    let path = state
        .routing
        .walking_route(
            (params.from_lat, params.from_lng),
            (params.to_lat, params.to_lng),
            timeout,
        )
        .await?;
    Ok(Json(path))
}

// ─── Twitch Status ───────────────────────────────────────────

async fn get_twitch_status(
    State(state): State<Arc<AppState>>,
) -> Json<crate::services::twitch::TwitchStatus> {
    Json(state.twitch.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_created_at_rules() {
        // Bare HH:MM with explicit date.
        assert_eq!(
            resolve_created_at(Some("2025-09-08"), Some("16:15")).as_deref(),
            Some("2025-09-08T16:15:00+02:00")
        );
        // Bare date only.
        assert!(resolve_created_at(Some("2025-09-08"), None)
            .unwrap()
            .starts_with("2025-09-08T"));
        // Full ISO passthrough in the time field.
        assert_eq!(
            resolve_created_at(None, Some("2025-09-08T16:15:00+02:00")).as_deref(),
            Some("2025-09-08T16:15:00+02:00")
        );
        // Nothing supplied: store defaults to now.
        assert_eq!(resolve_created_at(None, None), None);
    }

    #[test]
    fn test_force_secondary_flag() {
        assert!(force_secondary(Some("sqlite")));
        assert!(!force_secondary(Some("firestore")));
        assert!(!force_secondary(None));
    }
}
