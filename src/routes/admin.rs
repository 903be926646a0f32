// SPDX-License-Identifier: MIT

//! Maintenance routes: cross-store migration, date normalization and
//! bulk segment rebuild. All of these sit behind the admin-code guard.

use crate::db::migrate;
use crate::error::{AppError, Result};
use crate::services::segments::RebuildReport;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/migrate/sqlite-to-firestore", post(migrate_to_primary))
        .route("/api/migrate/firestore-to-sqlite", post(migrate_to_secondary))
        .route(
            "/api/admin/normalize-firestore-dates",
            post(normalize_dates),
        )
        .route("/api/walking-segments/rebuild", post(rebuild_segments))
}

fn primary_required(state: &AppState) -> Result<&Arc<dyn crate::db::PositionBackend>> {
    state
        .store
        .primary()
        .ok_or_else(|| AppError::BadRequest("document backend not configured".to_string()))
}

/// Copy every relational position into the document backend, preserving
/// ids. Safe to run repeatedly.
async fn migrate_to_primary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<migrate::CopyReport>> {
    let primary = primary_required(&state)?;
    let report = migrate::sqlite_to_primary(state.store.secondary(), primary.as_ref()).await;
    Ok(Json(report))
}

/// Import document positions missing from the relational store.
async fn migrate_to_secondary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<migrate::ImportReport>> {
    let primary = primary_required(&state)?;
    let report = migrate::primary_to_sqlite(primary.as_ref(), state.store.secondary()).await;
    Ok(Json(report))
}

/// Rewrite malformed created_at strings in the document backend into
/// offset-carrying ISO form.
async fn normalize_dates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<migrate::NormalizeReport>> {
    let primary = primary_required(&state)?;
    let report = migrate::normalize_dates(primary.as_ref()).await;
    Ok(Json(report))
}

/// Materialize walking segments for every consecutive pair in history.
async fn rebuild_segments(State(state): State<Arc<AppState>>) -> Result<Json<RebuildReport>> {
    let positions = state.store.list_positions(false).await?;
    let report = state.segments.rebuild(&positions).await?;
    Ok(Json(report))
}
