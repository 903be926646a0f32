// SPDX-License-Identifier: MIT

//! Idempotent cross-store migration routines.
//!
//! All routines are best-effort: per-row failures are counted and the
//! loop continues, nothing is rolled back. Re-running any routine is
//! safe; existence checks prevent duplicates.

use crate::db::{PositionBackend, PositionStore, SqliteStore};
use crate::models::Position;
use crate::time_utils;
use serde::Serialize;
use std::time::Duration;

/// Coordinate tolerance for the document-to-relational dedup key.
const COORD_TOLERANCE: f64 = 1e-6;
/// Pause after this many inserts to avoid overwhelming the remote backend.
const THROTTLE_EVERY: u64 = 50;
const THROTTLE_PAUSE: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct CopyReport {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ImportReport {
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct NormalizeReport {
    pub fixed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Copy relational rows into the document backend, preserving the
/// relational id as the document key so reruns map to the same identity.
pub async fn sqlite_to_primary(
    sqlite: &SqliteStore,
    primary: &dyn PositionBackend,
) -> CopyReport {
    let mut report = CopyReport::default();

    let rows = match sqlite.list_positions_by_id().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Migration aborted: cannot list relational rows");
            report.failed += 1;
            return report;
        }
    };

    for row in rows {
        match primary.get_position(&row.id).await {
            Ok(Some(_)) => {
                report.skipped += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(id = %row.id, error = %e, "Existence check failed");
                report.failed += 1;
                continue;
            }
        }

        // Derive the timestamp mirror from the civil string on the way in.
        let doc = Position::new(row.id.clone(), row.lat, row.lng, row.created_at.clone());
        match primary.put_position(&row.id, &doc).await {
            Ok(()) => {
                report.copied += 1;
                if report.copied % THROTTLE_EVERY == 0 {
                    tokio::time::sleep(THROTTLE_PAUSE).await;
                }
            }
            Err(e) => {
                tracing::warn!(id = %row.id, error = %e, "Copy failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        copied = report.copied,
        skipped = report.skipped,
        failed = report.failed,
        "SQLite -> primary migration finished"
    );
    report
}

/// Copy documents into the relational store. Document ids are not
/// representable as relational keys, so dedup matches on
/// `(created_at, lat, lng)` within a tight tolerance.
pub async fn primary_to_sqlite(
    primary: &dyn PositionBackend,
    sqlite: &SqliteStore,
) -> ImportReport {
    let mut report = ImportReport::default();

    let docs = match primary.list_positions().await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::error!(error = %e, "Migration aborted: cannot list documents");
            report.failed += 1;
            return report;
        }
    };

    for doc in docs {
        match sqlite
            .has_matching_position(&doc.created_at, doc.lat, doc.lng, COORD_TOLERANCE)
            .await
        {
            Ok(true) => {
                report.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "Match check failed");
                report.failed += 1;
                continue;
            }
        }

        match sqlite
            .add_position(doc.lat, doc.lng, Some(doc.created_at.clone()))
            .await
        {
            Ok(_) => report.inserted += 1,
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "Insert failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        failed = report.failed,
        "Primary -> SQLite migration finished"
    );
    report
}

/// Recompute every document's `created_at` through the civil normalizer
/// and rewrite the timestamp mirror so it is always backend-native.
/// Documents already in shape are counted as skipped.
pub async fn normalize_dates(primary: &dyn PositionBackend) -> NormalizeReport {
    let mut report = NormalizeReport::default();

    let docs = match primary.list_positions().await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::error!(error = %e, "Normalization aborted: cannot list documents");
            report.failed += 1;
            return report;
        }
    };

    for doc in docs {
        let normalized = time_utils::normalize_civil_iso(&doc.created_at)
            .unwrap_or_else(time_utils::now_civil_iso);
        let mirror = time_utils::parse_instant(&normalized);

        if normalized == doc.created_at && mirror == doc.created_at_ts {
            report.skipped += 1;
            continue;
        }

        let fixed = Position {
            created_at: normalized,
            created_at_ts: mirror,
            ..doc.clone()
        };
        match primary.put_position(&doc.id, &fixed).await {
            Ok(()) => report.fixed += 1,
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "Rewrite failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        fixed = report.fixed,
        skipped = report.skipped,
        failed = report.failed,
        "Date normalization finished"
    );
    report
}

/// Startup auto-migration: when the primary is configured and strictly
/// behind the relational count, copy rows over. Runs as a background
/// task; never blocks the listening socket and is safe to interrupt.
pub async fn auto_migrate(store: &PositionStore) {
    let Some(primary) = store.primary() else {
        return;
    };

    let sqlite_count = match store.secondary().count_positions().await {
        Ok(Some(n)) => n,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Auto-migration skipped: relational count failed");
            return;
        }
    };

    let primary_count = match primary.count_positions().await {
        Ok(Some(n)) => n,
        Ok(None) => {
            tracing::info!("Auto-migration skipped: primary count unknown (cap reached)");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Auto-migration skipped: primary unreachable");
            return;
        }
    };

    if primary_count >= sqlite_count {
        tracing::debug!(primary_count, sqlite_count, "Auto-migration not needed");
        return;
    }

    tracing::info!(
        primary_count,
        sqlite_count,
        "Primary is behind, running startup migration"
    );
    sqlite_to_primary(store.secondary(), primary.as_ref()).await;
}
