// SPDX-License-Identifier: MIT

//! Dual-backend position store with automatic fallback.
//!
//! When a primary (document) backend is configured, every operation
//! attempts it first. Failures that look credential-related fall back
//! silently to the always-available SQLite secondary; anything else
//! propagates. The policy lives in one helper shared by all operations.

use crate::db::{PositionBackend, SqliteStore};
use crate::error::AppError;
use crate::models::{Position, PositionUpdate};
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct PositionStore {
    primary: Option<Arc<dyn PositionBackend>>,
    secondary: Arc<SqliteStore>,
}

impl PositionStore {
    pub fn new(primary: Option<Arc<dyn PositionBackend>>, secondary: Arc<SqliteStore>) -> Self {
        Self { primary, secondary }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary(&self) -> Option<&Arc<dyn PositionBackend>> {
        self.primary.as_ref()
    }

    /// The relational secondary, which also owns meta and route tables.
    pub fn secondary(&self) -> &Arc<SqliteStore> {
        &self.secondary
    }

    /// Shared fallback policy: run the primary future when present; on a
    /// credential-shaped failure, log and run the secondary instead.
    async fn with_fallback<T, P, S, SFut>(
        &self,
        op: &'static str,
        primary: Option<P>,
        secondary: S,
    ) -> Result<T, AppError>
    where
        P: Future<Output = Result<T, AppError>>,
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<T, AppError>>,
    {
        if let Some(fut) = primary {
            match fut.await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_credential_error() => {
                    tracing::warn!(op, error = %e, "Primary backend unavailable, falling back to SQLite");
                }
                Err(e) => return Err(e),
            }
        }
        secondary().await
    }

    /// Ordered position list. `force_secondary` is the operator escape
    /// hatch that reads from SQLite regardless of primary availability.
    pub async fn list_positions(&self, force_secondary: bool) -> Result<Vec<Position>, AppError> {
        let primary = if force_secondary {
            None
        } else {
            self.primary.as_ref().map(|p| p.list_positions())
        };
        self.with_fallback("list_positions", primary, || {
            self.secondary.list_positions()
        })
        .await
    }

    pub async fn add_position(
        &self,
        lat: f64,
        lng: f64,
        created_at: Option<String>,
    ) -> Result<Position, AppError> {
        let primary = self
            .primary
            .as_ref()
            .map(|p| p.add_position(lat, lng, created_at.clone()));
        self.with_fallback("add_position", primary, || {
            self.secondary.add_position(lat, lng, created_at.clone())
        })
        .await
    }

    pub async fn get_position(&self, id: &str) -> Result<Option<Position>, AppError> {
        let primary = self.primary.as_ref().map(|p| p.get_position(id));
        self.with_fallback("get_position", primary, || self.secondary.get_position(id))
            .await
    }

    pub async fn update_position(
        &self,
        id: &str,
        update: &PositionUpdate,
    ) -> Result<Position, AppError> {
        let primary = self.primary.as_ref().map(|p| p.update_position(id, update));
        self.with_fallback("update_position", primary, || {
            self.secondary.update_position(id, update)
        })
        .await
    }

    pub async fn delete_position(&self, id: &str) -> Result<(), AppError> {
        let primary = self.primary.as_ref().map(|p| p.delete_position(id));
        self.with_fallback("delete_position", primary, || {
            self.secondary.delete_position(id)
        })
        .await
    }

    pub async fn count_positions(&self) -> Result<Option<u64>, AppError> {
        let primary = self.primary.as_ref().map(|p| p.count_positions());
        self.with_fallback("count_positions", primary, || {
            self.secondary.count_positions()
        })
        .await
    }
}
