// SPDX-License-Identifier: MIT

//! Position storage: two interchangeable backends behind one trait,
//! a fallback facade, and the cross-store migration engine.

pub mod firestore;
pub mod migrate;
pub mod sqlite;
pub mod store;

pub use firestore::FirestoreStore;
pub use sqlite::SqliteStore;
pub use store::PositionStore;

use crate::error::AppError;
use crate::models::{Position, PositionUpdate, Segment};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const POSITIONS: &str = "positions";
    pub const WALKING_SEGMENTS: &str = "walking_segments";
}

/// CRUD contract both position backends implement.
///
/// Ids are opaque and backend-specific; `put_position` writes a full
/// record under a caller-chosen id and exists for the migration engine
/// and the date-normalization pass.
#[async_trait]
pub trait PositionBackend: Send + Sync {
    /// All positions in ascending chronological order (`created_at`,
    /// ties broken by id).
    async fn list_positions(&self) -> Result<Vec<Position>, AppError>;

    /// Append a position. `created_at` defaults to the current civil
    /// instant when absent.
    async fn add_position(
        &self,
        lat: f64,
        lng: f64,
        created_at: Option<String>,
    ) -> Result<Position, AppError>;

    async fn get_position(&self, id: &str) -> Result<Option<Position>, AppError>;

    /// Write a full record under the given id (create or replace).
    async fn put_position(&self, id: &str, position: &Position) -> Result<(), AppError>;

    /// Partial update; errors with NotFound for unknown ids.
    async fn update_position(
        &self,
        id: &str,
        update: &PositionUpdate,
    ) -> Result<Position, AppError>;

    /// Delete; errors with NotFound for unknown ids.
    async fn delete_position(&self, id: &str) -> Result<(), AppError>;

    /// Position count. `None` means "unknown": the backend only supports
    /// an approximate paged count and the safety cap was reached.
    async fn count_positions(&self) -> Result<Option<u64>, AppError>;
}

/// Keyed store for cached walking segments. Owned by the document
/// backend; the relational backend has no segment table.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn get_segment(&self, key: &str) -> Result<Option<Segment>, AppError>;
    async fn put_segment(&self, key: &str, segment: &Segment) -> Result<(), AppError>;
}
