// SPDX-License-Identifier: MIT

//! SQLite backend: the always-available relational position store.
//!
//! Also owns the meta key/value table (admin code, start info) and the
//! planned-route table, including first-boot seeding.

use crate::db::PositionBackend;
use crate::error::AppError;
use crate::models::{position::STREAMER, Position, PositionUpdate, RouteStop};
use crate::time_utils;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

/// Planned route, Montpellier to Paris.
const PLANNED_ROUTE: &[(&str, f64, f64)] = &[
    ("Montpellier (Radisson Blu)", 43.6129535885483, 3.8839984003394976),
    ("Lunel", 43.6776, 4.1351),
    ("Nîmes", 43.8367, 4.3601),
    ("Remoulins", 43.9406, 4.5606),
    ("Avignon", 43.9493, 4.8055),
    ("Orange", 44.1381, 4.8079),
    ("Montélimar", 44.5558, 4.75),
    ("Valence", 44.9334, 4.8924),
    ("Vienne", 45.5245, 4.873),
    ("Lyon", 45.764, 4.8357),
    ("Villefranche-sur-Saône", 45.9894, 4.7186),
    ("Mâcon", 46.3069, 4.828),
    ("Tournus", 46.5679, 4.9073),
    ("Chalon-sur-Saône", 46.78, 4.8527),
    ("Beaune", 47.026, 4.84),
    ("Nuits-Saint-Georges", 47.1376, 4.9506),
    ("Dijon", 47.322, 5.0415),
    ("Montbard", 47.6231, 4.3382),
    ("Tonnerre", 47.8554, 3.9732),
    ("Chablis", 47.8131, 3.7984),
    ("Joigny", 47.9814, 3.3987),
    ("Sens", 48.1975, 3.283),
    ("Montereau-Fault-Yonne", 48.3835, 2.9577),
    ("Fontainebleau", 48.4047, 2.7016),
    ("Melun", 48.5393, 2.6596),
    ("Brunoy", 48.699, 2.4924),
    ("Paris (Arrivée)", 48.8566, 2.3522),
];

const START_TIME: &str = "2025-09-08T16:15:00+02:00";
const START_PLACE: &str = "Radisson Blu, Montpellier";
const START_LAT: f64 = 43.6129535885483;
const START_LNG: f64 = 3.8839984003394976;
const DEFAULT_ADMIN_CODE: &str = "secure123";

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: i64,
    streamer: String,
    lat: f64,
    lng: f64,
    created_at: String,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            id: row.id.to_string(),
            streamer: row.streamer,
            lat: row.lat,
            lng: row.lng,
            created_at: row.created_at,
            // The relational backend orders by the string column; the
            // mirror field only exists in the document backend.
            created_at_ts: None,
        }
    }
}

/// SQLite position store (secondary backend).
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and initialize
    /// the schema and seed data. `:memory:` opens an in-memory database.
    pub async fn connect(path: &str) -> Result<Self, AppError> {
        let in_memory = path == ":memory:";
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // An in-memory database exists per connection, so the pool must
        // hold exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open SQLite at {path}: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        store.seed().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                streamer TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            "CREATE TABLE IF NOT EXISTS route (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seq INTEGER,
                name TEXT,
                lat REAL,
                lng REAL
            )",
            "CREATE INDEX IF NOT EXISTS idx_route_seq ON route(seq)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_route_name ON route(name)",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        // arrival_time was added after the first deployments; older
        // database files may not have the column yet.
        let has_arrival: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('route') WHERE name = 'arrival_time'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if has_arrival == 0 {
            sqlx::query("ALTER TABLE route ADD COLUMN arrival_time TEXT")
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(())
    }

    /// Seed start meta, the planned route, the default admin code and an
    /// initial position when the table is empty. Idempotent.
    async fn seed(&self) -> Result<(), AppError> {
        for (key, value) in [("start_time", START_TIME), ("start_place", START_PLACE)] {
            sqlx::query("INSERT OR IGNORE INTO meta(key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        self.set_meta("start_lat", &START_LAT.to_string()).await?;
        self.set_meta("start_lng", &START_LNG.to_string()).await?;

        for (seq, (name, lat, lng)) in PLANNED_ROUTE.iter().enumerate() {
            sqlx::query("INSERT OR IGNORE INTO route(seq, name, lat, lng) VALUES (?, ?, ?, ?)")
                .bind(seq as i64)
                .bind(name)
                .bind(lat)
                .bind(lng)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if count == 0 {
            sqlx::query(
                "INSERT INTO positions(streamer, lat, lng, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(STREAMER)
            .bind(START_LAT)
            .bind(START_LNG)
            .bind(START_TIME)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        sqlx::query("INSERT OR IGNORE INTO meta(key, value) VALUES ('admin_code', ?)")
            .bind(DEFAULT_ADMIN_CODE)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    // ─── Meta Operations ─────────────────────────────────────────

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO meta(key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// The start-info subset of meta (time, place, lat, lng).
    pub async fn start_meta(&self) -> Result<Vec<(String, String)>, AppError> {
        sqlx::query_as(
            "SELECT key, value FROM meta
             WHERE key IN ('start_time', 'start_place', 'start_lat', 'start_lng')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Route Operations ────────────────────────────────────────

    pub async fn list_route(&self) -> Result<Vec<RouteStop>, AppError> {
        sqlx::query_as("SELECT * FROM route ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Case-insensitive route-stop lookup by name.
    pub async fn find_stop(&self, name: &str) -> Result<Option<RouteStop>, AppError> {
        sqlx::query_as("SELECT * FROM route WHERE LOWER(name) = LOWER(?)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn set_arrival_time(&self, stop_id: i64, iso: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE route SET arrival_time = ? WHERE id = ?")
            .bind(iso)
            .bind(stop_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Migration Helpers ───────────────────────────────────────

    /// Positions in ascending id order (migration iterates insertion
    /// order, not chronological order).
    pub async fn list_positions_by_id(&self) -> Result<Vec<Position>, AppError> {
        let rows: Vec<PositionRow> = sqlx::query_as("SELECT * FROM positions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Position::from).collect())
    }

    /// Whether a row already matches `(created_at, lat, lng)` within the
    /// given coordinate tolerance. Dedup key for document-to-relational
    /// migration, where ids are not comparable across backends.
    pub async fn has_matching_position(
        &self,
        created_at: &str,
        lat: f64,
        lng: f64,
        tolerance: f64,
    ) -> Result<bool, AppError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM positions
             WHERE created_at = ? AND ABS(lat - ?) < ? AND ABS(lng - ?) < ?
             LIMIT 1",
        )
        .bind(created_at)
        .bind(lat)
        .bind(tolerance)
        .bind(lng)
        .bind(tolerance)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl PositionBackend for SqliteStore {
    async fn list_positions(&self) -> Result<Vec<Position>, AppError> {
        let rows: Vec<PositionRow> =
            sqlx::query_as("SELECT * FROM positions ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Position::from).collect())
    }

    async fn add_position(
        &self,
        lat: f64,
        lng: f64,
        created_at: Option<String>,
    ) -> Result<Position, AppError> {
        let created_at = created_at.unwrap_or_else(time_utils::now_civil_iso);
        let result = sqlx::query(
            "INSERT INTO positions(streamer, lat, lng, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(STREAMER)
        .bind(lat)
        .bind(lng)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Position {
            id: result.last_insert_rowid().to_string(),
            streamer: STREAMER.to_string(),
            lat,
            lng,
            created_at,
            created_at_ts: None,
        })
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, AppError> {
        let Ok(row_id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let row: Option<PositionRow> = sqlx::query_as("SELECT * FROM positions WHERE id = ?")
            .bind(row_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.map(Position::from))
    }

    async fn put_position(&self, id: &str, position: &Position) -> Result<(), AppError> {
        let row_id: i64 = id
            .parse()
            .map_err(|_| AppError::Database(format!("non-numeric relational id: {id}")))?;
        sqlx::query(
            "INSERT INTO positions(id, streamer, lat, lng, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                streamer = excluded.streamer,
                lat = excluded.lat,
                lng = excluded.lng,
                created_at = excluded.created_at",
        )
        .bind(row_id)
        .bind(&position.streamer)
        .bind(position.lat)
        .bind(position.lng)
        .bind(&position.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_position(
        &self,
        id: &str,
        update: &PositionUpdate,
    ) -> Result<Position, AppError> {
        let existing = self
            .get_position(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("position {id}")))?;
        let updated = update.apply(&existing);

        sqlx::query("UPDATE positions SET lat = ?, lng = ?, created_at = ? WHERE id = ?")
            .bind(updated.lat)
            .bind(updated.lng)
            .bind(&updated.created_at)
            .bind(existing.id.parse::<i64>().unwrap_or_default())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // The mirror field is a document-backend concern.
        Ok(Position {
            created_at_ts: None,
            ..updated
        })
    }

    async fn delete_position(&self, id: &str) -> Result<(), AppError> {
        let Ok(row_id) = id.parse::<i64>() else {
            return Err(AppError::NotFound(format!("position {id}")));
        };
        let result = sqlx::query("DELETE FROM positions WHERE id = ?")
            .bind(row_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("position {id}")));
        }
        Ok(())
    }

    async fn count_positions(&self) -> Result<Option<u64>, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Some(count as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let s = store().await;
        s.seed().await.unwrap();
        s.seed().await.unwrap();

        let route = s.list_route().await.unwrap();
        assert_eq!(route.len(), PLANNED_ROUTE.len());
        assert_eq!(route[0].name, "Montpellier (Radisson Blu)");
        assert_eq!(route.last().unwrap().name, "Paris (Arrivée)");

        // Seeding also inserts exactly one start position.
        assert_eq!(s.count_positions().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_list_orders_chronologically() {
        let s = store().await;
        s.add_position(44.0, 4.0, Some("2025-09-10T08:00:00+02:00".to_string()))
            .await
            .unwrap();
        s.add_position(43.9, 3.9, Some("2025-09-09T08:00:00+02:00".to_string()))
            .await
            .unwrap();

        let positions = s.list_positions().await.unwrap();
        let times: Vec<&str> = positions.iter().map(|p| p.created_at.as_str()).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let s = store().await;
        let created = s
            .add_position(43.7, 4.1, Some("2025-09-09T10:00:00+02:00".to_string()))
            .await
            .unwrap();

        let fetched = s.get_position(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        let updated = s
            .update_position(
                &created.id,
                &PositionUpdate {
                    lng: Some(4.2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.lng, 4.2);
        assert_eq!(updated.lat, 43.7);

        s.delete_position(&created.id).await.unwrap();
        assert!(s.get_position(&created.id).await.unwrap().is_none());

        let err = s.delete_position(&created.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_with_opaque_document_id_is_none() {
        let s = store().await;
        assert!(s.get_position("a1b2c3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_matching_position_tolerance() {
        let s = store().await;
        s.add_position(43.7, 4.1, Some("2025-09-09T10:00:00+02:00".to_string()))
            .await
            .unwrap();

        assert!(s
            .has_matching_position("2025-09-09T10:00:00+02:00", 43.7000001, 4.1, 1e-6)
            .await
            .unwrap());
        assert!(!s
            .has_matching_position("2025-09-09T10:00:00+02:00", 43.71, 4.1, 1e-6)
            .await
            .unwrap());
        assert!(!s
            .has_matching_position("2025-09-09T11:00:00+02:00", 43.7, 4.1, 1e-6)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_meta_and_arrival() {
        let s = store().await;
        assert_eq!(
            s.get_meta("admin_code").await.unwrap().as_deref(),
            Some(DEFAULT_ADMIN_CODE)
        );

        s.set_meta("admin_code", "newcode").await.unwrap();
        assert_eq!(
            s.get_meta("admin_code").await.unwrap().as_deref(),
            Some("newcode")
        );

        let stop = s.find_stop("lyon").await.unwrap().unwrap();
        s.set_arrival_time(stop.id, "2025-09-20T18:00:00+02:00")
            .await
            .unwrap();
        let stop = s.find_stop("LYON").await.unwrap().unwrap();
        assert_eq!(
            stop.arrival_time.as_deref(),
            Some("2025-09-20T18:00:00+02:00")
        );

        let start = s.start_meta().await.unwrap();
        assert_eq!(start.len(), 4);
    }
}
