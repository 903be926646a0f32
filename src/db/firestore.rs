// SPDX-License-Identifier: MIT

//! Firestore backend: the optional/remote document position store.
//!
//! Positions live in the `positions` collection. Chronological order is
//! restored in memory from the `created_at_ts` timestamp mirror (civil
//! string as fallback); ordering the query itself by a data field would
//! drop documents missing that field. Cached walking segments live in
//! `walking_segments`, keyed by the ordered pair of position ids.

use crate::db::{collections, PositionBackend, SegmentStore};
use crate::error::AppError;
use crate::models::{position::STREAMER, Position, PositionUpdate, Segment};
use crate::time_utils;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Paged approximate count: the document model has no fast native count.
const COUNT_PAGE_SIZE: u32 = 500;
const MAX_COUNT_PAGES: u32 = 20;

/// Position document shape. The document id is not stored in the body;
/// firestore-rs injects it on reads via the `_firestore_id` alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PositionDoc {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    id: Option<String>,
    streamer: String,
    lat: f64,
    lng: f64,
    created_at: String,
    #[serde(
        default,
        serialize_with = "firestore::serialize_as_optional_timestamp::serialize",
        deserialize_with = "lenient_instant",
        skip_serializing_if = "Option::is_none"
    )]
    created_at_ts: Option<DateTime<Utc>>,
}

/// Mirror-field deserializer tolerant of legacy document shapes. New
/// writes store a native timestamp (read back as an RFC3339 string);
/// older documents may hold a plain unparseable string, a wrong type,
/// or nothing. Anything that is not a readable instant becomes None
/// instead of failing the whole document.
fn lenient_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(time_utils::parse_instant))
}

/// Chronological ascending sort that never requires the mirror field:
/// the mirror when present, an instant derived from the civil string
/// next, the raw string and id as final tiebreaks. Documents with no
/// derivable instant sort first rather than being dropped.
fn sort_chronologically(positions: &mut [Position]) {
    positions.sort_by(|a, b| {
        let ka = a
            .created_at_ts
            .or_else(|| time_utils::parse_instant(&a.created_at));
        let kb = b
            .created_at_ts
            .or_else(|| time_utils::parse_instant(&b.created_at));
        ka.cmp(&kb)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl PositionDoc {
    fn from_position(position: &Position) -> Self {
        Self {
            id: None,
            streamer: position.streamer.clone(),
            lat: position.lat,
            lng: position.lng,
            created_at: position.created_at.clone(),
            created_at_ts: position.created_at_ts,
        }
    }

    fn into_position(self) -> Position {
        Position {
            id: self.id.unwrap_or_default(),
            streamer: self.streamer,
            lat: self.lat,
            lng: self.lng,
            created_at: self.created_at,
            created_at_ts: self.created_at_ts,
        }
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

}

#[async_trait]
impl PositionBackend for FirestoreStore {
    async fn list_positions(&self) -> Result<Vec<Position>, AppError> {
        // The query orders by document name, which every document has.
        // Ordering by `created_at_ts` would exclude documents missing
        // the mirror, which is exactly the shape the normalize-dates
        // pass must be able to see; chronology is restored in memory.
        let docs: Vec<PositionDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::POSITIONS)
            .order_by([(
                "__name__".to_string(),
                firestore::FirestoreQueryDirection::Ascending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut positions: Vec<Position> =
            docs.into_iter().map(PositionDoc::into_position).collect();
        sort_chronologically(&mut positions);
        Ok(positions)
    }

    async fn add_position(
        &self,
        lat: f64,
        lng: f64,
        created_at: Option<String>,
    ) -> Result<Position, AppError> {
        let created_at = created_at.unwrap_or_else(time_utils::now_civil_iso);
        let doc = PositionDoc {
            id: None,
            streamer: STREAMER.to_string(),
            lat,
            lng,
            created_at: created_at.clone(),
            created_at_ts: time_utils::parse_instant(&created_at),
        };

        let created: PositionDoc = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::POSITIONS)
            .generate_document_id()
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(created.into_position())
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, AppError> {
        let doc: Option<PositionDoc> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::POSITIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(doc.map(PositionDoc::into_position))
    }

    async fn put_position(&self, id: &str, position: &Position) -> Result<(), AppError> {
        let doc = PositionDoc::from_position(position);
        let _: PositionDoc = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::POSITIONS)
            .document_id(id)
            .object(&doc)
            .execute()
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
        self.put_position(id, &updated).await?;
        Ok(updated)
    }

    async fn delete_position(&self, id: &str) -> Result<(), AppError> {
        if self.get_position(id).await?.is_none() {
            return Err(AppError::NotFound(format!("position {id}")));
        }
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::POSITIONS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Approximate count by paging through the collection ordered by
    /// document id. Returns None once the safety cap is reached.
    async fn count_positions(&self) -> Result<Option<u64>, AppError> {
        let client = self.get_client()?;
        let mut total: u64 = 0;

        for page in 0..MAX_COUNT_PAGES {
            let batch: Vec<PositionDoc> = client
                .fluent()
                .select()
                .from(collections::POSITIONS)
                .order_by([(
                    "__name__".to_string(),
                    firestore::FirestoreQueryDirection::Ascending,
                )])
                .offset(page * COUNT_PAGE_SIZE)
                .limit(COUNT_PAGE_SIZE)
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            total += batch.len() as u64;
            if (batch.len() as u32) < COUNT_PAGE_SIZE {
                return Ok(Some(total));
            }
        }

        tracing::warn!(
            cap = COUNT_PAGE_SIZE * MAX_COUNT_PAGES,
            "Position count exceeded safety cap, reporting unknown"
        );
        Ok(None)
    }
}

#[async_trait]
impl SegmentStore for FirestoreStore {
    async fn get_segment(&self, key: &str) -> Result<Option<Segment>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::WALKING_SEGMENTS)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_segment(&self, key: &str, segment: &Segment) -> Result<(), AppError> {
        let _: Segment = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::WALKING_SEGMENTS)
            .document_id(key)
            .object(segment)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
