// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use trek_tracker::config::Config;
use trek_tracker::db::{PositionBackend, PositionStore, SegmentStore, SqliteStore};
use trek_tracker::error::AppError;
use trek_tracker::models::{LngLat, Position, PositionUpdate, Segment};
use trek_tracker::routes::create_router;
use trek_tracker::services::routing::{RouteProvider, RoutedPath, SOURCE_OSRM};
use trek_tracker::services::{RoutingClient, SegmentService, TwitchService};
use trek_tracker::time_utils;
use trek_tracker::AppState;

/// Check if the Firestore emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if the emulator is not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// In-memory document backend standing in for Firestore.
#[allow(dead_code)]
#[derive(Default)]
pub struct MemoryBackend {
    positions: Mutex<Vec<Position>>,
    next_id: AtomicUsize,
    /// When set, every call fails with a message of this flavor.
    pub fail_with: Option<String>,
}

#[allow(dead_code)]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every call fails like a misconfigured service
    /// account.
    pub fn failing_credentials() -> Self {
        Self::failing_with("7 PERMISSION_DENIED: permission denied on project")
    }

    /// A backend whose every call fails with the given message.
    pub fn failing_with(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), AppError> {
        match &self.fail_with {
            Some(msg) => Err(AppError::Database(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PositionBackend for MemoryBackend {
    async fn list_positions(&self) -> Result<Vec<Position>, AppError> {
        self.check()?;
        let mut all = self.positions.lock().await.clone();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(all)
    }

    async fn add_position(
        &self,
        lat: f64,
        lng: f64,
        created_at: Option<String>,
    ) -> Result<Position, AppError> {
        self.check()?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let created_at = created_at.unwrap_or_else(time_utils::now_civil_iso);
        let position = Position::new(id, lat, lng, created_at);
        self.positions.lock().await.push(position.clone());
        Ok(position)
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, AppError> {
        self.check()?;
        Ok(self
            .positions
            .lock()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn put_position(&self, id: &str, position: &Position) -> Result<(), AppError> {
        self.check()?;
        let mut all = self.positions.lock().await;
        all.retain(|p| p.id != id);
        let mut stored = position.clone();
        stored.id = id.to_string();
        all.push(stored);
        Ok(())
    }

    async fn update_position(
        &self,
        id: &str,
        update: &PositionUpdate,
    ) -> Result<Position, AppError> {
        self.check()?;
        let mut all = self.positions.lock().await;
        let position = all
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("position {id}")))?;
        *position = update.apply(position);
        Ok(position.clone())
    }

    async fn delete_position(&self, id: &str) -> Result<(), AppError> {
        self.check()?;
        let mut all = self.positions.lock().await;
        let before = all.len();
        all.retain(|p| p.id != id);
        if all.len() == before {
            return Err(AppError::NotFound(format!("position {id}")));
        }
        Ok(())
    }

    async fn count_positions(&self) -> Result<Option<u64>, AppError> {
        self.check()?;
        Ok(Some(self.positions.lock().await.len() as u64))
    }
}

/// In-memory segment cache.
#[allow(dead_code)]
#[derive(Default)]
pub struct MemorySegmentStore {
    segments: Mutex<HashMap<String, Segment>>,
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn get_segment(&self, key: &str) -> Result<Option<Segment>, AppError> {
        Ok(self.segments.lock().await.get(key).cloned())
    }

    async fn put_segment(&self, key: &str, segment: &Segment) -> Result<(), AppError> {
        self.segments
            .lock()
            .await
            .insert(key.to_string(), segment.clone());
        Ok(())
    }
}

/// Routing stub that counts calls and can be switched to always fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingRouter {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[allow(dead_code)]
impl CountingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteProvider for CountingRouter {
    async fn walking_route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        _timeout: Duration,
    ) -> Result<RoutedPath, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Routing("stub failure".to_string()));
        }
        // Three points so routed geometry is distinguishable from a
        // straight line.
        let mid = LngLat::new((from.1 + to.1) / 2.0 + 0.001, (from.0 + to.0) / 2.0);
        Ok(RoutedPath {
            geometry: vec![LngLat::new(from.1, from.0), mid, LngLat::new(to.1, to.0)],
            distance_km: Some(1.5),
            duration_min: Some(18.0),
            source: SOURCE_OSRM.to_string(),
        })
    }
}

/// Test app over an in-memory SQLite store, no document backend, and a
/// counting routing stub. Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(None, Arc::new(CountingRouter::new())).await
}

/// Variant taking an explicit document backend and router stub.
#[allow(dead_code)]
pub async fn create_test_app_with(
    primary: Option<Arc<dyn PositionBackend>>,
    router: Arc<CountingRouter>,
) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let sqlite = Arc::new(
        SqliteStore::connect(":memory:")
            .await
            .expect("Failed to open in-memory SQLite"),
    );
    let store = PositionStore::new(primary, sqlite);

    let segment_store: Option<Arc<dyn SegmentStore>> =
        Some(Arc::new(MemorySegmentStore::default()));
    let segments = SegmentService::new(segment_store, router, &config);
    let routing = Arc::new(RoutingClient::new(None));
    let twitch = TwitchService::new(&config);

    let state = Arc::new(AppState {
        config,
        store,
        segments,
        routing,
        twitch,
    });

    (create_router(state.clone()), state)
}
