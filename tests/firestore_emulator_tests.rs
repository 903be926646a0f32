// SPDX-License-Identifier: MIT

//! Smoke tests against a real Firestore emulator. Skipped unless
//! FIRESTORE_EMULATOR_HOST is set.

mod common;

use trek_tracker::db::{FirestoreStore, PositionBackend, SegmentStore};
use trek_tracker::models::{LngLat, Position, Segment};

#[tokio::test]
async fn test_position_round_trip() {
    require_emulator!();

    let store = FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator");

    let created = store
        .add_position(43.68, 4.14, Some("2025-09-09T10:00:00+02:00".to_string()))
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    assert!(created.created_at_ts.is_some());

    let fetched = store.get_position(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.lat, 43.68);
    assert_eq!(fetched.created_at, "2025-09-09T10:00:00+02:00");

    let listed = store.list_positions().await.unwrap();
    assert!(listed.iter().any(|p| p.id == created.id));

    store.delete_position(&created.id).await.unwrap();
    assert!(store.get_position(&created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_segment_round_trip() {
    require_emulator!();

    let store = FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator");

    let segment = Segment {
        from_id: "a".to_string(),
        to_id: "b".to_string(),
        geometry: vec![LngLat::new(3.88, 43.61), LngLat::new(4.14, 43.68)],
        distance_km: Some(25.0),
        duration_min: Some(300.0),
        source: "osrm".to_string(),
    };

    store.put_segment(&segment.key(), &segment).await.unwrap();
    let fetched = store
        .get_segment(&Segment::key_for("a", "b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, segment);
    assert!(store.get_segment("a__missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_put_preserves_caller_id() {
    require_emulator!();

    let store = FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator");

    let position = Position::new(
        "42".to_string(),
        43.84,
        4.36,
        "2025-09-10T11:30:00+02:00".to_string(),
    );
    store.put_position("42", &position).await.unwrap();

    let fetched = store.get_position("42").await.unwrap().unwrap();
    assert_eq!(fetched.id, "42");
    assert_eq!(fetched.lng, 4.36);

    store.delete_position("42").await.unwrap();
}
