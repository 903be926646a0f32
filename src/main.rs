// SPDX-License-Identifier: MIT

use std::sync::Arc;

use trek_tracker::config::Config;
use trek_tracker::db::{self, FirestoreStore, PositionBackend, PositionStore, SegmentStore, SqliteStore};
use trek_tracker::routes::create_router;
use trek_tracker::services::{RoutingClient, SegmentService, TwitchService};
use trek_tracker::AppState;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trek_tracker=debug,info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env();
    tracing::info!(port = config.port, "Starting trek tracker API");

    let sqlite = Arc::new(SqliteStore::connect(&config.sqlite_path).await?);
    if let Some(code) = &config.admin_code_override {
        sqlite.set_meta("admin_code", code).await?;
        tracing::info!("Admin code taken from environment");
    }

    let firestore = if config.use_firestore {
        match FirestoreStore::new(&config.firestore_project_id).await {
            Ok(store) => {
                tracing::info!(project = %config.firestore_project_id, "Firestore is the primary position store");
                Some(store)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Firestore unavailable, running on SQLite only");
                None
            }
        }
    } else {
        tracing::info!("Firestore disabled, running on SQLite only");
        None
    };

    let primary: Option<Arc<dyn PositionBackend>> = firestore
        .clone()
        .map(|store| Arc::new(store) as Arc<dyn PositionBackend>);
    let segment_store: Option<Arc<dyn SegmentStore>> =
        firestore.map(|store| Arc::new(store) as Arc<dyn SegmentStore>);

    let store = PositionStore::new(primary, sqlite);
    let routing = Arc::new(RoutingClient::new(config.ors_api_key.clone()));
    let segments = SegmentService::new(segment_store, routing.clone(), &config);
    let twitch = TwitchService::new(&config);

    let state = Arc::new(AppState {
        config: config.clone(),
        store: store.clone(),
        segments,
        routing,
        twitch,
    });

    // Catch the primary up in the background; never blocks the socket.
    tokio::spawn(async move {
        db::migrate::auto_migrate(&store).await;
    });

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
