// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Everything tunable at the boundary lives here: which position backend
//! is primary, external credentials, routing-provider key, and the
//! segment-cache limits.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Whether Firestore is configured as the primary position store
    pub use_firestore: bool,
    /// GCP project ID for Firestore
    pub firestore_project_id: String,
    /// Path to the SQLite database file
    pub sqlite_path: String,
    /// Admin code override; when set, upserted into meta at startup
    pub admin_code_override: Option<String>,
    /// OpenRouteService API key (tier-1 routing; tier 2 needs no key)
    pub ors_api_key: Option<String>,
    /// Per-call routing timeout in milliseconds
    pub route_timeout_ms: u64,
    /// Max consecutive pairs routed live in reduced track mode (floor 5)
    pub max_live_pairs: usize,
    /// Wall-clock budget for one track-assembly request, milliseconds
    pub track_budget_ms: u64,
    /// Twitch client-credentials pair (optional)
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    /// Twitch login probed for live status
    pub twitch_user_login: String,
}

const DEFAULT_MAX_LIVE_PAIRS: usize = 40;
const MIN_LIVE_PAIRS: usize = 5;

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 4000,
            use_firestore: false,
            firestore_project_id: "test-project".to_string(),
            sqlite_path: ":memory:".to_string(),
            admin_code_override: None,
            ors_api_key: None,
            route_timeout_ms: 9_000,
            max_live_pairs: DEFAULT_MAX_LIVE_PAIRS,
            track_budget_ms: 10_000,
            twitch_client_id: None,
            twitch_client_secret: None,
            twitch_user_login: "byilhann".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .unwrap_or(4000),
            use_firestore: env::var("USE_FIRESTORE")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            firestore_project_id: env::var("FIRESTORE_PROJECT_ID")
                .unwrap_or_else(|_| "local-dev".to_string()),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "data.sqlite".to_string()),
            admin_code_override: env::var("ADMIN_CODE").ok().filter(|v| !v.is_empty()),
            ors_api_key: env::var("ORS_API_KEY").ok().filter(|v| !v.is_empty()),
            route_timeout_ms: env::var("ROUTE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9_000),
            max_live_pairs: env::var("MAX_LIVE_SEGMENT_PAIRS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_LIVE_PAIRS)
                .max(MIN_LIVE_PAIRS),
            track_budget_ms: env::var("TRACK_BUDGET_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            twitch_client_id: env::var("TWITCH_CLIENT_ID").ok().filter(|v| !v.is_empty()),
            twitch_client_secret: env::var("TWITCH_CLIENT_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            twitch_user_login: env::var("TWITCH_USER_LOGIN")
                .unwrap_or_else(|_| "byilhann".to_string()),
        }
    }

    /// Default config for tests (in-memory SQLite, no primary backend).
    pub fn test_default() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_pairs_floor_applied_from_env() {
        env::set_var("MAX_LIVE_SEGMENT_PAIRS", "2");
        let config = Config::from_env();
        env::remove_var("MAX_LIVE_SEGMENT_PAIRS");
        assert_eq!(config.max_live_pairs, MIN_LIVE_PAIRS);
    }

    #[test]
    fn test_default_live_pairs() {
        assert_eq!(
            Config::test_default().max_live_pairs,
            DEFAULT_MAX_LIVE_PAIRS
        );
    }
}
