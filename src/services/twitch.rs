// SPDX-License-Identifier: MIT

//! Twitch live-status probe with client-credentials OAuth.
//!
//! Both the app token and the status response are cached process-wide:
//! the token until shortly before expiry, the status for 60 seconds.
//! Probe failures never surface as HTTP errors; the endpoint always
//! answers with a status body.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const STATUS_TTL: Duration = Duration::from_secs(60);
/// Refresh the token this long before it actually expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TwitchStatus {
    pub live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TwitchStatus {
    fn offline() -> Self {
        Self {
            live: false,
            viewers: None,
            title: None,
            started_at: None,
            reason: None,
            error: None,
        }
    }

    fn offline_reason(reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::offline()
        }
    }

    fn offline_error(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::offline()
        }
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

struct CachedStatus {
    fetched_at: Instant,
    status: TwitchStatus,
}

pub struct TwitchService {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    user_login: String,
    token: Mutex<Option<CachedToken>>,
    status: Mutex<Option<CachedStatus>>,
}

impl TwitchService {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.twitch_client_id.clone(),
            client_secret: config.twitch_client_secret.clone(),
            user_login: config.twitch_user_login.clone(),
            token: Mutex::new(None),
            status: Mutex::new(None),
        }
    }

    /// Drop both caches. Test hook; also useful after credential rotation.
    pub async fn reset(&self) {
        *self.token.lock().await = None;
        *self.status.lock().await = None;
    }

    /// Cached live status for the configured login.
    pub async fn status(&self) -> TwitchStatus {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return TwitchStatus::offline_reason("NO_CREDENTIALS");
        };

        {
            let cached = self.status.lock().await;
            if let Some(c) = cached.as_ref() {
                if c.fetched_at.elapsed() < STATUS_TTL {
                    return c.status.clone();
                }
            }
        }

        let status = match self.probe(client_id, client_secret).await {
            Ok(status) => status,
            Err(e) => return TwitchStatus::offline_error(e),
        };

        *self.status.lock().await = Some(CachedStatus {
            fetched_at: Instant::now(),
            status: status.clone(),
        });
        status
    }

    async fn probe(&self, client_id: &str, client_secret: &str) -> Result<TwitchStatus, String> {
        let token = self.token(client_id, client_secret).await?;

        let response = self
            .http
            .get("https://api.twitch.tv/helix/streams")
            .query(&[("user_login", self.user_login.as_str())])
            .header("Client-ID", client_id)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| format!("Helix request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Helix returned HTTP {}", response.status()));
        }

        let body: HelixStreams = response
            .json()
            .await
            .map_err(|e| format!("Helix parse error: {e}"))?;

        Ok(match body.data.into_iter().next() {
            Some(stream) => TwitchStatus {
                live: true,
                viewers: Some(stream.viewer_count),
                title: Some(stream.title),
                started_at: Some(stream.started_at),
                reason: None,
                error: None,
            },
            None => TwitchStatus::offline(),
        })
    }

    async fn token(&self, client_id: &str, client_secret: &str) -> Result<String, String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref() {
            if Instant::now() + TOKEN_SLACK < t.expires_at {
                return Ok(t.token.clone());
            }
        }

        let response = self
            .http
            .post("https://id.twitch.tv/oauth2/token")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| format!("OAuth request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("OAuth returned HTTP {}", response.status()));
        }

        let body: OauthToken = response
            .json()
            .await
            .map_err(|e| format!("OAuth parse error: {e}"))?;

        let token = body.access_token.clone();
        *cached = Some(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(token)
    }
}

#[derive(Deserialize)]
struct OauthToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct HelixStreams {
    #[serde(default)]
    data: Vec<HelixStream>,
}

#[derive(Deserialize)]
struct HelixStream {
    viewer_count: u64,
    title: String,
    started_at: String,
}
