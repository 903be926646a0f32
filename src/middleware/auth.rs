// SPDX-License-Identifier: MIT

//! Admin-code middleware.
//!
//! The shared secret lives in the meta table. A request may carry the
//! code in the `X-Admin-Code` header, an `adminCode` query parameter, or
//! an `adminCode` field in a JSON body; the body is buffered so the
//! handler can still read it.

use crate::error::AppError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Buffering limit for JSON bodies inspected for the admin code.
const BODY_LIMIT: usize = 64 * 1024;

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// Middleware guarding admin routes: 401 when no code is supplied, 403
/// when it does not match the stored secret.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let mut code = parts
        .headers
        .get("x-admin-code")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    if code.is_none() {
        code = query_param(parts.uri.query(), "adminCode");
    }

    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| AppError::BadRequest("Request body too large".to_string()))?;

    if code.is_none() && !bytes.is_empty() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            code = value
                .get("adminCode")
                .and_then(|c| c.as_str())
                .map(str::to_string);
        }
    }

    let Some(code) = code else {
        return Err(AppError::Unauthorized);
    };

    let secret = state.store.secondary().get_meta("admin_code").await?;
    if secret.as_deref() != Some(code.as_str()) {
        return Err(AppError::Forbidden);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_extraction() {
        assert_eq!(
            query_param(Some("lat=43.6&adminCode=s3cret"), "adminCode").as_deref(),
            Some("s3cret")
        );
        assert_eq!(query_param(Some("lat=43.6"), "adminCode"), None);
        assert_eq!(query_param(None, "adminCode"), None);
    }
}
