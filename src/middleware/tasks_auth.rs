// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Origin checks for `/tasks/*` routes.
//!
//! Cloud Run strips `X-CloudTasks-*` and `X-CloudScheduler` headers from
//! external requests, so their presence means the request came from Google's
//! infrastructure. Sync jobs additionally carry an OIDC token that is verified
//! against Google's signing keys.

use crate::services::OidcError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const QUEUE_NAME_HEADER: &str = "x-cloudtasks-queuename";
pub const SCHEDULER_HEADER: &str = "x-cloudscheduler";

/// Require the configured queue name in `x-cloudtasks-queuename` and a valid
/// Cloud Tasks OIDC token.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let queue_name_header = request.headers().get(QUEUE_NAME_HEADER);
    let is_valid_queue = queue_name_header
        .and_then(|h| h.to_str().ok())
        .map(|name| name == state.config.expected_queue_name())
        .unwrap_or(false);

    if !is_valid_queue {
        tracing::warn!(
            header = ?queue_name_header,
            path = %request.uri().path(),
            "Blocked tasks request with invalid queue header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    let principal = state
        .google_oidc_verifier
        .verify_cloud_tasks_token(request.headers().get(header::AUTHORIZATION))
        .await
        .map_err(|err| match err {
            OidcError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "Blocked tasks request: invalid OIDC token");
                StatusCode::FORBIDDEN
            }
            OidcError::Transient(reason) => {
                tracing::error!(reason = %reason, "Tasks OIDC verification transient failure");
                StatusCode::SERVICE_UNAVAILABLE
            }
        })?;

    tracing::debug!(
        email = %principal.email,
        subject = %principal.subject,
        "Cloud Tasks OIDC verification succeeded"
    );

    Ok(next.run(request).await)
}

/// Require `x-cloudscheduler: true`.
pub async fn require_scheduler(request: Request, next: Next) -> Result<Response, StatusCode> {
    let is_scheduler = request
        .headers()
        .get(SCHEDULER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !is_scheduler {
        tracing::warn!(
            path = %request.uri().path(),
            "Blocked scheduler request without Cloud Scheduler header"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
