// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes.
//!
//! These endpoints are called by Cloud Tasks and Cloud Scheduler, not by
//! users. Origin checks live in [`crate::middleware::tasks_auth`].

use crate::error::AppError;
use crate::middleware::{require_scheduler, require_tasks_auth};
use crate::services::queue::SyncJob;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    middleware,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Task handler routes.
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let sync_user_route = Router::new()
        .route("/tasks/sync-user", post(sync_user))
        .route_layer(middleware::from_fn_with_state(state, require_tasks_auth));

    let schedule_route = Router::new()
        .route("/tasks/schedule", post(schedule))
        .route_layer(middleware::from_fn(require_scheduler));

    sync_user_route.merge(schedule_route)
}

/// Accept a sync job from Cloud Tasks and queue it for the dispatcher.
///
/// A full queue answers 503 so Cloud Tasks retries later.
async fn sync_user(
    State(state): State<Arc<AppState>>,
    Json(job): Json<SyncJob>,
) -> Result<StatusCode, AppError> {
    if job.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id is required".to_string()));
    }

    tracing::info!(
        user_id = %job.user_id,
        trace_id = %job.trace_id,
        "Queueing sync job from Cloud Task"
    );

    state.queue.enqueue(job)?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub requested: usize,
    pub queued: u32,
    pub failed: u32,
}

/// Fan out one Cloud Task per automation-enabled user.
async fn schedule(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let user_ids = state.store.list_automation_enabled_users().await?;
    let requested = user_ids.len();

    tracing::info!(users = requested, "Scheduling sync for automation-enabled users");

    let result = state
        .tasks_service
        .queue_sync_users(&state.config.api_url, user_ids)
        .await;

    if result.is_complete_failure() {
        return Err(AppError::Internal(anyhow::anyhow!(
            "failed to queue any of {} sync tasks",
            requested
        )));
    }

    if !result.is_complete_success() {
        tracing::warn!(
            failed = result.failed,
            failed_user_ids = ?result.failed_user_ids,
            "Some sync tasks could not be queued"
        );
    }

    Ok(Json(ScheduleResponse {
        requested,
        queued: result.queued,
        failed: result.failed,
    }))
}
