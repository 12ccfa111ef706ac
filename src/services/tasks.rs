// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks service for fanning out per-user sync jobs.
//!
//! The scheduler endpoint creates one HTTP task per automation-enabled user;
//! Cloud Tasks then pushes each to `/tasks/sync-user` at the queue's rate.
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use crate::config::tasks_service_account_email;
use crate::error::AppError;
use crate::error::Result;
use crate::services::queue::SyncJob;
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const MAX_CONCURRENT_TASKS: usize = 100;

/// Result of a batch enqueue.
///
/// Lists which users failed so the caller can report partial failures.
#[derive(Debug, Clone, Default)]
pub struct EnqueueResult {
    /// Number of users successfully queued.
    pub queued: u32,
    /// Number of users that failed to queue.
    pub failed: u32,
    /// User IDs that failed to queue.
    pub failed_user_ids: Vec<String>,
}

impl EnqueueResult {
    /// Returns true if all users were queued.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns true if every user failed to queue.
    pub fn is_complete_failure(&self) -> bool {
        self.queued == 0 && self.failed > 0
    }
}

/// Cloud Tasks client wrapper.
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
    /// Mock: user IDs that should fail when queued (test builds only).
    #[cfg(test)]
    mock_fail_ids: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str, queue_name: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: queue_name.to_string(),
            #[cfg(test)]
            mock_fail_ids: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Set user IDs that should fail when queued (test builds only).
    #[cfg(test)]
    pub fn set_mock_fail_ids<S: Into<String>>(&self, ids: impl IntoIterator<Item = S>) {
        let mut guard = self.mock_fail_ids.lock().unwrap();
        guard.clear();
        guard.extend(ids.into_iter().map(Into::into));
    }

    /// Queue a sync job for one user.
    pub async fn queue_sync_user(&self, service_url: &str, job: &SyncJob) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let service_url = service_url.trim_end_matches('/');
        let queue_path = format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        );

        let body = serde_json::to_vec(job)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}/tasks/sync-user", service_url))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(tasks_service_account_email(&self.project_id))
                    .set_audience(service_url.to_string()),
            );

        let task = Task::default().set_http_request(http_request);

        let _response = client
            .create_task()
            .set_parent(queue_path)
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }

    /// Queue a sync job for each user.
    pub async fn queue_sync_users(&self, service_url: &str, user_ids: Vec<String>) -> EnqueueResult {
        let count = user_ids.len();
        let queued = Arc::new(AtomicU32::new(0));
        let failed_user_ids = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        stream::iter(user_ids)
            .for_each_concurrent(MAX_CONCURRENT_TASKS, |user_id| {
                let queued = Arc::clone(&queued);
                let failed_user_ids = Arc::clone(&failed_user_ids);
                async move {
                    #[cfg(test)]
                    {
                        let should_fail = self.mock_fail_ids.lock().unwrap().contains(&user_id);
                        if should_fail {
                            tracing::warn!(user_id = %user_id, "Mock failure for user");
                            failed_user_ids.lock().await.push(user_id);
                            return;
                        }
                    }

                    let job = SyncJob::new(user_id.as_str());
                    match self.queue_sync_user(service_url, &job).await {
                        Ok(()) => {
                            queued.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(
                                user_id = %user_id,
                                error = ?e,
                                "Failed to queue sync task"
                            );
                            failed_user_ids.lock().await.push(user_id);
                        }
                    }
                }
            })
            .await;

        let queued = queued.load(Ordering::Relaxed);
        let failed_user_ids = std::mem::take(&mut *failed_user_ids.lock().await);
        let failed = failed_user_ids.len() as u32;

        tracing::info!(
            requested = count,
            succeeded = queued,
            failed,
            "Queued sync tasks"
        );

        EnqueueResult {
            queued,
            failed,
            failed_user_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_result_states() {
        assert!(EnqueueResult::default().is_complete_success());

        let partial = EnqueueResult {
            queued: 2,
            failed: 1,
            failed_user_ids: vec!["u3".to_string()],
        };
        assert!(!partial.is_complete_success());
        assert!(!partial.is_complete_failure());

        let none = EnqueueResult {
            queued: 0,
            failed: 2,
            failed_user_ids: vec!["u1".to_string(), "u2".to_string()],
        };
        assert!(none.is_complete_failure());
    }

    #[tokio::test]
    async fn queue_sync_users_reports_mock_failures() {
        let service = TasksService::new("test-project", "us-central1", "sheet-sync");
        service.set_mock_fail_ids(["u1", "u2", "u3"]);

        let result = service
            .queue_sync_users(
                "http://localhost",
                vec!["u1".to_string(), "u2".to_string(), "u3".to_string()],
            )
            .await;

        assert!(result.is_complete_failure());
        assert_eq!(result.failed, 3);
        assert!(result.failed_user_ids.contains(&"u2".to_string()));
    }

    #[tokio::test]
    async fn queue_sync_users_empty_input() {
        let service = TasksService::new("test-project", "us-central1", "sheet-sync");
        let result = service.queue_sync_users("http://localhost", vec![]).await;

        assert!(result.is_complete_success());
        assert_eq!(result.queued, 0);
        assert!(result.failed_user_ids.is_empty());
    }

    #[test]
    fn set_mock_fail_ids_clears_previous() {
        let service = TasksService::new("test-project", "us-central1", "sheet-sync");
        service.set_mock_fail_ids(["a", "b"]);
        service.set_mock_fail_ids(["c"]);

        let guard = service.mock_fail_ids.lock().unwrap();
        assert!(!guard.contains("a"));
        assert!(guard.contains("c"));
    }
}
