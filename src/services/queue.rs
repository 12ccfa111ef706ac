// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync job queue.
//!
//! Cloud Tasks pushes jobs to `/tasks/sync-user`; the handler enqueues them on
//! a bounded in-process channel that the dispatcher drains.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One user to sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub user_id: String,
    /// Correlation ID, generated if the producer did not supply one.
    #[serde(default = "new_trace_id")]
    pub trace_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: new_trace_id(),
            created_at: Utc::now(),
        }
    }
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Source of sync jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Wait up to `timeout` for the next job.
    ///
    /// `None` means nothing arrived in time (or the queue is closed).
    async fn dequeue(&self, timeout: Duration) -> Option<SyncJob>;
}

/// Bounded in-process queue.
pub struct ChannelQueue {
    tx: mpsc::Sender<SyncJob>,
    rx: Mutex<mpsc::Receiver<SyncJob>>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Add a job without waiting.
    pub fn enqueue(&self, job: SyncJob) -> Result<(), AppError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                AppError::Queue(format!("sync queue full, rejected user {}", job.user_id))
            }
            mpsc::error::TrySendError::Closed(_) => AppError::Queue("sync queue closed".to_string()),
        })
    }

    /// Jobs currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn dequeue(&self, timeout: Duration) -> Option<SyncJob> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}
