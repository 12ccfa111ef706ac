// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Configuration storage collaborators.
//!
//! The sync worker only needs three things from storage: a user's sync
//! configuration, the list of users with automation switched on, and a place
//! to drop the outcome of each attempt. [`SyncConfigStore`] is that seam;
//! [`FirestoreDb`] backs it in production and [`MemoryConfigStore`] in local
//! development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryConfigStore;

use crate::error::AppError;
use crate::models::{SyncStatus, UserSyncConfig};

/// Collection names as constants.
pub mod collections {
    /// Per-user sync configuration (keyed by user_id)
    pub const SYNC_CONFIGS: &str = "sync_configs";
    /// Outcome of the last sync attempt (keyed by user_id)
    pub const SYNC_STATUS: &str = "sync_status";
}

/// Read access to per-user sync configuration.
#[async_trait::async_trait]
pub trait SyncConfigStore: Send + Sync {
    /// Load a user's sync configuration. `Ok(None)` when the user is unknown.
    async fn get_sync_config(&self, user_id: &str) -> Result<Option<UserSyncConfig>, AppError>;

    /// IDs of all users with automation enabled.
    async fn list_automation_enabled_users(&self) -> Result<Vec<String>, AppError>;

    /// Last recorded status for a user.
    async fn get_sync_status(&self, user_id: &str) -> Result<Option<SyncStatus>, AppError>;

    /// Record the outcome of a sync attempt.
    async fn record_sync_status(&self, user_id: &str, status: &SyncStatus)
        -> Result<(), AppError>;
}
