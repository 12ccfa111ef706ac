// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory configuration store for local development and tests.

use crate::db::SyncConfigStore;
use crate::error::AppError;
use crate::models::{SyncStatus, UserSyncConfig};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration store backed by concurrent maps.
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: DashMap<String, UserSyncConfig>,
    statuses: DashMap<String, SyncStatus>,
    /// User IDs whose lookups fail with a database error.
    failing: DashMap<String, String>,
    lookups: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user's configuration.
    pub fn insert(&self, config: UserSyncConfig) {
        self.configs.insert(config.user_id.clone(), config);
    }

    /// Make lookups for `user_id` fail with `message`.
    pub fn fail_lookups_for(&self, user_id: &str, message: &str) {
        self.failing.insert(user_id.to_string(), message.to_string());
    }

    /// Number of `get_sync_config` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Recorded status for a user, if any.
    pub fn status(&self, user_id: &str) -> Option<SyncStatus> {
        self.statuses.get(user_id).map(|s| s.clone())
    }
}

#[async_trait::async_trait]
impl SyncConfigStore for MemoryConfigStore {
    async fn get_sync_config(&self, user_id: &str) -> Result<Option<UserSyncConfig>, AppError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = self.failing.get(user_id) {
            return Err(AppError::Database(message.clone()));
        }
        Ok(self.configs.get(user_id).map(|c| c.clone()))
    }

    async fn list_automation_enabled_users(&self) -> Result<Vec<String>, AppError> {
        let mut ids: Vec<String> = self
            .configs
            .iter()
            .filter(|entry| entry.automation_enabled)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_sync_status(&self, user_id: &str) -> Result<Option<SyncStatus>, AppError> {
        Ok(self.status(user_id))
    }

    async fn record_sync_status(
        &self,
        user_id: &str,
        status: &SyncStatus,
    ) -> Result<(), AppError> {
        self.statuses.insert(user_id.to_string(), status.clone());
        Ok(())
    }
}
