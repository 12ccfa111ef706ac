// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Sync configs (per-user settings and stored OAuth tokens)
//! - Sync status (outcome of the last attempt)

use crate::db::{collections, SyncConfigStore};
use crate::error::AppError;
use crate::models::{SyncStatus, UserSyncConfig};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Sync Config Operations ──────────────────────────────────

    /// Get a user's sync configuration.
    pub async fn get_config(&self, user_id: &str) -> Result<Option<UserSyncConfig>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SYNC_CONFIGS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of all users with automation enabled.
    pub async fn get_automation_enabled_user_ids(&self) -> Result<Vec<String>, AppError> {
        let configs: Vec<UserSyncConfig> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SYNC_CONFIGS)
            .filter(|q| q.for_all([q.field("automation_enabled").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(configs.into_iter().map(|c| c.user_id).collect())
    }

    // ─── Sync Status Operations ──────────────────────────────────

    /// Get the last recorded sync status for a user.
    pub async fn get_status(&self, user_id: &str) -> Result<Option<SyncStatus>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SYNC_STATUS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store the sync status for a user.
    pub async fn set_status(&self, user_id: &str, status: &SyncStatus) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SYNC_STATUS)
            .document_id(user_id)
            .object(status)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SyncConfigStore for FirestoreDb {
    async fn get_sync_config(&self, user_id: &str) -> Result<Option<UserSyncConfig>, AppError> {
        self.get_config(user_id).await
    }

    async fn list_automation_enabled_users(&self) -> Result<Vec<String>, AppError> {
        self.get_automation_enabled_user_ids().await
    }

    async fn get_sync_status(&self, user_id: &str) -> Result<Option<SyncStatus>, AppError> {
        self.get_status(user_id).await
    }

    async fn record_sync_status(
        &self,
        user_id: &str,
        status: &SyncStatus,
    ) -> Result<(), AppError> {
        self.set_status(user_id, status).await
    }
}
