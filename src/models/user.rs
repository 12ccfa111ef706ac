// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Per-user sync configuration and status records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sync configuration for one user, as stored by the configuration service.
///
/// The worker only reads it. Refreshed tokens are never written back here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSyncConfig {
    /// User ID (also used as document ID)
    pub user_id: String,
    pub email: String,
    /// IANA timezone name chosen by the user
    pub timezone: String,
    /// Target Google spreadsheet
    pub spreadsheet_id: String,
    /// Sync is skipped entirely when false
    #[serde(default)]
    pub automation_enabled: bool,

    #[serde(default)]
    pub strava_refresh_token: String,
    #[serde(default)]
    pub strava_access_token: String,
    #[serde(default)]
    pub strava_token_expiry: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sheets_refresh_token: String,
    #[serde(default)]
    pub sheets_access_token: String,
    #[serde(default)]
    pub sheets_token_expiry: Option<DateTime<Utc>>,
}

impl UserSyncConfig {
    /// Both refresh tokens are present. Without them no sync can succeed.
    pub fn has_credentials(&self) -> bool {
        !self.strava_refresh_token.trim().is_empty() && !self.sheets_refresh_token.trim().is_empty()
    }

    /// Start of the activity window ending at `now`.
    pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        now - Duration::days(days)
    }
}

/// Outcome of the last sync attempt, written best-effort after each job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    /// When the last attempt finished (RFC 3339)
    pub last_attempt_at: String,
    /// When the last successful attempt finished (RFC 3339)
    pub last_success_at: Option<String>,
    pub last_error_kind: Option<String>,
    pub last_error: Option<String>,
    pub activities_count: u32,
    pub requires_reauth: bool,
}
