// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Result of one sync attempt.

use crate::error::ErrorKind;
use crate::models::SyncStatus;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Terminal value of a sync attempt, built once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
pub struct ProcessingResult {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub success: bool,
    pub activities_count: u32,
    /// Wall-clock time spent on the attempt
    #[serde(rename = "processing_duration_ms", with = "duration_ms")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub processing_duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub requires_reauth: bool,
    /// A provider rate limit ended the attempt; safe to reschedule later.
    pub rate_limited: bool,
}

impl ProcessingResult {
    pub fn succeeded(
        user_id: &str,
        trace_id: Option<String>,
        activities_count: u32,
        processing_duration: Duration,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            trace_id,
            success: true,
            activities_count,
            processing_duration,
            error_message: None,
            error_kind: None,
            requires_reauth: false,
            rate_limited: false,
        }
    }

    pub fn failed(
        user_id: &str,
        trace_id: Option<String>,
        kind: ErrorKind,
        message: String,
        rate_limited: bool,
        processing_duration: Duration,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            trace_id,
            success: false,
            activities_count: 0,
            processing_duration,
            error_message: Some(message),
            error_kind: Some(kind),
            requires_reauth: kind == ErrorKind::ReauthRequired,
            rate_limited,
        }
    }

    /// The attempt was skipped on purpose rather than failed.
    pub fn is_skip(&self) -> bool {
        self.error_kind == Some(ErrorKind::AutomationDisabled)
    }

    /// Status record to persist for this attempt.
    ///
    /// `previous_success` carries forward the last success timestamp on failure.
    pub fn to_status(
        &self,
        finished_at: DateTime<Utc>,
        previous_success: Option<String>,
    ) -> SyncStatus {
        let now = format_utc_rfc3339(finished_at);
        SyncStatus {
            last_attempt_at: now.clone(),
            last_success_at: if self.success {
                Some(now)
            } else {
                previous_success
            },
            last_error_kind: self.error_kind.map(|k| k.as_str().to_string()),
            last_error: self.error_message.clone(),
            activities_count: self.activities_count,
            requires_reauth: self.requires_reauth,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
