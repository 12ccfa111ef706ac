// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity as fetched from the athlete activities endpoint.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One fetched activity. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID
    pub id: u64,
    /// Activity name/title
    pub name: String,
    /// Legacy activity type (Ride, Run, ...)
    #[serde(rename = "type", default)]
    pub activity_type: String,
    /// Sport type (Ride, Run, TrailRun, ...)
    #[serde(default)]
    pub sport_type: String,
    /// Distance in meters
    #[serde(default)]
    pub distance: f64,
    /// Moving time in seconds
    #[serde(default)]
    pub moving_time: u64,
    /// Elapsed time in seconds
    #[serde(default)]
    pub elapsed_time: u64,
    /// Elevation gain in meters
    #[serde(default)]
    pub total_elevation_gain: f64,
    /// Start time (UTC)
    pub start_date: DateTime<Utc>,
    /// Start time in the athlete's local timezone. Strava sends it with a
    /// `Z` suffix even though it is not UTC.
    #[serde(deserialize_with = "deserialize_local")]
    pub start_date_local: NaiveDateTime,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    /// Meters per second
    #[serde(default)]
    pub average_speed: f64,
    /// Meters per second
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub kudos_count: u32,
    #[serde(default)]
    pub comment_count: u32,
}

impl Activity {
    /// Sport type, falling back to the legacy type when absent.
    pub fn kind(&self) -> &str {
        if self.sport_type.is_empty() {
            &self.activity_type
        } else {
            &self.sport_type
        }
    }
}

fn deserialize_local<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").map_err(serde::de::Error::custom)
}
