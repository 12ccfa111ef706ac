// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mapping from activities to spreadsheet rows.
//!
//! Rows are written from `A2` downward (row 1 holds the user's header), one
//! activity per row, always nine columns:
//!
//! | A    | B    | C    | D        | E        | F    | G         | H  | I     |
//! |------|------|------|----------|----------|------|-----------|----|-------|
//! | date | name | type | distance | duration | pace | elevation | HR | kudos |
//!
//! Values are plain strings; the sheet is written with `USER_ENTERED` so
//! Google parses dates and numbers as a user typing them would.

use crate::models::Activity;
use crate::time_utils::format_hms;

/// Worksheet the activities are written to.
pub const SHEET_NAME: &str = "Sheet1";

/// Number of columns in every row.
pub const ROW_WIDTH: usize = 9;

/// First row written (row 1 is the header).
pub const FIRST_DATA_ROW: usize = 2;

/// Header cells, read during access validation.
pub const HEADER_RANGE: &str = "Sheet1!A1:I1";

/// Sport types that get a pace column.
const RUNNING_TYPES: &[&str] = &["Run", "TrailRun", "VirtualRun"];

/// Range covering exactly `row_count` data rows: `Sheet1!A2:I{n+1}`.
pub fn write_range(row_count: usize) -> String {
    format!(
        "{}!A{}:I{}",
        SHEET_NAME,
        FIRST_DATA_ROW,
        row_count + FIRST_DATA_ROW - 1
    )
}

/// Convert activities to rows, preserving their order.
pub fn activities_to_rows(activities: &[Activity]) -> Vec<[String; ROW_WIDTH]> {
    activities.iter().map(activity_to_row).collect()
}

/// Convert one activity to its nine cells.
pub fn activity_to_row(activity: &Activity) -> [String; ROW_WIDTH] {
    [
        activity
            .start_date_local
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        activity.name.clone(),
        activity.kind().to_string(),
        format_distance_km(activity.distance),
        format_hms(activity.moving_time),
        format_pace(activity),
        format!("{:.0}", activity.total_elevation_gain),
        activity
            .average_heartrate
            .map(|hr| format!("{:.0}", hr))
            .unwrap_or_default(),
        activity.kudos_count.to_string(),
    ]
}

fn format_distance_km(meters: f64) -> String {
    format!("{:.2}", meters / 1000.0)
}

/// Minutes per kilometre as `M:SS`, for running activities only.
fn format_pace(activity: &Activity) -> String {
    if !RUNNING_TYPES.contains(&activity.kind()) || activity.distance <= 0.0 {
        return String::new();
    }

    let secs_per_km = (activity.moving_time as f64 / (activity.distance / 1000.0)).round() as u64;
    format!("{}:{:02}", secs_per_km / 60, secs_per_km % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn activity(kind: &str, distance: f64, moving_time: u64) -> Activity {
        Activity {
            id: 1,
            name: "Lunch Run".to_string(),
            activity_type: kind.to_string(),
            sport_type: kind.to_string(),
            distance,
            moving_time,
            elapsed_time: moving_time + 60,
            total_elevation_gain: 87.6,
            start_date: Utc.with_ymd_and_hms(2026, 5, 4, 19, 30, 0).unwrap(),
            start_date_local: NaiveDate::from_ymd_opt(2026, 5, 4)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
            average_heartrate: Some(148.6),
            max_heartrate: Some(171.0),
            average_speed: 2.9,
            max_speed: 4.2,
            kudos_count: 7,
            comment_count: 0,
        }
    }

    #[test]
    fn write_range_sized_to_row_count() {
        assert_eq!(write_range(1), "Sheet1!A2:I2");
        assert_eq!(write_range(3), "Sheet1!A2:I4");
        assert_eq!(write_range(100), "Sheet1!A2:I101");
    }

    #[test]
    fn run_row_has_nine_ordered_fields() {
        let row = activity_to_row(&activity("Run", 10_000.0, 3000));
        assert_eq!(
            row,
            [
                "2026-05-04 12:30",
                "Lunch Run",
                "Run",
                "10.00",
                "0:50:00",
                "5:00",
                "88",
                "149",
                "7",
            ]
            .map(String::from)
        );
    }

    #[test]
    fn ride_has_no_pace() {
        let row = activity_to_row(&activity("Ride", 42_200.0, 5400));
        assert_eq!(row[3], "42.20");
        assert_eq!(row[4], "1:30:00");
        assert_eq!(row[5], "");
    }

    #[test]
    fn zero_distance_run_has_no_pace() {
        let row = activity_to_row(&activity("Run", 0.0, 600));
        assert_eq!(row[5], "");
    }

    #[test]
    fn missing_heart_rate_is_blank() {
        let mut a = activity("TrailRun", 5_000.0, 1800);
        a.average_heartrate = None;
        let row = activity_to_row(&a);
        assert_eq!(row[5], "6:00");
        assert_eq!(row[7], "");
    }

    #[test]
    fn rows_keep_input_order() {
        let mut first = activity("Run", 1000.0, 300);
        first.name = "first".to_string();
        let mut second = activity("Ride", 1000.0, 300);
        second.name = "second".to_string();

        let rows = activities_to_rows(&[first, second]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], "first");
        assert_eq!(rows[1][1], "second");
    }
}
