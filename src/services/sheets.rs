// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Sheets API client for validating access and writing activity rows.
//!
//! Handles:
//! - Google OAuth token refresh
//! - Read-only access validation (metadata + header range)
//! - Bulk range update with `USER_ENTERED` input
//! - Error classification, including re-authorization detection

use crate::config::ProviderEndpoints;
use crate::error::{ApiCategory, AuthCategory, ClientError, Service};
use crate::models::{Activity, UserSyncConfig};
use crate::services::rows::{activities_to_rows, write_range, HEADER_RANGE, ROW_WIDTH};
use crate::services::token::{RefreshedToken, TokenCache};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Substrings Google uses when a refresh token is no longer honored.
const REAUTH_MARKERS: &[&str] = &["invalid_grant", "expired or revoked", "invalid_rapt"];

/// Google Sheets API client.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: &ProviderEndpoints,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            base_url: endpoints.sheets_api_base.clone(),
            token_url: endpoints.google_token_url.clone(),
            client_id,
            client_secret,
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedToken, ClientError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| ClientError::network(Service::GoogleSheets, &e))?;

        let parsed: GoogleTokenResponse = check_response_json(response).await?;
        let expires_at = expiry_from_now(parsed.expires_in)?;

        Ok(RefreshedToken {
            access_token: parsed.access_token,
            expires_at,
            refresh_token: parsed.refresh_token,
        })
    }

    /// Read spreadsheet metadata (ID and title only).
    pub async fn get_metadata(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMetadata, ClientError> {
        let url = format!("{}/{}", self.base_url, spreadsheet_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("fields", "spreadsheetId,properties.title")])
            .send()
            .await
            .map_err(|e| ClientError::network(Service::GoogleSheets, &e))?;

        check_response_json(response).await
    }

    /// Read the values of an A1 range.
    pub async fn get_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, ClientError> {
        let url = format!(
            "{}/{}/values/{}",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(range)
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::network(Service::GoogleSheets, &e))?;

        check_response_json(response).await
    }

    /// Overwrite an A1 range with `rows`, letting Google interpret the strings.
    pub async fn update_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[[String; ROW_WIDTH]],
    ) -> Result<UpdateValuesResponse, ClientError> {
        let url = format!(
            "{}/{}/values/{}",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(range)
        );

        let body = UpdateValuesRequest {
            range,
            major_dimension: "ROWS",
            values: rows,
        };

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::network(Service::GoogleSheets, &e))?;

        check_response_json(response).await
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::network(Service::GoogleSheets, &e))?;

    if !status.is_success() {
        return Err(classify_google_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        ClientError::decode(Service::GoogleSheets, format!("JSON parse error: {}", e))
    })
}

/// Absolute expiry for a token that lives `expires_in` seconds from now.
fn expiry_from_now(expires_in: i64) -> Result<DateTime<Utc>, ClientError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            ClientError::decode(
                Service::GoogleSheets,
                format!("token expiry out of range: expires_in={}", expires_in),
            )
        })
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateValuesRequest<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a [[String; ROW_WIDTH]],
}

/// Spreadsheet metadata subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetMetadata {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub properties: SpreadsheetProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

/// Values of a range.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Response to a values update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: String,
    #[serde(default)]
    pub updated_rows: u32,
    #[serde(default)]
    pub updated_cells: u32,
}

/// Google error in either of its two shapes: OAuth token endpoint
/// (`{"error": "invalid_grant", ...}`) or API (`{"error": {"status": ...}}`).
#[derive(Debug, Default)]
struct GoogleFault {
    oauth_code: Option<String>,
    api_status: Option<String>,
    message: Option<String>,
}

fn parse_google_fault(body: &str) -> GoogleFault {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return GoogleFault::default();
    };

    match value.get("error") {
        Some(serde_json::Value::String(code)) => GoogleFault {
            oauth_code: Some(code.clone()),
            api_status: None,
            message: value
                .get("error_description")
                .and_then(|d| d.as_str())
                .map(str::to_string),
        },
        Some(serde_json::Value::Object(obj)) => GoogleFault {
            oauth_code: None,
            api_status: obj.get("status").and_then(|s| s.as_str()).map(str::to_string),
            message: obj.get("message").and_then(|m| m.as_str()).map(str::to_string),
        },
        _ => GoogleFault::default(),
    }
}

/// Classify a failed Google OAuth or Sheets response.
///
/// Structured error codes are checked first; the substring markers catch
/// re-authorization errors that arrive in any other shape.
pub fn classify_google_error(status: u16, body: &str) -> ClientError {
    let fault = parse_google_fault(body);
    let message = match &fault.message {
        Some(m) => format!("HTTP {}: {}", status, m),
        None => format!("HTTP {}: {}", status, body.trim()),
    };

    let structured_reauth = matches!(
        fault.oauth_code.as_deref(),
        Some("invalid_grant") | Some("invalid_rapt")
    );
    let lowered = body.to_ascii_lowercase();
    if structured_reauth || REAUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ClientError::reauth(Service::GoogleSheets, message);
    }

    let api = |category: ApiCategory, message: String| ClientError::Api {
        service: Service::GoogleSheets,
        category,
        status: Some(status),
        message,
    };

    match (status, fault.api_status.as_deref()) {
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => {
            tracing::warn!(status, "Google Sheets rate limit hit");
            api(ApiCategory::RateLimited, message)
        }
        (401, _) => ClientError::Auth {
            service: Service::GoogleSheets,
            category: AuthCategory::AccessDenied,
            message,
        },
        (403, _) => api(ApiCategory::PermissionDenied, message),
        (404, _) => api(ApiCategory::NotFound, message),
        (400, _) => api(ApiCategory::InvalidRequest, message),
        _ => api(ApiCategory::HttpError, message),
    }
}

/// Sheets client bound to one user's tokens for the duration of a job.
pub struct SheetsService {
    client: SheetsClient,
    tokens: TokenCache,
}

impl SheetsService {
    /// Seed the token cache from stored credentials.
    pub fn new(client: SheetsClient, config: &UserSyncConfig) -> Self {
        Self {
            client,
            tokens: TokenCache::seeded(
                Service::GoogleSheets,
                &config.sheets_access_token,
                config.sheets_token_expiry,
                &config.sheets_refresh_token,
            ),
        }
    }

    /// Get a valid access token, refreshing when inside the expiry margin.
    pub async fn get_valid_access_token(&self) -> Result<String, ClientError> {
        let client = &self.client;
        self.tokens
            .access_token(|refresh_token| async move { client.refresh_token(&refresh_token).await })
            .await
    }

    /// Confirm the spreadsheet is reachable without modifying it.
    pub async fn validate_access(
        &self,
        user_id: &str,
        spreadsheet_id: &str,
    ) -> Result<(), ClientError> {
        let access_token = self.get_valid_access_token().await?;
        let metadata = self.client.get_metadata(&access_token, spreadsheet_id).await?;

        let access_token = self.get_valid_access_token().await?;
        let header = self
            .client
            .get_values(&access_token, spreadsheet_id, HEADER_RANGE)
            .await?;

        tracing::debug!(
            user_id,
            spreadsheet_id = %metadata.spreadsheet_id,
            title = %metadata.properties.title,
            header_rows = header.values.len(),
            "Spreadsheet access validated"
        );
        Ok(())
    }

    /// Write activities to `Sheet1!A2:I{n+1}` in one update call.
    ///
    /// Returns the number of rows written. An empty slice writes nothing.
    pub async fn write_activities(
        &self,
        user_id: &str,
        spreadsheet_id: &str,
        activities: &[Activity],
    ) -> Result<usize, ClientError> {
        if activities.is_empty() {
            tracing::debug!(user_id, "No activities to write");
            return Ok(0);
        }

        let access_token = self.get_valid_access_token().await?;
        let rows = activities_to_rows(activities);
        let range = write_range(rows.len());

        let response = self
            .client
            .update_values(&access_token, spreadsheet_id, &range, &rows)
            .await?;

        tracing::info!(
            user_id,
            spreadsheet_id,
            range = %range,
            updated_rows = response.updated_rows,
            updated_cells = response.updated_cells,
            "Wrote activities to spreadsheet"
        );
        Ok(rows.len())
    }
}
