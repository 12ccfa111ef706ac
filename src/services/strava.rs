// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching recent activities.
//!
//! Handles:
//! - Activity listing since a timestamp (paginated)
//! - Token refresh when expired
//! - Error classification (auth, rate limit, decode, network)

use crate::config::ProviderEndpoints;
use crate::error::{ApiCategory, AuthCategory, ClientError, Service};
use crate::models::{Activity, UserSyncConfig};
use crate::services::token::{RefreshedToken, TokenCache};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Page size for the athlete activities endpoint (Strava maximum is 200).
pub const ACTIVITIES_PER_PAGE: u32 = 100;

/// Upper bound on pages fetched for one window.
const MAX_PAGES: u32 = 10;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(
        http: reqwest::Client,
        endpoints: &ProviderEndpoints,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            base_url: endpoints.strava_api_base.clone(),
            token_url: endpoints.strava_token_url.clone(),
            client_id,
            client_secret,
        }
    }

    /// List one page of the athlete's activities started after `after`.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64, // Unix timestamp
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>, ClientError> {
        let url = format!("{}/athlete/activities", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("after", after.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ClientError::network(Service::Strava, &e))?;

        check_response_json(response).await
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
            .map_err(|e| ClientError::network(Service::Strava, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::network(Service::Strava, &e))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Strava token refresh rejected");
            return Err(classify_strava_refresh_error(status.as_u16(), &body));
        }

        let parsed: TokenRefreshResponse = serde_json::from_str(&body).map_err(|e| {
            ClientError::decode(Service::Strava, format!("token response: {}", e))
        })?;

        let expires_at = DateTime::from_timestamp(parsed.expires_at, 0).ok_or_else(|| {
            ClientError::decode(
                Service::Strava,
                format!("token expiry out of range: {}", parsed.expires_at),
            )
        })?;

        Ok(RefreshedToken {
            access_token: parsed.access_token,
            expires_at,
            refresh_token: Some(parsed.refresh_token),
        })
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
        .map_err(|e| ClientError::network(Service::Strava, &e))?;

    if !status.is_success() {
        return Err(classify_strava_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| ClientError::decode(Service::Strava, format!("JSON parse error: {}", e)))
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

/// Strava error body (`{"message": ..., "errors": [...]}`).
#[derive(Debug, Default, Deserialize)]
struct StravaFault {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<StravaFaultDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct StravaFaultDetail {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    field: String,
    #[serde(default)]
    code: String,
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<StravaFault>(body) {
        Ok(fault) if !fault.message.is_empty() => format!("HTTP {}: {}", status, fault.message),
        _ => format!("HTTP {}: {}", status, body.trim()),
    }
}

/// Classify a failed Strava API response.
pub fn classify_strava_error(status: u16, body: &str) -> ClientError {
    let message = error_message(status, body);
    match status {
        401 => ClientError::Auth {
            service: Service::Strava,
            category: AuthCategory::AccessDenied,
            message,
        },
        403 => ClientError::Auth {
            service: Service::Strava,
            category: AuthCategory::Forbidden,
            message,
        },
        429 => {
            tracing::warn!("Strava rate limit hit (429)");
            ClientError::Api {
                service: Service::Strava,
                category: ApiCategory::RateLimited,
                status: Some(status),
                message,
            }
        }
        _ => ClientError::Api {
            service: Service::Strava,
            category: ApiCategory::HttpError,
            status: Some(status),
            message,
        },
    }
}

/// Classify a failed refresh-token exchange.
///
/// Strava reports a revoked or unknown refresh token as a 400/401 whose
/// structured errors point at the `refresh_token` field; `invalid_grant`
/// text is accepted as a fallback.
pub fn classify_strava_refresh_error(status: u16, body: &str) -> ClientError {
    if matches!(status, 400 | 401) && refresh_token_rejected(body) {
        return ClientError::reauth(Service::Strava, error_message(status, body));
    }
    classify_strava_error(status, body)
}

fn refresh_token_rejected(body: &str) -> bool {
    if let Ok(fault) = serde_json::from_str::<StravaFault>(body) {
        let structured = fault.errors.iter().any(|e| {
            (e.field == "refresh_token" || e.resource == "RefreshToken")
                && (e.code == "invalid" || e.code == "missing")
        });
        if structured {
            return true;
        }
    }
    body.to_ascii_lowercase().contains("invalid_grant")
}

/// Strava client bound to one user's tokens for the duration of a job.
pub struct StravaService {
    client: StravaClient,
    tokens: TokenCache,
}

impl StravaService {
    /// Seed the token cache from stored credentials.
    pub fn new(client: StravaClient, config: &UserSyncConfig) -> Self {
        Self {
            client,
            tokens: TokenCache::seeded(
                Service::Strava,
                &config.strava_access_token,
                config.strava_token_expiry,
                &config.strava_refresh_token,
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

    /// Fetch every activity started after `since`.
    ///
    /// Pages until Strava returns a short page. The reference window is a
    /// week, which nearly always fits in the first page.
    pub async fn fetch_activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Activity>, ClientError> {
        let after = since.timestamp();
        let mut activities = Vec::new();

        for page in 1..=MAX_PAGES {
            let access_token = self.get_valid_access_token().await?;
            let batch = self
                .client
                .list_activities(&access_token, after, page, ACTIVITIES_PER_PAGE)
                .await?;

            let fetched = batch.len();
            activities.extend(batch);

            if fetched < ACTIVITIES_PER_PAGE as usize {
                break;
            }
            if page == MAX_PAGES {
                tracing::warn!(user_id, pages = MAX_PAGES, "Stopped paging Strava activities");
            }
        }

        tracing::info!(user_id, after, count = activities.len(), "Fetched Strava activities");
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        let cases = [
            (401, "access_denied"),
            (403, "forbidden"),
        ];
        for (status, category) in cases {
            match classify_strava_error(status, "{}") {
                ClientError::Auth { category: c, .. } => assert_eq!(c.to_string(), category),
                other => panic!("unexpected {other:?}"),
            }
        }

        assert!(classify_strava_error(429, "").is_rate_limited());
        match classify_strava_error(500, "oops") {
            ClientError::Api {
                category, status, ..
            } => {
                assert_eq!(category, ApiCategory::HttpError);
                assert_eq!(status, Some(500));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_refresh_token_requires_reauth() {
        let body = r#"{"message":"Bad Request","errors":[{"resource":"RefreshToken","field":"refresh_token","code":"invalid"}]}"#;
        let err = classify_strava_refresh_error(400, body);
        assert!(err.is_reauth());
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn invalid_grant_text_requires_reauth() {
        let err = classify_strava_refresh_error(400, r#"{"error":"invalid_grant"}"#);
        assert!(err.is_reauth());
    }

    #[test]
    fn refresh_rate_limit_is_not_reauth() {
        let err = classify_strava_refresh_error(429, r#"{"message":"Rate Limit Exceeded"}"#);
        assert!(!err.is_reauth());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn bad_client_secret_is_not_reauth() {
        let body = r#"{"message":"Bad Request","errors":[{"resource":"Application","field":"client_secret","code":"invalid"}]}"#;
        let err = classify_strava_refresh_error(400, body);
        assert!(!err.is_reauth());
    }
}
