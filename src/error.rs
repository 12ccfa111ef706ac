// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for provider clients, sync results and the HTTP layer.
//!
//! Provider failures are classified exactly once, inside the client that
//! observed them, as a [`ClientError`]. The sync worker then maps each one to
//! the [`ErrorKind`] of the pipeline step it happened in. [`AppError`] covers
//! the task ingress routes and the persistence layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// External provider a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Service {
    Strava,
    GoogleSheets,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Strava => f.write_str("Strava"),
            Service::GoogleSheets => f.write_str("Google Sheets"),
        }
    }
}

/// Authorization failures on an otherwise valid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCategory {
    /// HTTP 401
    AccessDenied,
    /// HTTP 403
    Forbidden,
}

impl fmt::Display for AuthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCategory::AccessDenied => f.write_str("access_denied"),
            AuthCategory::Forbidden => f.write_str("forbidden"),
        }
    }
}

/// Provider API failures that are not about credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCategory {
    RateLimited,
    HttpError,
    DecodeError,
    PermissionDenied,
    NotFound,
    InvalidRequest,
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiCategory::RateLimited => "rate_limited",
            ApiCategory::HttpError => "http_error",
            ApiCategory::DecodeError => "decode_error",
            ApiCategory::PermissionDenied => "permission_denied",
            ApiCategory::NotFound => "not_found",
            ApiCategory::InvalidRequest => "invalid_request",
        };
        f.write_str(s)
    }
}

/// A classified provider error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The stored refresh token is missing, revoked or expired.
    #[error("{service} re-authorization required: {message}")]
    ReauthRequired { service: Service, message: String },

    #[error("{service} auth error ({category}): {message}")]
    Auth {
        service: Service,
        category: AuthCategory,
        message: String,
    },

    #[error("{service} API error ({category}): {message}")]
    Api {
        service: Service,
        category: ApiCategory,
        status: Option<u16>,
        message: String,
    },

    #[error("{service} network error: {message}")]
    Network { service: Service, message: String },
}

impl ClientError {
    /// Whether the user has to repeat the OAuth consent flow.
    pub fn is_reauth(&self) -> bool {
        matches!(self, ClientError::ReauthRequired { .. })
    }

    /// Whether an outer retry layer may reschedule the job later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ClientError::Api {
                category: ApiCategory::RateLimited,
                ..
            }
        )
    }

    pub fn service(&self) -> Service {
        match self {
            ClientError::ReauthRequired { service, .. }
            | ClientError::Auth { service, .. }
            | ClientError::Api { service, .. }
            | ClientError::Network { service, .. } => *service,
        }
    }

    pub(crate) fn reauth(service: Service, message: impl Into<String>) -> Self {
        ClientError::ReauthRequired {
            service,
            message: message.into(),
        }
    }

    pub(crate) fn network(service: Service, err: &reqwest::Error) -> Self {
        ClientError::Network {
            service,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(service: Service, message: impl Into<String>) -> Self {
        ClientError::Api {
            service,
            category: ApiCategory::DecodeError,
            status: None,
            message: message.into(),
        }
    }
}

/// Terminal classification of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
pub enum ErrorKind {
    /// Configuration lookup failed or the stored config is unusable.
    ConfigError,
    /// Automation is switched off for the user. A deliberate skip.
    AutomationDisabled,
    /// A refresh token was rejected; the user must reconnect.
    ReauthRequired,
    SheetsAccessError,
    FetchError,
    WriteError,
    /// The job exceeded its wall-clock budget.
    Timeout,
    /// The job was cancelled from outside (shutdown).
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "config_error",
            ErrorKind::AutomationDisabled => "automation_disabled",
            ErrorKind::ReauthRequired => "reauth_required",
            ErrorKind::SheetsAccessError => "sheets_access_error",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::WriteError => "write_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Queue(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "queue_unavailable",
                Some(msg.clone()),
            ),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reauth_and_rate_limit_predicates() {
        let reauth = ClientError::reauth(Service::Strava, "invalid_grant");
        assert!(reauth.is_reauth());
        assert!(!reauth.is_rate_limited());

        let limited = ClientError::Api {
            service: Service::GoogleSheets,
            category: ApiCategory::RateLimited,
            status: Some(429),
            message: "quota".to_string(),
        };
        assert!(limited.is_rate_limited());
        assert!(!limited.is_reauth());
        assert_eq!(limited.service(), Service::GoogleSheets);
    }

    #[test]
    fn client_error_display_names_service_and_category() {
        let err = ClientError::Auth {
            service: Service::Strava,
            category: AuthCategory::Forbidden,
            message: "scope missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Strava auth error (forbidden): scope missing"
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SheetsAccessError).unwrap();
        assert_eq!(json, "\"sheets_access_error\"");
        assert_eq!(ErrorKind::AutomationDisabled.as_str(), "automation_disabled");
    }

    #[test]
    fn queue_error_maps_to_service_unavailable() {
        let response = AppError::Queue("full".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
