// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Worker configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings, so
//! everything, OAuth client secrets included, is read from the environment.

use std::env;
use std::time::Duration;

/// Expected `x-cloudtasks-queuename` when no queue name is configured.
pub const DEFAULT_SYNC_QUEUE_NAME: &str = "sheet-sync";

/// Provider endpoints. Overridable so local stubs can stand in for the real APIs.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub strava_api_base: String,
    pub strava_token_url: String,
    pub google_token_url: String,
    pub sheets_api_base: String,
    /// Google signing keys for Cloud Tasks OIDC tokens.
    pub google_jwks_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            strava_api_base: "https://www.strava.com/api/v3".to_string(),
            strava_token_url: "https://www.strava.com/oauth/token".to_string(),
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            sheets_api_base: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            google_jwks_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Point every provider at one base URL (a local stub server).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            strava_api_base: format!("{}/api/v3", base),
            strava_token_url: format!("{}/oauth/token", base),
            google_token_url: format!("{}/token", base),
            sheets_api_base: format!("{}/v4/spreadsheets", base),
            google_jwks_url: format!("{}/oauth2/v3/certs", base),
        }
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strava_api_base: env::var("STRAVA_API_BASE").unwrap_or(defaults.strava_api_base),
            strava_token_url: env::var("STRAVA_TOKEN_URL").unwrap_or(defaults.strava_token_url),
            google_token_url: env::var("GOOGLE_TOKEN_URL").unwrap_or(defaults.google_token_url),
            sheets_api_base: env::var("SHEETS_API_BASE").unwrap_or(defaults.sheets_api_base),
            google_jwks_url: env::var("GOOGLE_JWKS_URL").unwrap_or(defaults.google_jwks_url),
        }
    }
}

/// Where per-user sync configuration is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- OAuth clients ---
    pub strava_client_id: String,
    pub strava_client_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,

    // --- Deployment ---
    pub gcp_project_id: String,
    pub gcp_region: String,
    /// Public URL of this service (Cloud Tasks target and OIDC audience)
    pub api_url: String,
    pub port: u16,
    /// Cloud Tasks queue feeding this worker. `None` selects the dev timer.
    pub sync_queue_name: Option<String>,
    pub config_backend: ConfigBackend,

    // --- Dispatch ---
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    pub dequeue_timeout: Duration,
    pub http_timeout: Duration,
    pub sync_window_days: i64,

    // --- Local development fallback ---
    pub dev_sync_user_id: String,
    pub dev_sync_interval: Duration,

    pub endpoints: ProviderEndpoints,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_strava_client".to_string(),
            strava_client_secret: "test_strava_secret".to_string(),
            google_client_id: "test_google_client".to_string(),
            google_client_secret: "test_google_secret".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-central1".to_string(),
            api_url: "http://localhost:8080".to_string(),
            port: 8080,
            sync_queue_name: Some(DEFAULT_SYNC_QUEUE_NAME.to_string()),
            config_backend: ConfigBackend::Memory,
            worker_pool_size: 2,
            queue_capacity: 10,
            job_timeout: Duration::from_secs(30),
            dequeue_timeout: Duration::from_millis(50),
            http_timeout: Duration::from_secs(5),
            sync_window_days: 7,
            dev_sync_user_id: "test-user".to_string(),
            dev_sync_interval: Duration::from_secs(3600),
            endpoints: ProviderEndpoints::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config_backend = match env::var("CONFIG_BACKEND").as_deref() {
            Ok("memory") => ConfigBackend::Memory,
            Ok("firestore") | Err(_) => ConfigBackend::Firestore,
            Ok(other) => return Err(ConfigError::Invalid("CONFIG_BACKEND", other.to_string())),
        };

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,

            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-central1".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            port: parsed("PORT", 8080),
            sync_queue_name: env::var("SYNC_QUEUE_NAME")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            config_backend,

            worker_pool_size: parsed("WORKER_POOL_SIZE", 4usize).max(1),
            queue_capacity: parsed("QUEUE_CAPACITY", 100usize).max(1),
            job_timeout: parsed_secs("JOB_TIMEOUT_SECS", 300),
            dequeue_timeout: Duration::from_secs(parsed("DEQUEUE_TIMEOUT_SECS", 5)),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 30)),
            sync_window_days: parsed("SYNC_WINDOW_DAYS", 7),

            dev_sync_user_id: env::var("DEV_SYNC_USER_ID")
                .unwrap_or_else(|_| "test-user".to_string()),
            dev_sync_interval: parsed_secs("DEV_SYNC_INTERVAL_SECS", 3600),

            endpoints: ProviderEndpoints::from_env(),
        })
    }

    /// Service account Cloud Tasks signs its OIDC tokens as.
    pub fn tasks_service_account_email(&self) -> String {
        tasks_service_account_email(&self.gcp_project_id)
    }

    /// Audience of Cloud Tasks OIDC tokens: the service URL without a trailing slash.
    pub fn tasks_oidc_audience(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Queue name the `/tasks/*` ingress accepts in `x-cloudtasks-queuename`.
    pub fn expected_queue_name(&self) -> &str {
        self.sync_queue_name
            .as_deref()
            .unwrap_or(DEFAULT_SYNC_QUEUE_NAME)
    }
}

pub fn tasks_service_account_email(project_id: &str) -> String {
    format!("strava-sheets-sync@{}.iam.gserviceaccount.com", project_id)
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Duration in whole seconds, clamped to at least one.
fn parsed_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(parsed(name, default).max(1))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
