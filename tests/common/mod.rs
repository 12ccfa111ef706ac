// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use strava_sheets_sync::config::{Config, ProviderEndpoints};
use strava_sheets_sync::db::MemoryConfigStore;
use strava_sheets_sync::models::UserSyncConfig;
use strava_sheets_sync::routes::create_router;
use strava_sheets_sync::services::{ChannelQueue, GoogleOidcVerifier, SyncWorker, TasksService};
use strava_sheets_sync::AppState;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SPREADSHEET_ID: &str = "sheet-123";

/// RSA key pair standing in for Google's Cloud Tasks signing key.
#[allow(dead_code)]
pub const TASKS_OIDC_KID: &str = "test-key-1";
#[allow(dead_code)]
pub const TASKS_OIDC_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_key.pem");
#[allow(dead_code)]
pub const TASKS_OIDC_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_key.pub.pem");
/// The same public key as a JWKS document.
#[allow(dead_code)]
pub const TASKS_OIDC_JWKS: &str = include_str!("../fixtures/tasks_oidc_jwks.json");

#[allow(dead_code)]
pub const SHEETS_METADATA_PATH: &str = "/v4/spreadsheets/sheet-123";
#[allow(dead_code)]
pub const SHEETS_HEADER_PATH: &str = "/v4/spreadsheets/sheet-123/values/Sheet1%21A1%3AI1";

/// Config with every provider pointed at the stub server.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::test_default();
    config.endpoints = ProviderEndpoints::with_base(&server.uri());
    config
}

/// Base URL of a local port with nothing listening on it.
#[allow(dead_code)]
pub fn closed_port_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Worker over an in-memory store, talking to the stub server.
#[allow(dead_code)]
pub fn test_worker(server: &MockServer, store: Arc<MemoryConfigStore>) -> SyncWorker {
    SyncWorker::new(&test_config(server), store).expect("worker should build")
}

/// Enabled user whose stored access tokens are both still valid.
#[allow(dead_code)]
pub fn user_config(user_id: &str) -> UserSyncConfig {
    let expiry = Some(Utc::now() + Duration::hours(2));
    UserSyncConfig {
        user_id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        timezone: "America/Los_Angeles".to_string(),
        spreadsheet_id: SPREADSHEET_ID.to_string(),
        automation_enabled: true,
        strava_refresh_token: "strava-refresh".to_string(),
        strava_access_token: "strava-access".to_string(),
        strava_token_expiry: expiry,
        sheets_refresh_token: "sheets-refresh".to_string(),
        sheets_access_token: "sheets-access".to_string(),
        sheets_token_expiry: expiry,
    }
}

/// Same user with an expired Strava access token.
#[allow(dead_code)]
pub fn user_config_expired_strava(user_id: &str) -> UserSyncConfig {
    UserSyncConfig {
        strava_token_expiry: Some(Utc::now() - Duration::minutes(1)),
        ..user_config(user_id)
    }
}

/// Same user with an expired Sheets access token.
#[allow(dead_code)]
pub fn user_config_expired_sheets(user_id: &str) -> UserSyncConfig {
    UserSyncConfig {
        sheets_token_expiry: Some(Utc::now() - Duration::minutes(1)),
        ..user_config(user_id)
    }
}

/// Strava `SummaryActivity` JSON.
#[allow(dead_code)]
pub fn activity_json(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "type": "Run",
        "sport_type": "Run",
        "distance": 10000.0,
        "moving_time": 3000,
        "elapsed_time": 3100,
        "total_elevation_gain": 55.0,
        "start_date": "2026-05-04T19:30:00Z",
        "start_date_local": "2026-05-04T12:30:00Z",
        "average_heartrate": 150.2,
        "max_heartrate": 172.0,
        "average_speed": 3.33,
        "max_speed": 4.1,
        "kudos_count": 3,
        "comment_count": 1
    })
}

// ─── Provider stubs ──────────────────────────────────────────

#[allow(dead_code)]
pub async fn mock_strava_refresh(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "strava-fresh",
            "refresh_token": "strava-refresh-rotated",
            "expires_at": (Utc::now() + Duration::hours(6)).timestamp(),
            "expires_in": 21600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mock_strava_refresh_invalid_grant(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Bad Request",
            "errors": [{"resource": "RefreshToken", "field": "refresh_token", "code": "invalid"}]
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Activities endpoint, requiring the given bearer token.
#[allow(dead_code)]
pub async fn mock_strava_activities(
    server: &MockServer,
    bearer: &str,
    activities: Vec<Value>,
    expected_calls: u64,
) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(header("authorization", format!("Bearer {}", bearer).as_str()))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(activities)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mock_google_refresh(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sheets-fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mock_google_refresh_invalid_grant(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Metadata and header reads used by access validation.
#[allow(dead_code)]
pub async fn mock_sheets_validation(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(SHEETS_METADATA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": SPREADSHEET_ID,
            "properties": {"title": "Training Log"}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(SHEETS_HEADER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Sheet1!A1:I1",
            "majorDimension": "ROWS",
            "values": [["Date", "Name", "Type", "Distance", "Time", "Pace", "Elevation", "HR", "Kudos"]]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Update call for `range` (already percent-encoded for the path).
#[allow(dead_code)]
pub async fn mock_sheets_update(server: &MockServer, encoded_range: &str, expected_calls: u64) {
    Mock::given(method("PUT"))
        .and(path(format!("/v4/spreadsheets/{}/values/{}", SPREADSHEET_ID, encoded_range).as_str()))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": SPREADSHEET_ID,
            "updatedRange": "Sheet1!A2:I4",
            "updatedRows": 3,
            "updatedColumns": 9,
            "updatedCells": 27
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Any update call at all.
#[allow(dead_code)]
pub async fn mock_sheets_update_any(server: &MockServer, expected_calls: u64) {
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ─── HTTP app ────────────────────────────────────────────────

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryConfigStore>) {
    let config = Config::test_default();
    let store = Arc::new(MemoryConfigStore::new());
    let queue = Arc::new(ChannelQueue::new(config.queue_capacity));
    let tasks_service = TasksService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        config.expected_queue_name(),
    );
    let google_oidc_verifier = Arc::new(
        GoogleOidcVerifier::new_with_static_key(
            &config,
            TASKS_OIDC_KID,
            DecodingKey::from_rsa_pem(TASKS_OIDC_PUBLIC_KEY).expect("test public key"),
        )
        .expect("static verifier"),
    );

    let state = Arc::new(AppState {
        config,
        store: store.clone(),
        queue,
        tasks_service,
        google_oidc_verifier,
    });

    (create_router(state.clone()), state, store)
}

/// Sign Cloud Tasks-style OIDC claims with the test key.
#[allow(dead_code)]
pub fn sign_tasks_oidc_jwt(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TASKS_OIDC_KID.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(TASKS_OIDC_PRIVATE_KEY).expect("test private key"),
    )
    .expect("sign test token")
}

/// Claims Cloud Tasks would put in a token for this deployment.
#[allow(dead_code)]
pub fn tasks_oidc_claims(config: &Config) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": "https://accounts.google.com",
        "aud": config.tasks_oidc_audience(),
        "sub": "109876543210",
        "email": config.tasks_service_account_email(),
        "email_verified": true,
        "iat": now,
        "exp": now + 3600,
    })
}

/// A valid Cloud Tasks OIDC token for `config`.
#[allow(dead_code)]
pub fn create_test_tasks_oidc_jwt(config: &Config) -> String {
    sign_tasks_oidc_jwt(&tasks_oidc_claims(config))
}
