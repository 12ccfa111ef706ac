// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user sync pipeline.
//!
//! Handles the core workflow:
//! 1. Load the user's sync configuration
//! 2. Skip if automation is disabled, then require a spreadsheet ID
//! 3. Build the Strava client (seeding tokens if still valid)
//! 4. Build the Sheets client (seeding tokens if still valid)
//! 5. Validate spreadsheet access
//! 6. Fetch activities from the sync window
//! 7. Write them to the spreadsheet (if any)
//! 8. Report the result
//!
//! Each step returns `Result<next, StepFailure>`; the first failure ends the
//! attempt. Nothing fetched before a failure is kept.

use crate::config::Config;
use crate::db::SyncConfigStore;
use crate::error::{ClientError, ErrorKind};
use crate::models::{Activity, ProcessingResult, UserSyncConfig};
use crate::services::queue::SyncJob;
use crate::services::sheets::{SheetsClient, SheetsService};
use crate::services::strava::{StravaClient, StravaService};
use anyhow::Context;
use chrono::Utc;
use futures_util::{stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Pipeline steps that can end an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    LoadConfig,
    CheckAutomation,
    CheckSpreadsheet,
    ValidateSheets,
    FetchActivities,
    WriteActivities,
    /// Outside any single step (timeout, cancellation).
    Job,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStep::LoadConfig => "load_config",
            SyncStep::CheckAutomation => "check_automation",
            SyncStep::CheckSpreadsheet => "check_spreadsheet",
            SyncStep::ValidateSheets => "validate_sheets",
            SyncStep::FetchActivities => "fetch_activities",
            SyncStep::WriteActivities => "write_activities",
            SyncStep::Job => "job",
        };
        f.write_str(s)
    }
}

/// Why a pipeline step ended the attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: SyncStep,
    pub kind: ErrorKind,
    pub message: String,
    pub rate_limited: bool,
}

impl StepFailure {
    fn new(step: SyncStep, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
            rate_limited: false,
        }
    }

    /// Map a classified client error onto the step's failure kind.
    ///
    /// Re-authorization wins over the step's own kind.
    fn from_client(step: SyncStep, step_kind: ErrorKind, err: ClientError) -> Self {
        let kind = if err.is_reauth() {
            ErrorKind::ReauthRequired
        } else {
            step_kind
        };
        Self {
            step,
            kind,
            rate_limited: err.is_rate_limited(),
            message: err.to_string(),
        }
    }
}

/// Clients for one job. Owned by the job, dropped with it.
struct JobClients {
    strava: StravaService,
    sheets: SheetsService,
}

/// Tunables for the sync worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub job_timeout: Duration,
    pub sync_window_days: i64,
    pub batch_concurrency: usize,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_timeout: config.job_timeout,
            sync_window_days: config.sync_window_days,
            batch_concurrency: config.worker_pool_size.max(1),
        }
    }
}

/// Runs the sync pipeline for individual users.
pub struct SyncWorker {
    store: Arc<dyn SyncConfigStore>,
    strava: StravaClient,
    sheets: SheetsClient,
    settings: WorkerSettings,
}

impl SyncWorker {
    /// Build a worker with a shared HTTP client using the configured timeout.
    pub fn new(config: &Config, store: Arc<dyn SyncConfigStore>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed building provider HTTP client")?;

        let strava = StravaClient::new(
            http.clone(),
            &config.endpoints,
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        );
        let sheets = SheetsClient::new(
            http,
            &config.endpoints,
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        );

        Ok(Self::with_clients(
            store,
            strava,
            sheets,
            WorkerSettings::from_config(config),
        ))
    }

    pub fn with_clients(
        store: Arc<dyn SyncConfigStore>,
        strava: StravaClient,
        sheets: SheetsClient,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            strava,
            sheets,
            settings,
        }
    }

    /// Sync one user with a fresh trace ID.
    pub async fn process_user(&self, cancel: &CancellationToken, user_id: &str) -> ProcessingResult {
        self.process_job(cancel, &SyncJob::new(user_id)).await
    }

    /// Sync many users, at most `batch_concurrency` at a time.
    ///
    /// Results come back in input order. One user's failure never affects
    /// another's.
    pub async fn process_users(
        &self,
        cancel: &CancellationToken,
        user_ids: &[String],
    ) -> Vec<ProcessingResult> {
        stream::iter(user_ids)
            .map(|user_id| self.process_user(cancel, user_id))
            .buffered(self.settings.batch_concurrency)
            .collect()
            .await
    }

    /// Sync the user named by a queued job.
    ///
    /// Always returns a result: failures, timeouts and cancellation are all
    /// reported through [`ProcessingResult`].
    pub async fn process_job(&self, cancel: &CancellationToken, job: &SyncJob) -> ProcessingResult {
        let span = tracing::info_span!(
            "sync_job",
            user_id = %job.user_id,
            trace_id = %job.trace_id
        );

        async {
            let started = Instant::now();
            let timeout = self.settings.job_timeout;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StepFailure::new(
                    SyncStep::Job,
                    ErrorKind::Cancelled,
                    "job cancelled",
                )),
                res = tokio::time::timeout(timeout, self.run_pipeline(&job.user_id)) => match res {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepFailure::new(
                        SyncStep::Job,
                        ErrorKind::Timeout,
                        format!("job exceeded {}s budget", timeout.as_secs()),
                    )),
                },
            };

            let trace_id = Some(job.trace_id.clone());
            let result = match outcome {
                Ok(count) => {
                    ProcessingResult::succeeded(&job.user_id, trace_id, count, started.elapsed())
                }
                Err(failure) => {
                    log_failure(&failure);
                    ProcessingResult::failed(
                        &job.user_id,
                        trace_id,
                        failure.kind,
                        failure.message,
                        failure.rate_limited,
                        started.elapsed(),
                    )
                }
            };

            log_result(&result);
            self.record_status(&result).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&self, user_id: &str) -> Result<u32, StepFailure> {
        let config = self.load_config(user_id).await?;
        check_automation(&config)?;
        check_spreadsheet(&config)?;

        let clients = self.build_clients(&config);
        validate_sheets(&clients, &config).await?;

        let activities = fetch_activities(&clients, &config, self.settings.sync_window_days).await?;
        if activities.is_empty() {
            tracing::info!(user_id, "No activities in sync window");
            return Ok(0);
        }

        write_activities(&clients, &config, &activities).await?;
        Ok(activities.len() as u32)
    }

    /// Step 1.
    async fn load_config(&self, user_id: &str) -> Result<UserSyncConfig, StepFailure> {
        let config = self
            .store
            .get_sync_config(user_id)
            .await
            .map_err(|e| {
                StepFailure::new(
                    SyncStep::LoadConfig,
                    ErrorKind::ConfigError,
                    format!("failed to load sync config: {}", e),
                )
            })?
            .ok_or_else(|| {
                StepFailure::new(
                    SyncStep::LoadConfig,
                    ErrorKind::ConfigError,
                    format!("no sync config for user {}", user_id),
                )
            })?;

        Ok(config)
    }

    /// Steps 3 and 4.
    fn build_clients(&self, config: &UserSyncConfig) -> JobClients {
        if !config.has_credentials() {
            tracing::warn!(
                user_id = %config.user_id,
                "Sync config is missing a refresh token"
            );
        }
        JobClients {
            strava: StravaService::new(self.strava.clone(), config),
            sheets: SheetsService::new(self.sheets.clone(), config),
        }
    }

    /// Best-effort status write; failures are logged and ignored.
    async fn record_status(&self, result: &ProcessingResult) {
        if result.is_skip() || result.error_kind == Some(ErrorKind::ConfigError) {
            return;
        }

        let previous_success = match self.store.get_sync_status(&result.user_id).await {
            Ok(status) => status.and_then(|s| s.last_success_at),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read previous sync status");
                None
            }
        };

        let status = result.to_status(Utc::now(), previous_success);
        if let Err(e) = self.store.record_sync_status(&result.user_id, &status).await {
            tracing::warn!(error = %e, "Failed to record sync status, continuing anyway");
        }
    }
}

/// Step 2.
fn check_automation(config: &UserSyncConfig) -> Result<(), StepFailure> {
    if config.automation_enabled {
        Ok(())
    } else {
        Err(StepFailure::new(
            SyncStep::CheckAutomation,
            ErrorKind::AutomationDisabled,
            "automation disabled for user",
        ))
    }
}

/// A disabled user is skipped before this runs, whatever their spreadsheet ID.
fn check_spreadsheet(config: &UserSyncConfig) -> Result<(), StepFailure> {
    if config.spreadsheet_id.trim().is_empty() {
        return Err(StepFailure::new(
            SyncStep::CheckSpreadsheet,
            ErrorKind::ConfigError,
            "sync config has no spreadsheet ID",
        ));
    }
    Ok(())
}

/// Step 5.
async fn validate_sheets(clients: &JobClients, config: &UserSyncConfig) -> Result<(), StepFailure> {
    clients
        .sheets
        .validate_access(&config.user_id, &config.spreadsheet_id)
        .await
        .map_err(|e| {
            StepFailure::from_client(SyncStep::ValidateSheets, ErrorKind::SheetsAccessError, e)
        })
}

/// Step 6.
async fn fetch_activities(
    clients: &JobClients,
    config: &UserSyncConfig,
    window_days: i64,
) -> Result<Vec<Activity>, StepFailure> {
    let since = UserSyncConfig::window_start(Utc::now(), window_days);
    clients
        .strava
        .fetch_activities_since(&config.user_id, since)
        .await
        .map_err(|e| StepFailure::from_client(SyncStep::FetchActivities, ErrorKind::FetchError, e))
}

/// Step 7.
async fn write_activities(
    clients: &JobClients,
    config: &UserSyncConfig,
    activities: &[Activity],
) -> Result<usize, StepFailure> {
    clients
        .sheets
        .write_activities(&config.user_id, &config.spreadsheet_id, activities)
        .await
        .map_err(|e| StepFailure::from_client(SyncStep::WriteActivities, ErrorKind::WriteError, e))
}

fn log_failure(failure: &StepFailure) {
    tracing::debug!(
        step = %failure.step,
        error_kind = %failure.kind,
        rate_limited = failure.rate_limited,
        error = %failure.message,
        "Sync step failed"
    );
}

/// Log a finished attempt once, at a level matching its outcome.
pub fn log_result(result: &ProcessingResult) {
    let duration_ms = result.processing_duration.as_millis() as u64;
    match result.error_kind {
        None => tracing::info!(
            activities = result.activities_count,
            duration_ms,
            "Sync completed"
        ),
        Some(ErrorKind::AutomationDisabled) => {
            tracing::info!(duration_ms, "Sync skipped: automation disabled")
        }
        Some(ErrorKind::ReauthRequired) => tracing::warn!(
            error_kind = %ErrorKind::ReauthRequired,
            error = result.error_message.as_deref().unwrap_or_default(),
            duration_ms,
            "Sync needs user re-authorization"
        ),
        Some(kind) => tracing::error!(
            error_kind = %kind,
            error = result.error_message.as_deref().unwrap_or_default(),
            rate_limited = result.rate_limited,
            duration_ms,
            "Sync failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiCategory, Service};

    #[test]
    fn reauth_overrides_step_kind() {
        let err = ClientError::ReauthRequired {
            service: Service::Strava,
            message: "invalid_grant".to_string(),
        };
        let failure = StepFailure::from_client(SyncStep::FetchActivities, ErrorKind::FetchError, err);
        assert_eq!(failure.kind, ErrorKind::ReauthRequired);
        assert!(!failure.rate_limited);
    }

    #[test]
    fn rate_limit_keeps_step_kind() {
        let err = ClientError::Api {
            service: Service::GoogleSheets,
            category: ApiCategory::RateLimited,
            status: Some(429),
            message: "quota".to_string(),
        };
        let failure = StepFailure::from_client(SyncStep::WriteActivities, ErrorKind::WriteError, err);
        assert_eq!(failure.kind, ErrorKind::WriteError);
        assert!(failure.rate_limited);
    }

    #[test]
    fn disabled_automation_is_a_skip() {
        let config = UserSyncConfig {
            user_id: "u1".to_string(),
            automation_enabled: false,
            ..Default::default()
        };
        let failure = check_automation(&config).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::AutomationDisabled);
        assert_eq!(failure.step, SyncStep::CheckAutomation);
    }
}
