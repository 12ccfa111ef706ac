// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava-Sheets-Sync: keep a Google Sheet up to date with recent Strava activities
//!
//! This crate provides the sync worker: per-user pipelines that refresh OAuth
//! tokens, fetch the last week of Strava activities and write them as rows to
//! the user's spreadsheet, fed by a Cloud Tasks queue.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SyncConfigStore;
use services::{ChannelQueue, GoogleOidcVerifier, TasksService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SyncConfigStore>,
    pub queue: Arc<ChannelQueue>,
    pub tasks_service: TasksService,
    pub google_oidc_verifier: Arc<GoogleOidcVerifier>,
}
