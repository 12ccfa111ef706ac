// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod dispatch;
pub mod google_oidc;
pub mod queue;
pub mod rows;
pub mod sheets;
pub mod strava;
pub mod tasks;
pub mod token;
pub mod worker;

pub use dispatch::{run_dev_timer, Dispatcher};
pub use google_oidc::{GoogleOidcVerifier, OidcError, VerifiedTaskPrincipal};
pub use queue::{ChannelQueue, JobQueue, SyncJob};
pub use sheets::{SheetsClient, SheetsService};
pub use strava::{StravaClient, StravaService};
pub use tasks::{EnqueueResult, TasksService};
pub use token::TokenCache;
pub use worker::{SyncWorker, WorkerSettings};
