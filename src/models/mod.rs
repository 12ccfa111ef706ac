// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the sync worker.

pub mod activity;
pub mod result;
pub mod user;

pub use activity::Activity;
pub use result::ProcessingResult;
pub use user::{SyncStatus, UserSyncConfig};
