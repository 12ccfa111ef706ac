// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-client OAuth access token cache.
//!
//! Every provider client owns one [`TokenCache`] for the lifetime of a single
//! sync job. Before each outbound call the client asks the cache for an access
//! token; the cache hands back the current one if it is still valid for at
//! least [`TOKEN_REFRESH_MARGIN_SECS`], and otherwise exchanges the refresh
//! token for a new one.
//!
//! The check and the refresh happen under one async mutex, so concurrent
//! callers on the same client never trigger two refreshes and never see a
//! token mid-replacement. The bearer token is attached per request on a
//! shared `reqwest::Client`, so nothing else has to be rebuilt after a refresh.

use crate::error::{ClientError, Service};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Access token returned by a provider's refresh-token grant.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Providers that rotate refresh tokens return the new one here.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: String,
}

impl TokenState {
    fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if is_fresh(now, expires_at) => Some(token),
            _ => None,
        }
    }
}

fn is_fresh(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at
}

/// Owned access token holder for one provider client.
#[derive(Debug)]
pub struct TokenCache {
    service: Service,
    state: Mutex<TokenState>,
}

impl TokenCache {
    /// Build a cache from stored credentials.
    ///
    /// The stored access token is only kept if it is still valid past the
    /// refresh margin; otherwise the first use triggers a refresh.
    pub fn seeded(
        service: Service,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
        refresh_token: &str,
    ) -> Self {
        let now = Utc::now();
        let seed = match expires_at {
            Some(exp) if !access_token.is_empty() && is_fresh(now, exp) => {
                Some((access_token.to_string(), exp))
            }
            _ => None,
        };

        if seed.is_some() {
            tracing::debug!(%service, "Seeded cached access token");
        }

        let (access_token, expires_at) = match seed {
            Some((token, exp)) => (Some(token), Some(exp)),
            None => (None, None),
        };

        Self {
            service,
            state: Mutex::new(TokenState {
                access_token,
                expires_at,
                refresh_token: refresh_token.trim().to_string(),
            }),
        }
    }

    /// Return a valid access token, refreshing it first when needed.
    ///
    /// `refresh` receives the current refresh token and performs the
    /// provider's token exchange. Its error is returned unchanged, so it must
    /// already be classified.
    pub async fn access_token<F, Fut>(&self, refresh: F) -> Result<String, ClientError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<RefreshedToken, ClientError>>,
    {
        let mut state = self.state.lock().await;

        if let Some(token) = state.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }

        if state.refresh_token.is_empty() {
            return Err(ClientError::reauth(
                self.service,
                "no refresh token stored for this user",
            ));
        }

        tracing::info!(service = %self.service, "Access token expired or missing, refreshing");

        let refreshed = refresh(state.refresh_token.clone()).await?;

        state.access_token = Some(refreshed.access_token.clone());
        state.expires_at = Some(refreshed.expires_at);
        if let Some(rotated) = refreshed.refresh_token.filter(|t| !t.is_empty()) {
            state.refresh_token = rotated;
        }

        tracing::info!(
            service = %self.service,
            expires_at = %refreshed.expires_at,
            "Access token refreshed"
        );
        Ok(refreshed.access_token)
    }

    /// Current refresh token (after any rotation).
    pub async fn refresh_token(&self) -> String {
        self.state.lock().await.refresh_token.clone()
    }
}
