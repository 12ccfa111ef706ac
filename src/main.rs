// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava-Sheets-Sync Worker
//!
//! Receives per-user sync jobs from Cloud Tasks and writes each user's recent
//! Strava activities to their Google Sheet.

use anyhow::Context;
use std::sync::Arc;
use strava_sheets_sync::{
    config::{Config, ConfigBackend},
    db::{FirestoreDb, MemoryConfigStore, SyncConfigStore},
    services::{
        run_dev_timer, ChannelQueue, Dispatcher, GoogleOidcVerifier, SyncWorker, TasksService,
    },
    AppState,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        pool_size = config.worker_pool_size,
        queue = config.sync_queue_name.as_deref().unwrap_or("<none>"),
        "Starting Strava-Sheets-Sync worker"
    );

    let store: Arc<dyn SyncConfigStore> = match config.config_backend {
        ConfigBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .context("Failed to connect to Firestore")?,
        ),
        ConfigBackend::Memory => {
            tracing::warn!("Using in-memory sync config store");
            Arc::new(MemoryConfigStore::new())
        }
    };

    let queue = Arc::new(ChannelQueue::new(config.queue_capacity));
    let worker = Arc::new(SyncWorker::new(&config, Arc::clone(&store))?);
    let cancel = CancellationToken::new();

    let dispatcher = Dispatcher::new(
        queue.clone(),
        worker,
        config.worker_pool_size,
        config.dequeue_timeout,
    );
    let dispatch_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    let timer_handle = if config.sync_queue_name.is_none() {
        Some(tokio::spawn(run_dev_timer(
            queue.clone(),
            config.dev_sync_user_id.clone(),
            config.dev_sync_interval,
            cancel.clone(),
        )))
    } else {
        None
    };

    let tasks_service = TasksService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        config.expected_queue_name(),
    );

    let google_oidc_verifier = Arc::new(
        GoogleOidcVerifier::new(&config).context("Failed to initialize OIDC verifier")?,
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        queue,
        tasks_service,
        google_oidc_verifier,
    });

    // Build router
    let app = strava_sheets_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = timer_handle {
        handle.await?;
    }
    let processed = dispatch_handle.await?;
    tracing::info!(processed, "Worker shut down");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM (Cloud Run), cancelling background work.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested");
    cancel.cancel();
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strava_sheets_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
