// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Job dispatch loop.
//!
//! One loop dequeues jobs and hands them to a fixed pool of workers over a
//! bounded channel. Workers compete for jobs; there is no other shared state.

use crate::services::queue::{ChannelQueue, JobQueue, SyncJob};
use crate::services::worker::SyncWorker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Feeds queued jobs to a bounded worker pool.
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    worker: Arc<SyncWorker>,
    pool_size: usize,
    dequeue_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        worker: Arc<SyncWorker>,
        pool_size: usize,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            worker,
            pool_size: pool_size.max(1),
            dequeue_timeout,
        }
    }

    /// Run until `cancel` fires, then wait for in-flight jobs.
    ///
    /// Returns the number of jobs processed.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        let (tx, rx) = mpsc::channel::<SyncJob>(self.pool_size);
        let rx = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..self.pool_size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&self.worker),
                    cancel.clone(),
                    Arc::clone(&processed),
                ))
            })
            .collect();

        tracing::info!(pool_size = self.pool_size, "Dispatcher started");

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.queue.dequeue(self.dequeue_timeout) => job,
            };

            let Some(job) = job else {
                continue;
            };

            tracing::debug!(user_id = %job.user_id, trace_id = %job.trace_id, "Dequeued sync job");

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(job) => {
                    if sent.is_err() {
                        tracing::error!("All dispatch workers exited");
                        break;
                    }
                }
            }
        }

        drop(tx);
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatch worker task failed");
            }
        }

        let processed = processed.load(Ordering::Relaxed);
        tracing::info!(processed, "Dispatcher stopped");
        processed
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SyncJob>>>,
    worker: Arc<SyncWorker>,
    cancel: CancellationToken,
    processed: Arc<AtomicUsize>,
) {
    loop {
        // Hold the lock only while receiving.
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let user_id = job.user_id.clone();
        let trace_id = job.trace_id.clone();
        let run = tokio::spawn({
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            async move { worker.process_job(&cancel, &job).await }
        });

        // A panicking job fails alone; this slot keeps serving the queue.
        if let Err(e) = run.await {
            tracing::error!(
                worker_id,
                user_id = %user_id,
                trace_id = %trace_id,
                error = %e,
                success = false,
                "Sync job aborted"
            );
        }
        processed.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(worker_id, "Dispatch worker exiting");
}

/// Local development fallback when no queue is configured.
///
/// Enqueues a job for `user_id` every `interval` (the first immediately).
pub async fn run_dev_timer(
    queue: Arc<ChannelQueue>,
    user_id: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        user_id = %user_id,
        interval_secs = interval.as_secs(),
        "No sync queue configured, using dev timer"
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.enqueue(SyncJob::new(user_id.as_str())) {
                    tracing::warn!(error = %e, "Dev timer could not enqueue job");
                }
            }
        }
    }
}
