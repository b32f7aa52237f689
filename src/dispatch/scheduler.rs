//! Consumer half of the handoff
//!
//! Each queued callback runs as its own task so a slow callback never holds
//! up the ones behind it. The next job is not spawned until the previous one
//! has been polled once, which keeps start order equal to queue order on any
//! runtime flavor. Failures and panics, including panics raised while the
//! callback builds its future, are logged and counted, never propagated.

use std::future::{poll_fn, Future};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace};

use super::{Job, Shared};
use crate::events::KeyEvent;

/// What a scheduler run did, returned when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Callbacks started
    pub launched: u64,
    /// Callbacks that returned an error
    pub failed: u64,
    /// Callbacks that panicked
    pub panicked: u64,
    /// Queued callbacks never started (stale epoch or shutdown)
    pub discarded: u64,
}

/// Executes dispatched callbacks
pub struct Scheduler {
    rx: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
}

impl Scheduler {
    pub(super) fn new(rx: mpsc::Receiver<Job>, shared: Arc<Shared>) -> Self {
        Self { rx, shared }
    }

    /// Run until every [`Dispatcher`](super::Dispatcher) handle is dropped
    pub async fn run(self) -> SchedulerStats {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves or every dispatcher handle is dropped.
    ///
    /// On exit the queue is closed, callbacks still queued are discarded and
    /// callbacks already started are awaited to completion.
    pub async fn run_until<F>(mut self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        info!("scheduler started");

        let mut stats = SchedulerStats::default();
        let mut tasks: JoinSet<(KeyEvent, anyhow::Result<()>)> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("scheduler shutdown requested");
                    break;
                }

                job = self.rx.recv() => match job {
                    Some(job) => self.launch(&mut tasks, job, &mut stats).await,
                    None => {
                        debug!("all dispatchers dropped");
                        break;
                    }
                },

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    report(result, &mut stats);
                }
            }
        }

        // Anything submitted from here on is reported as dropped by the
        // dispatcher.
        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            trace!(event = %job.event, "discarding queued callback at shutdown");
            stats.discarded += 1;
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "waiting for in-flight callbacks");
        }
        while let Some(result) = tasks.join_next().await {
            report(result, &mut stats);
        }

        info!(
            launched = stats.launched,
            failed = stats.failed,
            panicked = stats.panicked,
            discarded = stats.discarded,
            "scheduler stopped"
        );
        stats
    }

    async fn launch(
        &self,
        tasks: &mut JoinSet<(KeyEvent, anyhow::Result<()>)>,
        job: Job,
        stats: &mut SchedulerStats,
    ) {
        let current = self.shared.epoch.load(Ordering::SeqCst);
        if job.epoch != current {
            trace!(event = %job.event, epoch = job.epoch, current, "discarding stale callback");
            stats.discarded += 1;
            return;
        }

        trace!(event = %job.event, "starting callback");
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let Job { event, callback, .. } = job;
        tasks.spawn(async move {
            let mut future = (callback)();
            let mut started = Some(started_tx);
            let result = poll_fn(|cx| {
                let poll = future.as_mut().poll(cx);
                if let Some(started) = started.take() {
                    let _ = started.send(());
                }
                poll
            })
            .await;
            (event, result)
        });
        stats.launched += 1;

        // Err means the callback panicked before its first poll returned
        let _ = started_rx.await;
    }
}

fn report(result: Result<(KeyEvent, anyhow::Result<()>), JoinError>, stats: &mut SchedulerStats) {
    match result {
        Ok((event, Ok(()))) => {
            trace!(%event, "callback finished");
        }
        Ok((event, Err(e))) => {
            stats.failed += 1;
            error!(%event, error = ?e, "callback failed");
        }
        Err(e) if e.is_panic() => {
            stats.panicked += 1;
            error!(error = %e, "callback panicked");
        }
        Err(e) => {
            debug!(error = %e, "callback task cancelled");
        }
    }
}
