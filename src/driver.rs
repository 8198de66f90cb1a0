//! Spawns the workers of a workload and waits for all of them.
//!
//! The driver has no deadline of its own. With a bounded client timeout every
//! worker finishes in bounded time; with an unbounded one (the heavy profile)
//! a target that never answers keeps [`Driver::run`] pending forever. Callers
//! that need a way out use [`Driver::run_until`].

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{build_worker_client, ClientConfig};
use crate::config::{validate, ConfigError};
use crate::metrics::ACTIVE_WORKERS;
use crate::worker::{run_worker, WorkerConfig, WorkerReport};
use crate::workload::WorkloadConfig;

pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Errors that stop a run before any worker is spawned.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid workload: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Aggregate result of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The configured total, not a count of delivered requests.
    pub total_requests: u64,
    /// `requests_per_worker * worker_count`.
    pub issued_requests: u64,
    pub worker_count: usize,
    /// Wall-clock time from the first spawn until the last worker finished.
    pub elapsed: Duration,
    /// Longest time any single worker spent in its loop.
    pub slowest_worker: Duration,
    /// Reports of the workers that ran to completion.
    pub workers: Vec<WorkerReport>,
    /// True when the run was stopped through the shutdown hook.
    pub cancelled: bool,
}

impl RunSummary {
    /// The final console line.
    pub fn line(&self) -> String {
        if self.cancelled {
            format!(
                "Cancelled after {:?}; {} of {} workers finished",
                self.elapsed,
                self.workers.len(),
                self.worker_count
            )
        } else {
            format!(
                "Completed {} requests in {:?}",
                self.total_requests, self.elapsed
            )
        }
    }
}

/// Decrements the outstanding-worker count exactly once, when the worker's
/// future is dropped: on completion, panic, or abort.
struct BarrierGuard {
    outstanding: Arc<AtomicUsize>,
}

impl BarrierGuard {
    fn arm(outstanding: Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        ACTIVE_WORKERS.inc();
        Self { outstanding }
    }
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        ACTIVE_WORKERS.dec();
    }
}

/// Join barrier over the spawned workers.
pub struct JoinBarrier {
    tasks: JoinSet<WorkerReport>,
    outstanding: Arc<AtomicUsize>,
    finished: Vec<WorkerReport>,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            outstanding: Arc::new(AtomicUsize::new(0)),
            finished: Vec::new(),
        }
    }

    /// Spawns a worker and counts it as outstanding until its future is dropped.
    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = WorkerReport> + Send + 'static,
    {
        let guard = BarrierGuard::arm(self.outstanding.clone());
        self.tasks.spawn(async move {
            let _guard = guard;
            worker.await
        });
    }

    /// Workers spawned and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Blocks until every spawned worker has finished. Cancel safe.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
    }

    /// Aborts every worker still running and waits for them to unwind.
    pub async fn abort(&mut self) {
        self.tasks.abort_all();
        self.wait().await;
    }

    pub fn into_reports(self) -> Vec<WorkerReport> {
        self.finished
    }

    fn record(&mut self, joined: Result<WorkerReport, JoinError>) {
        match joined {
            Ok(report) => self.finished.push(report),
            Err(e) if e.is_cancelled() => debug!("Worker aborted"),
            Err(e) => error!(error = %e, "Worker panicked"),
        }
    }
}

impl Default for JoinBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates one run of a workload.
pub struct Driver {
    workload: WorkloadConfig,
    client_config: ClientConfig,
}

impl Driver {
    pub fn new(workload: WorkloadConfig) -> Self {
        let client_config = ClientConfig::for_workload(&workload);
        Self {
            workload,
            client_config,
        }
    }

    /// Overrides the client settings derived from the workload.
    pub fn with_client_config(mut self, client_config: ClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Runs every worker to completion. There is no way to stop early.
    pub async fn run(&self) -> Result<RunSummary, DriverError> {
        self.execute(None).await
    }

    /// Like [`Self::run`], but aborts all workers when `shutdown` fires.
    ///
    /// A dropped sender is not a signal; the run then continues to completion.
    pub async fn run_until(&self, shutdown: ShutdownReceiver) -> Result<RunSummary, DriverError> {
        self.execute(Some(shutdown)).await
    }

    async fn execute(
        &self,
        shutdown: Option<ShutdownReceiver>,
    ) -> Result<RunSummary, DriverError> {
        validate(&self.workload)?;

        let requests_per_worker = self.workload.requests_per_worker();
        let payload = self.workload.payload();

        // Every client is built before the clock starts, so a construction
        // failure cannot leave a partial set of workers running.
        let clients = (0..self.workload.worker_count)
            .map(|_| build_worker_client(&self.client_config))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            workers = self.workload.worker_count,
            requests_per_worker = requests_per_worker,
            issued_requests = self.workload.issued_requests(),
            total_requests = self.workload.total_requests,
            "Spawning workers"
        );

        let start_time = Instant::now();
        let mut barrier = JoinBarrier::new();

        for (task_id, client) in clients.into_iter().enumerate() {
            let worker_config = WorkerConfig {
                task_id,
                url: self.workload.target_url.clone(),
                method: self.workload.method,
                payload: payload.clone(),
                requests: requests_per_worker,
                request_delay: self.workload.request_delay,
            };
            barrier.spawn(run_worker(client, worker_config));
        }

        let cancelled = match shutdown {
            None => {
                barrier.wait().await;
                false
            }
            Some(mut shutdown) => {
                tokio::select! {
                    _ = barrier.wait() => false,
                    signal = shutdown.recv() => match signal {
                        Err(broadcast::error::RecvError::Closed) => {
                            barrier.wait().await;
                            false
                        }
                        _ => {
                            warn!(
                                outstanding = barrier.outstanding(),
                                "Shutdown requested, aborting workers"
                            );
                            barrier.abort().await;
                            true
                        }
                    },
                }
            }
        };

        let elapsed = start_time.elapsed();
        let workers = barrier.into_reports();
        let slowest_worker = workers
            .iter()
            .map(|w| w.elapsed)
            .max()
            .unwrap_or(Duration::ZERO);

        let summary = RunSummary {
            total_requests: self.workload.total_requests,
            issued_requests: self.workload.issued_requests(),
            worker_count: self.workload.worker_count,
            elapsed,
            slowest_worker,
            workers,
            cancelled,
        };

        info!(
            total_requests = summary.total_requests,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            slowest_worker_ms = summary.slowest_worker.as_millis() as u64,
            cancelled = summary.cancelled,
            "Run finished"
        );
        println!("{}", summary.line());

        Ok(summary)
    }
}
