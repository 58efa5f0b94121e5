//! Background job runner.
//!
//! A [`Controller`] drains jobs from a [`JobService`] through a bounded
//! queue feeding a fixed pool of worker tasks, so at most `workers` jobs
//! execute concurrently. The host starts it with [`Controller::run_all`] and
//! stops it through the shutdown signal, independently of the HTTP server's
//! own lifecycle.
//!
//! Job failures are logged and never stop the pool; on shutdown the queue
//! closes and workers finish their in-flight job before `run_all` returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A unit of background work handed to a worker.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub name: String,
}

/// Failure of a single job execution. Logged by the worker, never fatal.
#[derive(Debug, thiserror::Error)]
#[error("Job failed: {0}")]
pub struct JobError(pub String);

/// Source and executor of background jobs.
#[async_trait]
pub trait JobService: Send + Sync + 'static {
    /// Jobs currently due for execution. Called once per poll cycle.
    async fn pending(&self) -> Vec<Job>;

    /// Execute a single job.
    async fn execute(&self, job: &Job) -> Result<(), JobError>;
}

/// Bounded-concurrency job orchestrator.
pub struct Controller<S> {
    workers: usize,
    poll_interval: Duration,
    service: Arc<S>,
}

impl<S: JobService> Controller<S> {
    /// A controller running at most `workers` jobs concurrently against the
    /// given service.
    pub fn new(workers: usize, service: S) -> Self {
        Self {
            workers: workers.max(1),
            poll_interval: Duration::from_secs(30),
            service: Arc::new(service),
        }
    }

    /// Override the poll interval between job-source queries.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the shutdown signal fires.
    ///
    /// Polls the service for pending jobs and feeds them to the worker pool.
    /// The queue is bounded, so a slow pool applies backpressure to the poll
    /// loop rather than piling up jobs in memory. Returns once all workers
    /// have drained after shutdown.
    pub async fn run_all(&self, mut shutdown: watch::Receiver<bool>) {
        let (tx, rx) = async_channel::bounded::<Job>(self.workers);

        let workers: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                let rx = rx.clone();
                let service = Arc::clone(&self.service);
                tokio::spawn(worker_loop(id, rx, service))
            })
            .collect();
        drop(rx);

        tracing::info!(workers = self.workers, "Job runner started");

        'run: loop {
            for job in self.service.pending().await {
                tokio::select! {
                    sent = tx.send(job) => {
                        if sent.is_err() {
                            break 'run;
                        }
                    }
                    _ = shutdown.changed() => break 'run,
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => break 'run,
            }
        }

        // Closing the queue lets workers finish in-flight jobs and exit.
        tx.close();
        for worker in workers {
            let _ = worker.await;
        }
        tracing::info!("Job runner stopped");
    }
}

async fn worker_loop<S: JobService>(id: usize, rx: async_channel::Receiver<Job>, service: Arc<S>) {
    while let Ok(job) = rx.recv().await {
        tracing::debug!(worker = id, job = %job.name, "Executing job");
        if let Err(err) = service.execute(&job).await {
            tracing::warn!(worker = id, job = %job.name, error = %err, "Job failed");
        }
    }
    tracing::debug!(worker = id, "Job worker stopped");
}
