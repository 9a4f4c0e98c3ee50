//! Job executor: polls the store, routes to handlers, retries with backoff.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::store::JobStore;
use super::types::{Job, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often the background loop polls for ready jobs.
    pub poll_interval: Duration,
    /// Thread name for logging.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            name: "archerp-jobs".to_string(),
        }
    }
}

/// Handle to a spawned executor thread.
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl JobExecutorHandle {
    /// Request shutdown and wait for the loop to drain.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Synchronous job executor.
///
/// `run_pending` drains everything ready right now, which is all the
/// scheduler needs; `spawn` wraps the same drain in a polling thread for
/// long-running processes.
pub struct JobExecutor<S: JobStore> {
    store: Arc<S>,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a handler under a routing key (`JobKind::type_name`).
    pub fn register_handler<F>(&mut self, type_name: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(type_name.into(), Box::new(handler));
    }

    /// Claim and execute ready jobs until the store runs dry. Returns how
    /// many jobs were attempted.
    pub fn run_pending(&self, now: DateTime<Utc>) -> usize {
        let mut attempted = 0;
        loop {
            match self.store.claim_next(now) {
                Ok(Some(mut job)) => {
                    attempted += 1;
                    self.execute_claimed(&mut job, now);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to claim job");
                    break;
                }
            }
        }
        attempted
    }

    /// Run one already-claimed job: invoke the handler, record the outcome.
    fn execute_claimed(&self, job: &mut Job, started_at: DateTime<Utc>) {
        let Some(handler) = self.handlers.get(job.kind.type_name()) else {
            let error = format!("no handler for job kind `{}`", job.kind.type_name());
            warn!(job_id = %job.id, error, "unroutable job");
            job.mark_failed(error, started_at, Utc::now());
            self.finish(job);
            return;
        };

        match handler(job) {
            JobResult::Success => {
                debug!(job_id = %job.id, kind = job.kind.type_name(), "job completed");
                job.mark_completed(started_at, Utc::now());
                self.finish(job);
            }
            JobResult::Failure(error) => {
                warn!(job_id = %job.id, kind = job.kind.type_name(), error = %error, "job failed");
                job.mark_failed(error, started_at, Utc::now());
                self.finish(job);
            }
        }
    }

    fn finish(&self, job: &Job) {
        if let Err(err) = self.store.update(job) {
            warn!(job_id = %job.id, error = %err, "failed to persist job outcome");
            return;
        }
        if let JobStatus::DeadLettered { error, .. } = &job.status {
            if let Err(err) = self
                .store
                .dead_letter(job.clone(), error.clone(), Utc::now())
            {
                warn!(job_id = %job.id, error = %err, "failed to dead-letter job");
            }
        }
    }

    /// Spawn the polling loop in a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send + Sync,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!(executor = %name, "job executor started");
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    if self.run_pending(Utc::now()) == 0 {
                        thread::sleep(config.poll_interval);
                    }
                }
                info!(executor = %name, "job executor stopped");
            })
            .expect("failed to spawn job executor thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
