//! # Publish Orchestrator
//!
//! Runs one background task per active publish job. The task submits a
//! snapshot of the book to the builder, then polls the build's status until
//! it reaches a terminal state, the wall-clock budget runs out, or too many
//! consecutive polls fail.
//!
//! Callers never wait on the builder: `submit` returns a receipt as soon as
//! the job is admitted and `status` reads the registry's committed record.
//!
//! Nothing that goes wrong while a job is being driven ends its task early.
//! Builder errors count toward the failure cap, storage errors on bookkeeping
//! writes are logged and skipped, and a terminal outcome that cannot be
//! stored is retried with backoff until it is.
//! Every state change goes through the [`JobRegistry`], so a cancel racing
//! with a poll result is resolved by whichever transition commits first.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::backoff::BackoffCalculator;
use super::builder::{BuildStatus, BuilderClient};
use crate::config::PublishConfig;
use crate::error::{Result, ScribeError};
use crate::models::{BookId, JobId, JobReceipt, PublishFormat, PublishJob};
use crate::registry::{Admission, JobRegistry};
use crate::state_machine::{JobEvent, JobState};
use crate::tree::{ChapterForest, TreeStore};

/// Stop signal shared between the orchestrator and one job task.
#[derive(Debug, Default)]
struct PollControl {
    stopped: AtomicBool,
    notify: Notify,
}

impl PollControl {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct JobTask {
    book_id: BookId,
    control: Arc<PollControl>,
}

enum Phase {
    Submit(ChapterForest),
    Poll(String),
}

struct Inner {
    registry: Arc<JobRegistry>,
    tree_store: Arc<TreeStore>,
    builder: Arc<dyn BuilderClient>,
    config: PublishConfig,
    backoff: BackoffCalculator,
    tasks: DashMap<JobId, JobTask>,
    join_set: parking_lot::Mutex<JoinSet<()>>,
}

/// Asynchronous publish job driver.
#[derive(Clone)]
pub struct PublishOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PublishOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOrchestrator")
            .field("active_tasks", &self.inner.tasks.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl PublishOrchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        tree_store: Arc<TreeStore>,
        builder: Arc<dyn BuilderClient>,
        config: PublishConfig,
    ) -> Self {
        let backoff = BackoffCalculator::from_config(&config);
        Self {
            inner: Arc::new(Inner {
                registry,
                tree_store,
                builder,
                config,
                backoff,
                tasks: DashMap::new(),
                join_set: parking_lot::Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Request a build of `book_id` in `format`.
    ///
    /// Returns immediately. While a non-terminal job exists for the pair its
    /// receipt is returned instead of starting a second build.
    #[instrument(skip(self), fields(book_id = %book_id, format = %format))]
    pub async fn submit(&self, book_id: BookId, format: PublishFormat) -> Result<JobReceipt> {
        let snapshot = self.inner.tree_store.snapshot(book_id).await?;
        let registry = &self.inner.registry;

        let mut admission = registry.admit(book_id, format).await?;
        if let Admission::Existing(job) = &admission {
            if job.state == JobState::Submitting && !self.inner.tasks.contains_key(&job.id) {
                // Nothing in this process is waiting on that submit call
                let event = JobEvent::fail_with_error(
                    "submission interrupted before the builder acknowledged it",
                );
                match registry.transition(job.id, event).await {
                    Ok(_) | Err(ScribeError::InvalidTransition { .. }) => {}
                    Err(e) => return Err(e),
                }
                admission = registry.admit(book_id, format).await?;
            }
        }

        let job = match admission {
            Admission::Created(job) => {
                info!(job_id = %job.id, "Publish job admitted");
                self.launch(&job, Phase::Submit(snapshot));
                job
            }
            Admission::Existing(job) => {
                debug!(job_id = %job.id, state = %job.state, "Returning existing publish job");
                self.resume(&job, snapshot);
                job
            }
        };

        Ok(job.receipt())
    }

    /// Latest committed record of a job, including jobs finished or created
    /// by an earlier process. Never waits on the builder.
    pub async fn status(&self, job_id: JobId) -> Result<PublishJob> {
        self.inner.registry.load(job_id).await
    }

    /// Every job of a book, oldest first.
    pub async fn jobs_for_book(&self, book_id: BookId) -> Result<Vec<PublishJob>> {
        self.inner.registry.list_for_book(book_id).await
    }

    /// Cancel a non-terminal job. The builder is asked to cancel too, but its
    /// answer does not change the outcome.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: JobId) -> Result<PublishJob> {
        let job = self.inner.registry.transition(job_id, JobEvent::Cancel).await?;

        self.stop_polling(job_id);
        if let Some(handle) = &job.external_handle {
            self.inner.cancel_remote(job_id, handle).await;
        }

        info!(job_id = %job_id, "Publish job canceled");
        Ok(job)
    }

    /// Stop driving a job without changing its state. Returns whether a task
    /// was running for it.
    pub fn stop_polling(&self, job_id: JobId) -> bool {
        let control = self
            .inner
            .tasks
            .get(&job_id)
            .map(|task| Arc::clone(&task.control));

        match control {
            Some(control) => {
                control.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every task of a book, leaving job states as they are. Used when a
    /// book goes away underneath its jobs.
    pub fn detach_book(&self, book_id: BookId) -> usize {
        let controls: Vec<Arc<PollControl>> = self
            .inner
            .tasks
            .iter()
            .filter(|task| task.book_id == book_id)
            .map(|task| Arc::clone(&task.control))
            .collect();

        for control in &controls {
            control.stop();
        }
        if !controls.is_empty() {
            info!(book_id = %book_id, tasks = controls.len(), "Detached publish tasks from book");
        }
        controls.len()
    }

    /// Number of jobs currently driven by a background task.
    pub fn active_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Stop all tasks and wait for them to exit. Job states are left as they
    /// are; a later `submit` resumes non-terminal jobs.
    pub async fn shutdown(&self) {
        let controls: Vec<Arc<PollControl>> = self
            .inner
            .tasks
            .iter()
            .map(|task| Arc::clone(&task.control))
            .collect();
        for control in &controls {
            control.stop();
        }

        let mut join_set = std::mem::take(&mut *self.inner.join_set.lock());
        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Publish task ended abnormally during shutdown");
            }
        }
        info!(stopped = controls.len(), "Publish orchestrator shut down");
    }

    fn resume(&self, job: &PublishJob, snapshot: ChapterForest) {
        match (job.state, job.external_handle.clone()) {
            (JobState::Queued, _) => self.launch(job, Phase::Submit(snapshot)),
            (JobState::Running, Some(handle)) => self.launch(job, Phase::Poll(handle)),
            (JobState::Running, None) => {
                warn!(job_id = %job.id, "Running job has no builder handle; cannot resume polling");
            }
            _ => {}
        }
    }

    /// Start the background task for a job unless one is already running.
    fn launch(&self, job: &PublishJob, phase: Phase) {
        let control = match self.inner.tasks.entry(job.id) {
            Entry::Occupied(_) => return,
            Entry::Vacant(entry) => {
                let control = Arc::new(PollControl::default());
                entry.insert(JobTask {
                    book_id: job.book_id,
                    control: Arc::clone(&control),
                });
                control
            }
        };

        let inner = Arc::clone(&self.inner);
        let job_id = job.id;
        let mut join_set = self.inner.join_set.lock();
        while join_set.try_join_next().is_some() {}
        join_set.spawn(async move {
            inner.run_job(job_id, phase, &control).await;
            inner
                .tasks
                .remove_if(&job_id, |_, task| Arc::ptr_eq(&task.control, &control));
        });
    }
}

impl Inner {
    async fn run_job(&self, job_id: JobId, phase: Phase, control: &PollControl) {
        match self.drive(job_id, phase, control).await {
            Ok(()) => {}
            Err(ScribeError::InvalidTransition { from, event }) => {
                debug!(
                    job_id = %job_id,
                    from = %from,
                    event = %event,
                    "Job settled by another writer"
                );
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Publish task aborted");
            }
        }
    }

    async fn drive(&self, job_id: JobId, phase: Phase, control: &PollControl) -> Result<()> {
        if control.is_stopped() {
            return Ok(());
        }
        let handle = match phase {
            Phase::Submit(snapshot) => match self.submit_phase(job_id, &snapshot, control).await? {
                Some(handle) => handle,
                None => return Ok(()),
            },
            Phase::Poll(handle) => handle,
        };
        self.poll_phase(job_id, &handle, control).await
    }

    /// Returns the builder handle once the job is `running`, or `None` when
    /// the job ended during submission.
    async fn submit_phase(
        &self,
        job_id: JobId,
        snapshot: &ChapterForest,
        control: &PollControl,
    ) -> Result<Option<String>> {
        let job = self.registry.transition(job_id, JobEvent::BeginSubmit).await?;
        self.count_attempt(job_id, false).await?;

        let submitted = tokio::time::timeout(
            self.config.submit_timeout(),
            self.builder.submit(job.book_id, job.format, snapshot),
        )
        .await;

        match submitted {
            Ok(Ok(handle)) => {
                let event = JobEvent::Submitted {
                    external_handle: handle.clone(),
                };
                match self.persist(job_id, event, control).await {
                    Ok(true) => {
                        info!(job_id = %job_id, handle = %handle, "Builder accepted publish job");
                        Ok(Some(handle))
                    }
                    Ok(false) => Ok(None),
                    Err(e @ ScribeError::InvalidTransition { .. }) => {
                        // Canceled while the submit was in flight
                        self.cancel_remote(job_id, &handle).await;
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            }
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Builder rejected publish job");
                let event = JobEvent::fail_with_error(ScribeError::from(e));
                self.settle(job_id, event, control).await?;
                Ok(None)
            }
            Err(_) => {
                let error = ScribeError::Timeout(format!(
                    "builder did not acknowledge the submission within {}s",
                    self.config.submit_timeout_seconds
                ));
                warn!(job_id = %job_id, error = %error, "Publish submission timed out");
                self.settle(job_id, JobEvent::fail_with_error(error), control).await?;
                Ok(None)
            }
        }
    }

    async fn poll_phase(&self, job_id: JobId, handle: &str, control: &PollControl) -> Result<()> {
        let deadline = Instant::now() + self.config.running_timeout();
        let mut failures = self
            .registry
            .get(job_id)
            .map(|job| job.consecutive_poll_failures)
            .unwrap_or(0);
        let mut delay = self.backoff.delay_after_failures(failures);

        loop {
            let wake_at = std::cmp::min(Instant::now() + delay, deadline);
            tokio::select! {
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = control.notify.notified() => {}
            }
            if control.is_stopped() {
                debug!(job_id = %job_id, "Polling stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return self.time_out(job_id, control).await;
            }

            let polled = tokio::select! {
                polled = tokio::time::timeout_at(deadline, self.builder.status(handle)) => polled,
                _ = control.notify.notified() => {
                    debug!(job_id = %job_id, "Polling stopped during status call");
                    return Ok(());
                }
            };

            match polled {
                Err(_) => return self.time_out(job_id, control).await,
                Ok(Ok(status)) => {
                    failures = 0;
                    delay = self.backoff.base();
                    self.count_attempt(job_id, false).await?;
                    debug!(job_id = %job_id, status = ?status, "Polled build status");

                    let outcome = match status {
                        BuildStatus::Pending | BuildStatus::Running => continue,
                        BuildStatus::Succeeded { artifact_url } => JobEvent::Succeed {
                            result_url: artifact_url,
                        },
                        BuildStatus::Failed { reason } => JobEvent::fail_with_error(reason),
                    };
                    return self.settle(job_id, outcome, control).await;
                }
                Ok(Err(e)) => {
                    failures += 1;
                    self.count_attempt(job_id, true).await?;

                    if failures >= self.config.max_consecutive_poll_failures {
                        let error = ScribeError::BuilderUnavailable(format!(
                            "status unavailable after {failures} consecutive attempts: {e}"
                        ));
                        return self
                            .settle(job_id, JobEvent::fail_with_error(error), control)
                            .await;
                    }

                    delay = self.backoff.delay_after_failures(failures);
                    warn!(
                        job_id = %job_id,
                        error = %e,
                        consecutive_failures = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Build status poll failed"
                    );
                }
            }
        }
    }

    async fn time_out(&self, job_id: JobId, control: &PollControl) -> Result<()> {
        let error = ScribeError::Timeout(format!(
            "build did not finish within {}s",
            self.config.running_timeout_seconds
        ));
        warn!(job_id = %job_id, "Publish job exceeded its running budget");
        self.settle(job_id, JobEvent::fail_with_error(error), control).await
    }

    /// Record one builder call. A storage failure here only loses the
    /// counter update; a job settled by another writer ends the task.
    async fn count_attempt(&self, job_id: JobId, failed: bool) -> Result<()> {
        match self.registry.record_attempt(job_id, failed).await {
            Ok(_) => Ok(()),
            Err(e @ (ScribeError::InvalidTransition { .. } | ScribeError::NotFound { .. })) => {
                Err(e)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Could not record builder attempt");
                Ok(())
            }
        }
    }

    /// Apply a terminal event; losing the race to another terminal writer is
    /// not an error.
    async fn settle(&self, job_id: JobId, event: JobEvent, control: &PollControl) -> Result<()> {
        match self.persist(job_id, event, control).await {
            Ok(_) | Err(ScribeError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Apply an event, retrying storage failures with backoff until it
    /// commits or the task is stopped. Returns `false` when stopped first.
    async fn persist(
        &self,
        job_id: JobId,
        event: JobEvent,
        control: &PollControl,
    ) -> Result<bool> {
        let mut failures = 0;
        loop {
            match self.registry.transition(job_id, event.clone()).await {
                Ok(_) => return Ok(true),
                Err(e @ (ScribeError::InvalidTransition { .. } | ScribeError::NotFound { .. })) => {
                    return Err(e)
                }
                Err(e) => {
                    failures += 1;
                    let delay = self.backoff.delay_after_failures(failures);
                    warn!(
                        job_id = %job_id,
                        event = event.event_type(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Could not store job transition"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = control.notify.notified() => {}
                    }
                    if control.is_stopped() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn cancel_remote(&self, job_id: JobId, handle: &str) {
        let canceled =
            tokio::time::timeout(self.config.submit_timeout(), self.builder.cancel(handle)).await;
        match canceled {
            Ok(Ok(())) => debug!(job_id = %job_id, handle = %handle, "Builder canceled build"),
            Ok(Err(e)) => {
                warn!(job_id = %job_id, handle = %handle, error = %e, "Builder cancel failed")
            }
            Err(_) => warn!(job_id = %job_id, handle = %handle, "Builder cancel timed out"),
        }
    }
}
