//! Publish job records keyed by id, with an index of the single
//! non-terminal job per `(book, format)`.
//!
//! Only non-terminal jobs are held in memory. A job's slot is dropped once a
//! terminal transition commits; later reads go to the repository, which
//! already holds the final record. Jobs this process never loaded are adopted
//! from the repository on first use.
//!
//! Writes to one job are serialized by that job's write lock and persisted
//! before they become visible; in-memory reads clone the last committed
//! record without waiting on writers or I/O.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, ScribeError};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::log_job_operation;
use crate::models::{BookId, JobId, PublishFormat, PublishJob};
use crate::persistence::JobRepository;
use crate::state_machine::{JobEvent, JobStateMachine, Transition};

#[derive(Debug)]
struct JobSlot {
    record: RwLock<PublishJob>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JobSlot {
    fn new(job: PublishJob) -> Arc<Self> {
        Arc::new(Self {
            record: RwLock::new(job),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }
}

/// Outcome of asking for a job on a `(book, format)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A fresh `queued` job was created
    Created(PublishJob),
    /// A non-terminal job already existed and is returned instead
    Existing(PublishJob),
}

impl Admission {
    pub fn job(&self) -> &PublishJob {
        match self {
            Self::Created(job) | Self::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> PublishJob {
        match self {
            Self::Created(job) | Self::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobSlot>>,
    active: DashMap<(BookId, PublishFormat), JobId>,
    repository: Arc<dyn JobRepository>,
    events: EventPublisher,
}

impl JobRegistry {
    pub fn new(repository: Arc<dyn JobRepository>, events: EventPublisher) -> Self {
        Self {
            jobs: DashMap::new(),
            active: DashMap::new(),
            repository,
            events,
        }
    }

    /// Return the non-terminal job for the pair, creating a `queued` one if
    /// there is none. Jobs left non-terminal by an earlier process are
    /// adopted from the repository.
    #[instrument(skip(self), fields(book_id = %book_id, format = %format))]
    pub async fn admit(&self, book_id: BookId, format: PublishFormat) -> Result<Admission> {
        let key = (book_id, format);

        loop {
            if let Some(job) = self.active_job(book_id, format) {
                return Ok(Admission::Existing(job));
            }

            let durable = self
                .repository
                .find_latest_job(book_id, format)
                .await?
                .filter(|job| !job.is_terminal());

            let admission = match self.active.entry(key) {
                // Another admit won the pair while storage was being read
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let admission = match durable {
                        Some(job) => Admission::Existing(job),
                        None => Admission::Created(PublishJob::new(book_id, format)),
                    };
                    let job = admission.job().clone();
                    self.jobs
                        .entry(job.id)
                        .or_insert_with(|| JobSlot::new(job.clone()));
                    entry.insert(job.id);
                    admission
                }
            };

            let job = admission.job();
            if admission.is_created() {
                if let Err(e) = self.repository.save_job(job).await {
                    self.active.remove_if(&key, |_, id| *id == job.id);
                    self.jobs.remove(&job.id);
                    return Err(e.into());
                }
                log_job_operation("admit", job.id, book_id, format, "queued", None);
            } else {
                debug!(
                    job_id = %job.id,
                    state = %job.state,
                    "Adopted non-terminal job from storage"
                );
            }

            return Ok(admission);
        }
    }

    /// Latest committed record of a job held in memory. Terminal jobs and jobs
    /// this process never loaded are only reachable through [`Self::load`].
    pub fn get(&self, job_id: JobId) -> Result<PublishJob> {
        self.jobs
            .get(&job_id)
            .map(|slot| slot.record.read().clone())
            .ok_or_else(|| ScribeError::not_found("job", job_id))
    }

    /// Latest committed record, reading through to the repository for jobs
    /// not held in memory.
    pub async fn load(&self, job_id: JobId) -> Result<PublishJob> {
        if let Ok(job) = self.get(job_id) {
            return Ok(job);
        }
        self.repository
            .load_job(job_id)
            .await?
            .ok_or_else(|| ScribeError::not_found("job", job_id))
    }

    /// The non-terminal job for the pair, if any.
    pub fn active_job(&self, book_id: BookId, format: PublishFormat) -> Option<PublishJob> {
        let job_id = *self.active.get(&(book_id, format))?;
        self.get(job_id).ok()
    }

    /// Every job of a book, terminal ones included, oldest first.
    pub async fn list_for_book(&self, book_id: BookId) -> Result<Vec<PublishJob>> {
        Ok(self.repository.list_jobs(book_id).await?)
    }

    /// Number of jobs held in memory.
    pub fn resident_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Apply a state machine event to a job.
    ///
    /// Fails with `InvalidTransition` (and changes nothing) when the event is
    /// not allowed from the job's current state.
    pub async fn transition(&self, job_id: JobId, event: JobEvent) -> Result<PublishJob> {
        let event_type = event.event_type();
        let mut transition = None;
        let job = self
            .commit(job_id, |job| {
                transition = Some(JobStateMachine::apply(job, event)?);
                Ok(())
            })
            .await?;

        if let Some(Transition { from, to }) = transition {
            if to.is_terminal() {
                self.active
                    .remove_if(&(job.book_id, job.format), |_, id| *id == job_id);
                self.jobs.remove(&job_id);
            }

            log_job_operation(
                event_type,
                job.id,
                job.book_id,
                job.format,
                &to.to_string(),
                job.error.as_deref(),
            );
            self.events.publish(LifecycleEvent::JobTransitioned {
                job_id: job.id,
                book_id: job.book_id,
                format: job.format,
                from,
                to,
                error: job.error.clone(),
                result_url: job.result_url.clone(),
            });
        }

        Ok(job)
    }

    /// Count one builder call against a non-terminal job. A failed call
    /// extends the consecutive failure streak; a successful one resets it.
    pub async fn record_attempt(&self, job_id: JobId, failed: bool) -> Result<PublishJob> {
        self.commit(job_id, |job| {
            if job.is_terminal() {
                return Err(ScribeError::InvalidTransition {
                    from: job.state.to_string(),
                    event: "record_attempt".to_string(),
                });
            }
            job.attempt_count += 1;
            job.consecutive_poll_failures = if failed {
                job.consecutive_poll_failures + 1
            } else {
                0
            };
            job.updated_at = chrono::Utc::now();
            Ok(())
        })
        .await
    }

    /// Slot for a write. Non-terminal jobs missing from memory are adopted;
    /// terminal ones get a detached slot so the write is rejected as usual.
    async fn slot(&self, job_id: JobId) -> Result<Arc<JobSlot>> {
        if let Some(slot) = self.jobs.get(&job_id) {
            return Ok(Arc::clone(slot.value()));
        }

        let job = self
            .repository
            .load_job(job_id)
            .await?
            .ok_or_else(|| ScribeError::not_found("job", job_id))?;
        if job.is_terminal() {
            return Ok(JobSlot::new(job));
        }

        let key = (job.book_id, job.format);
        let slot = Arc::clone(
            self.jobs
                .entry(job_id)
                .or_insert_with(|| JobSlot::new(job.clone()))
                .value(),
        );
        self.active.entry(key).or_insert(job_id);
        debug!(job_id = %job_id, state = %job.state, "Adopted job from storage");

        Ok(slot)
    }

    /// Serialized write path: mutate a copy, persist it, then publish it.
    async fn commit<F>(&self, job_id: JobId, mutate: F) -> Result<PublishJob>
    where
        F: FnOnce(&mut PublishJob) -> Result<()>,
    {
        let slot = self.slot(job_id).await?;
        let _write = slot.write_lock.lock().await;

        let mut updated = slot.record.read().clone();
        mutate(&mut updated)?;
        self.repository.save_job(&updated).await?;
        *slot.record.write() = updated.clone();

        Ok(updated)
    }
}
