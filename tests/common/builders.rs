//! Test doubles and fixtures shared by the integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scribe_core::config::ScribeConfig;
use scribe_core::models::{BookId, JobId, NewChapter, PublishFormat, PublishJob};
use scribe_core::persistence::{
    ChapterRepository, InMemoryJobRepository, JobRepository, PersistenceError,
    PersistenceResult,
};
use scribe_core::publish::{BuildStatus, BuilderClient, BuilderError};
use scribe_core::state_machine::JobState;
use scribe_core::tree::ChapterForest;
use scribe_core::ScribeCore;

/// How the scripted builder answers `submit`.
#[derive(Debug, Clone)]
pub enum SubmitScript {
    Accept(String),
    AcceptAfter(Duration, String),
    Reject(BuilderError),
    Hang,
}

/// How the scripted builder answers one `status` call.
#[derive(Debug, Clone)]
pub enum StatusScript {
    Report(BuildStatus),
    Error(BuilderError),
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSubmit {
    pub book_id: BookId,
    pub format: PublishFormat,
    pub chapter_titles: Vec<String>,
}

/// Builder double that plays back a fixed script and records every call.
#[derive(Debug)]
pub struct ScriptedBuilder {
    submit: SubmitScript,
    statuses: Mutex<VecDeque<StatusScript>>,
    fallback: StatusScript,
    submits: Mutex<Vec<RecordedSubmit>>,
    status_calls: AtomicUsize,
    cancels: Mutex<Vec<String>>,
}

impl ScriptedBuilder {
    pub fn new(submit: SubmitScript) -> Self {
        Self {
            submit,
            statuses: Mutex::new(VecDeque::new()),
            fallback: StatusScript::Report(BuildStatus::Running),
            submits: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            cancels: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting(handle: &str) -> Self {
        Self::new(SubmitScript::Accept(handle.to_string()))
    }

    /// Answer the first status calls from `statuses`, in order.
    pub fn with_statuses(self, statuses: Vec<StatusScript>) -> Self {
        *self.statuses.lock() = statuses.into();
        self
    }

    /// Answer every status call past the scripted ones with `fallback`.
    pub fn then_always(mut self, fallback: StatusScript) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn submits(&self) -> Vec<RecordedSubmit> {
        self.submits.lock().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().clone()
    }
}

pub fn report(status: BuildStatus) -> StatusScript {
    StatusScript::Report(status)
}

pub fn succeeded(url: &str) -> StatusScript {
    StatusScript::Report(BuildStatus::Succeeded {
        artifact_url: url.to_string(),
    })
}

pub fn unavailable(reason: &str) -> StatusScript {
    StatusScript::Error(BuilderError::Unavailable(reason.to_string()))
}

#[async_trait]
impl BuilderClient for ScriptedBuilder {
    async fn submit(
        &self,
        book_id: BookId,
        format: PublishFormat,
        chapters: &ChapterForest,
    ) -> Result<String, BuilderError> {
        self.submits.lock().push(RecordedSubmit {
            book_id,
            format,
            chapter_titles: chapters.iter().map(|c| c.title.clone()).collect(),
        });

        match self.submit.clone() {
            SubmitScript::Accept(handle) => Ok(handle),
            SubmitScript::AcceptAfter(delay, handle) => {
                tokio::time::sleep(delay).await;
                Ok(handle)
            }
            SubmitScript::Reject(error) => Err(error),
            SubmitScript::Hang => futures::future::pending().await,
        }
    }

    async fn status(&self, _handle: &str) -> Result<BuildStatus, BuilderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            StatusScript::Report(status) => Ok(status),
            StatusScript::Error(error) => Err(error),
            StatusScript::Hang => futures::future::pending().await,
        }
    }

    async fn cancel(&self, handle: &str) -> Result<(), BuilderError> {
        self.cancels.lock().push(handle.to_string());
        Ok(())
    }
}

/// Job storage whose writes can be switched off to simulate an outage.
/// Reads keep working throughout.
#[derive(Debug, Default)]
pub struct FlakyJobRepository {
    inner: InMemoryJobRepository,
    failing: AtomicBool,
    rejected_writes: AtomicUsize,
}

impl FlakyJobRepository {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRepository for FlakyJobRepository {
    async fn save_job(&self, job: &PublishJob) -> PersistenceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected_writes.fetch_add(1, Ordering::SeqCst);
            return Err(PersistenceError::Backend("connection reset".to_string()));
        }
        self.inner.save_job(job).await
    }

    async fn load_job(&self, job_id: JobId) -> PersistenceResult<Option<PublishJob>> {
        self.inner.load_job(job_id).await
    }

    async fn list_jobs(&self, book_id: BookId) -> PersistenceResult<Vec<PublishJob>> {
        self.inner.list_jobs(book_id).await
    }

    async fn find_latest_job(
        &self,
        book_id: BookId,
        format: PublishFormat,
    ) -> PersistenceResult<Option<PublishJob>> {
        self.inner.find_latest_job(book_id, format).await
    }
}

/// Short intervals so paused-clock tests stay readable.
pub fn fast_config() -> ScribeConfig {
    let mut config = ScribeConfig::default();
    config.publish.poll_interval_ms = 1_000;
    config.publish.max_poll_backoff_ms = 8_000;
    config.publish.backoff_multiplier = 2.0;
    config.publish.max_consecutive_poll_failures = 3;
    config.publish.running_timeout_seconds = 60;
    config.publish.submit_timeout_seconds = 5;
    config
}

pub fn core_with(builder: &Arc<ScriptedBuilder>) -> ScribeCore {
    ScribeCore::in_memory(fast_config(), Arc::clone(builder) as Arc<dyn BuilderClient>)
        .expect("fast config is valid")
}

/// Core over caller-owned repositories, so a second core can pick up where
/// the first left off.
pub fn core_over(
    builder: &Arc<ScriptedBuilder>,
    chapters: Arc<dyn ChapterRepository>,
    jobs: Arc<dyn JobRepository>,
) -> ScribeCore {
    ScribeCore::new(
        fast_config(),
        chapters,
        jobs,
        Arc::clone(builder) as Arc<dyn BuilderClient>,
    )
    .expect("fast config is valid")
}

/// A book with two root chapters, the first holding one child.
pub async fn seeded_book(core: &ScribeCore) -> BookId {
    let book_id = BookId::new();
    let tree = core.tree();
    tree.create_book(book_id).await.expect("create book");

    let intro = tree
        .insert(book_id, NewChapter::new(None, "Intro"))
        .await
        .expect("insert intro");
    tree.insert(book_id, NewChapter::new(Some(intro.id), "Motivation"))
        .await
        .expect("insert motivation");
    tree.insert(book_id, NewChapter::new(None, "Body"))
        .await
        .expect("insert body");

    book_id
}

/// Poll the registry (on the test clock) until `done` holds for the job.
pub async fn wait_for<F>(core: &ScribeCore, job_id: JobId, mut done: F) -> PublishJob
where
    F: FnMut(&PublishJob) -> bool,
{
    for _ in 0..100_000 {
        let job = core
            .publisher()
            .status(job_id)
            .await
            .expect("job exists");
        if done(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {job_id} never reached the expected condition");
}

pub async fn wait_for_state(core: &ScribeCore, job_id: JobId, state: JobState) -> PublishJob {
    wait_for(core, job_id, |job| job.state == state).await
}

pub async fn wait_for_terminal(core: &ScribeCore, job_id: JobId) -> PublishJob {
    wait_for(core, job_id, PublishJob::is_terminal).await
}
