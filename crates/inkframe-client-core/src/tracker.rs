//! Single-job status tracking with a self-terminating poll loop.
//!
//! The server owns job execution; the tracker only reflects reported state.
//! Polling runs on a fixed period and stops on its own within one tick of the
//! job reaching a terminal status.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use inkframe_api_client::{ApiClient, ApiError, GenerationStartResponse, JobState, JobStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::store::ActionOutcome;

/// Server-authoritative source of job status, abstracted so the tracker can
/// be driven by scripted statuses in tests.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// One status fetch from the server.
    async fn fetch_status(&self) -> Result<JobStatus, ApiError>;

    /// Ask the server to start a generation job.
    async fn begin_job(&self) -> Result<GenerationStartResponse, ApiError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self) -> Result<JobStatus, ApiError> {
        self.job_status().await
    }

    async fn begin_job(&self) -> Result<GenerationStartResponse, ApiError> {
        self.start_generation().await
    }
}

/// Tracks the one in-flight server-side job (generation or display).
pub struct JobTracker {
    source: Arc<dyn StatusSource>,
    poll_interval: Duration,
    status: RwLock<JobStatus>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl JobTracker {
    pub fn new(source: Arc<dyn StatusSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            status: RwLock::new(JobStatus::default()),
            poll_task: Mutex::new(None),
        }
    }

    pub fn with_default_interval(source: Arc<dyn StatusSource>) -> Self {
        Self::new(source, DEFAULT_POLL_INTERVAL)
    }

    /// Snapshot of the current job status record.
    pub fn status(&self) -> JobStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == JobState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    pub fn is_complete(&self) -> bool {
        self.state() == JobState::Complete
    }

    pub fn is_error(&self) -> bool {
        self.state() == JobState::Error
    }

    fn state(&self) -> JobState {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    /// One status fetch; overwrites the local record unconditionally on
    /// success. Fetch failures are logged and leave the record untouched
    /// (stale-but-valid over crash).
    pub async fn refresh(&self) {
        match self.source.fetch_status().await {
            Ok(next) => {
                *self.status.write().unwrap_or_else(PoisonError::into_inner) = next;
            }
            Err(error) => warn!("job status refresh failed: {error}"),
        }
    }

    /// Begin the repeating refresh cycle. A no-op while a cycle is already
    /// active, so repeated calls never stack timers. Each tick refreshes and
    /// the loop exits as soon as the status is no longer `running`.
    pub fn start_polling(self: &Arc<Self>, interval: Option<Duration>) {
        let mut task_guard = self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task_guard.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("poll cycle already active");
            return;
        }

        let period = interval.unwrap_or(self.poll_interval);
        let tracker = Arc::clone(self);
        *task_guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the interval yields immediately; the first refresh belongs one
            // full period out
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.refresh().await;
                if !tracker.is_running() {
                    debug!("job reached terminal status, poll cycle stopping");
                    break;
                }
            }
        }));
    }

    /// Cancel any active poll cycle. Idempotent.
    pub fn stop_polling(&self) {
        if let Some(task) = self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    /// Ask the server to start a generation job. On success the local record
    /// is seeded to `running` and polling begins; on failure the record is
    /// left untouched.
    pub async fn start_job(self: &Arc<Self>) -> ActionOutcome {
        match self.source.begin_job().await {
            Ok(response) => {
                *self.status.write().unwrap_or_else(PoisonError::into_inner) = JobStatus {
                    status: JobState::Running,
                    message: response.message.clone(),
                    image_path: None,
                    error: None,
                };
                self.start_polling(None);
                ActionOutcome::ok(response.message)
            }
            Err(error) => ActionOutcome::failure(error.to_string()),
        }
    }
}
