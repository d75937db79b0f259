//! Job Poller: drives status checks for one job until it settles.
//!
//! ```text
//!   start ──sleep(interval)──→ check ──→ pending/processing ──┐
//!     │                          │                            │
//!     │                          ├──→ completed/failed  (stop)│
//!     │                          └──→ check error       (stop)│
//!     └── max_wait elapsed ──→ timed out (stop) ←─────────────┘
//! ```
//!
//! The poller never touches controller state. It hands every outcome to its
//! owner through a callback, and the owner answers whether to keep going.
//! At most one terminal event is delivered per run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::enhancement::job::{JobId, JobStatusReport};
use crate::enhancement_client::{ClientError, EnhancementBackend};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay before each status check.
    pub interval: Duration,
    /// Budget measured from the start of polling.
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// One outcome delivered to the poller's owner. Each carries the job it answers.
#[derive(Debug)]
pub enum PollEvent {
    Status(JobStatusReport),
    CheckFailed { job_id: JobId, error: ClientError },
    TimedOut { job_id: JobId, waited: Duration },
}

impl PollEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            PollEvent::Status(report) => &report.job_id,
            PollEvent::CheckFailed { job_id, .. } | PollEvent::TimedOut { job_id, .. } => job_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

#[derive(Clone)]
pub struct JobPoller {
    backend: Arc<dyn EnhancementBackend>,
    settings: PollSettings,
}

impl JobPoller {
    pub fn new(backend: Arc<dyn EnhancementBackend>, settings: PollSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &Arc<dyn EnhancementBackend> {
        &self.backend
    }

    /// Polls `job_id` until a terminal status, a failed check, the owner
    /// returning [`PollControl::Stop`], or `max_wait`. Returns once no further
    /// checks will be made.
    pub async fn run<F>(&self, job_id: JobId, mut on_event: F)
    where
        F: FnMut(PollEvent) -> PollControl + Send,
    {
        let checks = async {
            loop {
                tokio::time::sleep(self.settings.interval).await;

                match self.backend.check_job_status(&job_id).await {
                    Ok(report) if report.job_id != job_id => {
                        warn!("Status check for job {job_id} answered for job {}", report.job_id);
                        on_event(PollEvent::CheckFailed {
                            job_id: job_id.clone(),
                            error: ClientError::Envelope(format!(
                                "status response for job {} while polling {job_id}",
                                report.job_id
                            )),
                        });
                        return;
                    }
                    Ok(report) => {
                        debug!("Poll for job {job_id}: {}", report.status);
                        let terminal = report.status.is_terminal();
                        if on_event(PollEvent::Status(report)) == PollControl::Stop || terminal {
                            return;
                        }
                    }
                    Err(error) => {
                        on_event(PollEvent::CheckFailed {
                            job_id: job_id.clone(),
                            error,
                        });
                        return;
                    }
                }
            }
        };

        if tokio::time::timeout(self.settings.max_wait, checks)
            .await
            .is_err()
        {
            warn!(
                "Job {job_id} did not settle within {}s, giving up",
                self.settings.max_wait.as_secs()
            );
            on_event(PollEvent::TimedOut {
                job_id: job_id.clone(),
                waited: self.settings.max_wait,
            });
        }
    }
}

/// Owned handle to a spawned job task. Dropping it cancels the task, so
/// replacing or discarding the handle clears every timer the job started.
#[derive(Debug)]
pub struct JobTask(JoinHandle<()>);

impl JobTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }
}

impl Drop for JobTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhancement::job::JobStatus;
    use crate::enhancement::testing::{completed, failed, report, FakeBackend};
    use std::sync::Mutex;

    fn poller(backend: &Arc<FakeBackend>) -> JobPoller {
        JobPoller::new(backend.clone(), PollSettings::default())
    }

    fn kinds(events: &Mutex<Vec<String>>) -> Vec<String> {
        events.lock().unwrap().clone()
    }

    fn describe(event: &PollEvent) -> String {
        match event {
            PollEvent::Status(r) => format!("{}:{}", r.job_id, r.status),
            PollEvent::CheckFailed { job_id, .. } => format!("{job_id}:check_failed"),
            PollEvent::TimedOut { job_id, .. } => format!("{job_id}:timed_out"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let backend = Arc::new(FakeBackend::new());
        backend.script(
            "job-1",
            vec![
                Ok(report("job-1", JobStatus::Pending)),
                Ok(report("job-1", JobStatus::Processing)),
                Ok(completed("job-1", "done")),
            ],
        );
        let events = Mutex::new(Vec::new());

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Continue
            })
            .await;

        assert_eq!(
            kinds(&events),
            vec!["job-1:pending", "job-1:processing", "job-1:completed"]
        );
        assert_eq!(backend.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_terminal() {
        let backend = Arc::new(FakeBackend::new());
        backend.script("job-1", vec![Ok(failed("job-1", "model overloaded"))]);
        let events = Mutex::new(Vec::new());

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Continue
            })
            .await;

        assert_eq!(kinds(&events), vec!["job-1:failed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let backend = Arc::new(FakeBackend::new());
        backend.script(
            "job-1",
            vec![Err(ClientError::Envelope("job not found".to_string()))],
        );
        let events = Mutex::new(Vec::new());

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Continue
            })
            .await;

        assert_eq!(kinds(&events), vec!["job-1:check_failed"]);
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_can_stop_early() {
        let backend = Arc::new(FakeBackend::new());
        let events = Mutex::new(Vec::new());

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Stop
            })
            .await;

        assert_eq!(kinds(&events), vec!["job-1:processing"]);
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_exactly_once() {
        let backend = Arc::new(FakeBackend::new());
        let events = Mutex::new(Vec::new());
        let started = tokio::time::Instant::now();

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Continue
            })
            .await;

        let recorded = kinds(&events);
        assert_eq!(
            recorded.iter().filter(|e| e.ends_with("timed_out")).count(),
            1,
            "exactly one timeout event"
        );
        assert_eq!(recorded.last().map(String::as_str), Some("job-1:timed_out"));
        assert!(started.elapsed() >= DEFAULT_MAX_WAIT);

        let calls = backend.status_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls(), calls, "no checks after timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_for_other_job_fails_the_check() {
        let backend = Arc::new(FakeBackend::new());
        backend.script("job-1", vec![Ok(completed("job-9", "not ours"))]);
        let events = Mutex::new(Vec::new());

        poller(&backend)
            .run(JobId::from("job-1"), |event| {
                events.lock().unwrap().push(describe(&event));
                PollControl::Continue
            })
            .await;

        assert_eq!(kinds(&events), vec!["job-1:check_failed"]);
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_job_task_cancels_polling() {
        let backend = Arc::new(FakeBackend::new());
        let job_poller = poller(&backend);

        let task = JobTask::spawn(async move {
            job_poller
                .run(JobId::from("job-1"), |_| PollControl::Continue)
                .await;
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        let calls = backend.status_calls();
        assert_eq!(calls, 2, "checks at 2s and 4s");

        drop(task);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.status_calls(), calls);
    }
}
