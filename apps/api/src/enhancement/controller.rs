//! Enhancement Controller: one per enhancement-capable field.
//!
//! ```text
//!   Idle ──enhance()──→ Submitting ──job id──→ Polling ──→ Completed ─┐
//!    ▲        │              │                    ├──────→ Failed    ─┤
//!    │        │ (empty)      └──submit error──────┼──────→ Failed    ─┤
//!    │        └──────────────────────────────────────────→ Failed    ─┤
//!    │                                            └──────→ TimedOut  ─┤
//!    └────────────────── current_job_id cleared, result/error kept ───┘
//! ```
//!
//! **Invariants:**
//! - At most one job is tracked at a time. Every `enhance()` bumps a
//!   submission ticket and drops the previous job task, cancelling its timers.
//! - A submit response for an old ticket is discarded, and so is any poll
//!   event whose job id the controller does not [`owns`](Inner::owns).
//!   Only the most recently submitted job can change state.
//! - Failures never escape. They land in `error` / `field_errors`.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`, and every change is published on a `watch` channel.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::enhancement::context_builders::{ContextBuilder, SectionEntry};
use crate::enhancement::error::{EnhancementError, ErrorView};
use crate::enhancement::job::{EnhancementRequest, JobId, JobStatus, JobSubmission};
use crate::enhancement::poller::{JobPoller, JobTask, PollControl, PollEvent, PollSettings};
use crate::enhancement_client::{ClientError, EnhancementBackend};

// ────────────────────────────────────────────────────────────────────────────
// Observable state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementStatus {
    Idle,
    Submitting,
    Polling,
    Enhanced,
    Error,
}

/// Snapshot of a controller, as rendered by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementState {
    pub status: EnhancementStatus,
    pub enhanced_text: String,
    /// `enhanced_text` is a candidate waiting for accept or retry.
    pub is_enhanced: bool,
    pub is_loading: bool,
    pub error: Option<ErrorView>,
    pub field_errors: BTreeMap<String, String>,
    pub current_job_id: Option<JobId>,
    pub updated_at: DateTime<Utc>,
}

impl Default for EnhancementState {
    fn default() -> Self {
        Self {
            status: EnhancementStatus::Idle,
            enhanced_text: String::new(),
            is_enhanced: false,
            is_loading: false,
            error: None,
            field_errors: BTreeMap::new(),
            current_job_id: None,
            updated_at: Utc::now(),
        }
    }
}

impl EnhancementState {
    fn derive_status(&self) -> EnhancementStatus {
        if self.is_loading {
            if self.current_job_id.is_some() {
                EnhancementStatus::Polling
            } else {
                EnhancementStatus::Submitting
            }
        } else if self.error.is_some() {
            EnhancementStatus::Error
        } else if self.is_enhanced {
            EnhancementStatus::Enhanced
        } else {
            EnhancementStatus::Idle
        }
    }

    fn record_error(&mut self, error: &EnhancementError) {
        self.error = Some(error.view());
        self.field_errors = error.field_errors();
    }
}

/// Which text `retry` resubmits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrySource {
    /// The content of the last submission.
    #[default]
    Original,
    /// The pending enhanced text, to refine it further.
    Enhanced,
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Submission {
    content: String,
    entry: SectionEntry,
}

#[derive(Default)]
struct Inner {
    state: EnhancementState,
    /// Bumped by every `enhance()` and by `shutdown()`.
    ticket: u64,
    active_job: Option<JobId>,
    last_submission: Option<Submission>,
    task: Option<JobTask>,
}

impl Inner {
    fn owns(&self, job_id: &JobId) -> bool {
        self.active_job.as_ref() == Some(job_id)
    }

    /// Forgets the tracked job and cancels its task.
    fn release_job(&mut self) {
        self.active_job = None;
        self.state.current_job_id = None;
        self.task = None;
    }

    fn fail(&mut self, error: &EnhancementError) {
        self.state.record_error(error);
        self.state.is_loading = false;
        self.state.is_enhanced = false;
        self.active_job = None;
        self.state.current_job_id = None;
    }
}

struct Shared {
    poller: JobPoller,
    builder: ContextBuilder,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<EnhancementState>,
}

pub struct EnhancementController {
    shared: Arc<Shared>,
}

impl EnhancementController {
    pub fn new(
        backend: Arc<dyn EnhancementBackend>,
        builder: ContextBuilder,
        settings: PollSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(EnhancementState::default());
        Self {
            shared: Arc::new(Shared {
                poller: JobPoller::new(backend, settings),
                builder,
                inner: Mutex::new(Inner::default()),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> EnhancementState {
        self.shared.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EnhancementState> {
        self.shared.state_tx.subscribe()
    }

    /// Starts a new job for `content`, superseding any job in flight.
    ///
    /// Synchronous up to the spawn: the returned snapshot already shows
    /// `is_loading`, or the empty-content error, before any I/O happens.
    pub fn enhance(&self, content: &str, entry: SectionEntry) -> EnhancementState {
        let mut inner = self.shared.lock();
        inner.ticket += 1;
        inner.release_job();
        inner.state.error = None;
        inner.state.field_errors.clear();

        if content.trim().is_empty() {
            inner.state.is_loading = false;
            inner.state.record_error(&EnhancementError::EmptyContent);
            return self.shared.publish(&mut inner);
        }

        let built = self.shared.builder.build(&entry);
        let request = EnhancementRequest {
            section: entry.section(),
            content: content.to_string(),
            context: built.context,
            parameters: built.parameters,
        };

        let ticket = inner.ticket;
        inner.state.is_loading = true;
        inner.last_submission = Some(Submission {
            content: content.to_string(),
            entry,
        });
        inner.task = Some(JobTask::spawn(run_job(
            Arc::downgrade(&self.shared),
            self.shared.poller.clone(),
            ticket,
            request,
        )));

        debug!("Enhancement ticket {ticket} started");
        self.shared.publish(&mut inner)
    }

    /// Resubmits as a fresh `enhance()`. `None` when nothing was submitted yet.
    ///
    /// [`RetrySource::Enhanced`] falls back to the original content when no
    /// enhanced text is pending.
    pub fn retry(&self, source: RetrySource) -> Option<EnhancementState> {
        let (content, entry) = {
            let inner = self.shared.lock();
            let last = inner.last_submission.clone()?;
            let content = match source {
                RetrySource::Enhanced if inner.state.is_enhanced => {
                    inner.state.enhanced_text.clone()
                }
                _ => last.content,
            };
            (content, last.entry)
        };

        Some(self.enhance(&content, entry))
    }

    /// Hands over the pending enhanced text and resets to non-enhanced.
    /// `None`, with no state change, when nothing is pending.
    pub fn accept(&self) -> Option<String> {
        self.accept_into(|_| Ok::<_, Infallible>(()))
            .and_then(Result::ok)
            .map(|(text, ())| text)
    }

    /// [`accept`](Self::accept) gated on `commit`, which receives the pending
    /// text. The candidate is consumed only when `commit` succeeds and stays
    /// pending when it fails.
    pub fn accept_into<T, E>(
        &self,
        commit: impl FnOnce(&str) -> Result<T, E>,
    ) -> Option<Result<(String, T), E>> {
        let mut inner = self.shared.lock();
        if !inner.state.is_enhanced {
            return None;
        }

        let committed = match commit(&inner.state.enhanced_text) {
            Ok(committed) => committed,
            Err(error) => return Some(Err(error)),
        };
        let text = std::mem::take(&mut inner.state.enhanced_text);
        inner.state.is_enhanced = false;
        self.shared.publish(&mut inner);
        Some(Ok((text, committed)))
    }

    /// The user edited the text: drop the banner and field annotations.
    pub fn clear_error(&self) -> EnhancementState {
        let mut inner = self.shared.lock();
        inner.state.error = None;
        inner.state.field_errors.clear();
        self.shared.publish(&mut inner)
    }

    /// Teardown: cancels the job task and stops tracking. Late responses
    /// for the released job are ignored.
    pub fn shutdown(&self) {
        let mut inner = self.shared.lock();
        inner.ticket += 1;
        inner.release_job();
        inner.state.is_loading = false;
        self.shared.publish(&mut inner);
    }
}

impl Drop for EnhancementController {
    fn drop(&mut self) {
        self.shared.lock().task = None;
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &mut Inner) -> EnhancementState {
        inner.state.status = inner.state.derive_status();
        inner.state.updated_at = Utc::now();
        self.state_tx.send_replace(inner.state.clone());
        inner.state.clone()
    }

    /// Records the job id, or discards the response if a newer `enhance()`
    /// started meanwhile. Returns the job to poll.
    fn on_submitted(
        &self,
        ticket: u64,
        submitted: Result<JobSubmission, ClientError>,
    ) -> Option<JobId> {
        let mut inner = self.lock();
        if inner.ticket != ticket {
            warn!("Discarding submit response for superseded ticket {ticket}");
            return None;
        }

        match submitted {
            Ok(submission) => {
                info!(
                    "Enhancement job {} submitted ({})",
                    submission.job_id, submission.status
                );
                inner.active_job = Some(submission.job_id.clone());
                inner.state.current_job_id = Some(submission.job_id.clone());
                self.publish(&mut inner);
                Some(submission.job_id)
            }
            Err(error) => {
                let error = EnhancementError::from_submission(error);
                warn!("Enhancement submission failed: {error}");
                inner.fail(&error);
                self.publish(&mut inner);
                None
            }
        }
    }

    fn on_poll_event(&self, event: PollEvent) -> PollControl {
        let mut inner = self.lock();
        if !inner.owns(event.job_id()) {
            warn!("Discarding stale update for job {}", event.job_id());
            return PollControl::Stop;
        }

        match event {
            PollEvent::Status(report) => match report.status {
                JobStatus::Pending | JobStatus::Processing => return PollControl::Continue,
                JobStatus::Completed => match report.result {
                    Some(result) => {
                        info!("Enhancement job {} completed", report.job_id);
                        inner.state.enhanced_text = result;
                        inner.state.is_enhanced = true;
                        inner.state.is_loading = false;
                        inner.active_job = None;
                        inner.state.current_job_id = None;
                    }
                    None => inner.fail(&EnhancementError::JobFailed(
                        "Enhancement finished without a result".to_string(),
                    )),
                },
                JobStatus::Failed => {
                    let message = report
                        .error
                        .unwrap_or_else(|| "Enhancement job failed".to_string());
                    warn!("Enhancement job {} failed: {message}", report.job_id);
                    inner.fail(&EnhancementError::JobFailed(message));
                }
            },
            PollEvent::CheckFailed { job_id, error } => {
                warn!("Status check for job {job_id} failed: {error}");
                inner.fail(&EnhancementError::StatusCheck(error));
            }
            PollEvent::TimedOut { job_id, waited } => {
                warn!("Enhancement job {job_id} timed out");
                inner.fail(&EnhancementError::Timeout { waited });
            }
        }

        self.publish(&mut inner);
        PollControl::Stop
    }
}

/// Body of a job task: submit, then poll. Holds only a weak reference so a
/// dropped controller is never updated.
async fn run_job(shared: Weak<Shared>, poller: JobPoller, ticket: u64, request: EnhancementRequest) {
    let submitted = poller.backend().submit_job(&request).await;

    let job_id = match shared.upgrade() {
        Some(shared) => shared.on_submitted(ticket, submitted),
        None => None,
    };
    let Some(job_id) = job_id else {
        return;
    };

    poller
        .run(job_id, |event| match shared.upgrade() {
            Some(shared) => shared.on_poll_event(event),
            None => PollControl::Stop,
        })
        .await;
}
