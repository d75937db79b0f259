//! Scripted in-process backend for controller and poller tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::enhancement::context_builders::{SectionEntry, WorkEntry};
use crate::enhancement::job::{
    EnhancementRequest, JobId, JobStatus, JobStatusReport, JobSubmission,
};
use crate::enhancement_client::{ClientError, EnhancementBackend};

/// Jobs are numbered `job-1`, `job-2`, ... in submission order unless a
/// scripted submit failure is queued. Status checks pop from a per-job
/// script and report `processing` once the script runs dry.
#[derive(Default)]
pub struct FakeBackend {
    submit_failures: Mutex<VecDeque<ClientError>>,
    statuses: Mutex<HashMap<JobId, VecDeque<Result<JobStatusReport, ClientError>>>>,
    requests: Mutex<Vec<EnhancementRequest>>,
    polled: Mutex<Vec<JobId>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    submit_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_submit(&self, error: ClientError) {
        self.submit_failures.lock().unwrap().push_back(error);
    }

    pub fn delay_submits(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn script(&self, job_id: &str, replies: Vec<Result<JobStatusReport, ClientError>>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(JobId::from(job_id), replies.into());
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<EnhancementRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn polled(&self) -> Vec<JobId> {
        self.polled.lock().unwrap().clone()
    }
}

#[async_trait]
impl EnhancementBackend for FakeBackend {
    async fn submit_job(&self, request: &EnhancementRequest) -> Result<JobSubmission, ClientError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(JobSubmission {
            job_id: JobId(format!("job-{n}")),
            status: JobStatus::Pending,
            check_status_url: Some(format!("/llm/status/job-{n}")),
        })
    }

    async fn check_job_status(&self, job_id: &JobId) -> Result<JobStatusReport, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled.lock().unwrap().push(job_id.clone());

        let next = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|replies| replies.pop_front());

        next.unwrap_or_else(|| Ok(report(&job_id.0, JobStatus::Processing)))
    }
}

pub fn report(job_id: &str, status: JobStatus) -> JobStatusReport {
    JobStatusReport {
        job_id: JobId::from(job_id),
        status,
        result: None,
        error: None,
    }
}

pub fn completed(job_id: &str, result: &str) -> JobStatusReport {
    JobStatusReport {
        result: Some(result.to_string()),
        ..report(job_id, JobStatus::Completed)
    }
}

pub fn failed(job_id: &str, error: &str) -> JobStatusReport {
    JobStatusReport {
        error: Some(error.to_string()),
        ..report(job_id, JobStatus::Failed)
    }
}

pub fn work_entry() -> SectionEntry {
    SectionEntry::Work(WorkEntry {
        position: "Senior Developer".to_string(),
        company: "Acme".to_string(),
        start_date: "2023".to_string(),
        end_date: "2025".to_string(),
    })
}
