//! Job-status polling.
//!
//! A submitted batch runs as a server-side job. The poller asks for its
//! status right away and then once per interval, feeding every status to a
//! progress callback, until the job completes, fails, or is no longer known
//! to the server. Polling can be cancelled at any time; the job itself keeps
//! running remotely.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::UploadService;
use crate::error::{ApiError, PipelineError};
use crate::models::{JobState, JobStatus, ProcessingResult};

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(JobStatus),
    Failed(JobStatus),
    /// The server answered 404; carries its message.
    Expired(String),
    Cancelled,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }

    pub fn into_processing_result(self, job_id: &str) -> ProcessingResult {
        let job_id = job_id.to_string();
        match self {
            PollOutcome::Completed(status) => ProcessingResult::Completed { job_id, status },
            PollOutcome::Failed(status) => ProcessingResult::Failed { job_id, status },
            PollOutcome::Expired(message) => ProcessingResult::Expired { job_id, message },
            PollOutcome::Cancelled => ProcessingResult::Detached { job_id },
        }
    }

    /// Error view of a non-successful outcome.
    pub fn into_error(self, job_id: &str) -> Option<PipelineError> {
        match self {
            PollOutcome::Completed(_) => None,
            PollOutcome::Failed(status) => Some(PipelineError::JobFailed(
                status.error.unwrap_or_else(|| "Processing failed".to_string()),
            )),
            PollOutcome::Expired(_) => Some(PipelineError::JobExpired(job_id.to_string())),
            PollOutcome::Cancelled => Some(PipelineError::Cancelled),
        }
    }
}

/// Poll `job_id` until it reaches a terminal state or `token` is cancelled.
///
/// At most one status request is in flight. Transport errors other than
/// "not found" are logged and retried on the next tick. `on_progress` is
/// never called after cancellation is observed.
pub async fn poll_until_terminal<S, F>(
    service: &S,
    job_id: &str,
    interval: Duration,
    token: &CancellationToken,
    mut on_progress: F,
) -> PollOutcome
where
    S: UploadService,
    F: FnMut(&JobStatus),
{
    log::debug!("Polling job {} every {:?}", job_id, interval);

    loop {
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return PollOutcome::Cancelled,
            response = service.job_status(job_id) => response,
        };

        match response {
            Ok(status) => {
                on_progress(&status);
                match status.status {
                    JobState::Completed => {
                        log::info!("Job {} completed with {} failed record(s)", job_id, status.errors.len());
                        return PollOutcome::Completed(status);
                    }
                    JobState::Failed => {
                        log::warn!("Job {} failed", job_id);
                        return PollOutcome::Failed(status);
                    }
                    JobState::Processing => {}
                }
            }
            Err(ApiError::NotFound(message)) => {
                log::warn!("Job {} not found: {}", job_id, message);
                return PollOutcome::Expired(message);
            }
            Err(e) => log::warn!("Status check for job {} failed, retrying: {}", job_id, e),
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// A poll loop running in its own task.
pub struct PollHandle {
    job_id: String,
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop polling. The remote job is untouched.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token to cancel from elsewhere, e.g. a signal handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the loop to end.
    pub async fn wait(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Poll task for job {} aborted: {}", self.job_id, e);
                PollOutcome::Cancelled
            }
        }
    }
}

/// Spawn a poll loop for `job_id`.
pub fn start_polling<S, F>(service: Arc<S>, job_id: &str, interval: Duration, on_progress: F) -> PollHandle
where
    S: UploadService + 'static,
    F: FnMut(&JobStatus) + Send + 'static,
{
    let token = CancellationToken::new();
    let child = token.clone();
    let id = job_id.to_string();

    let task = tokio::spawn(async move {
        poll_until_terminal(service.as_ref(), &id, interval, &child, on_progress).await
    });

    PollHandle {
        job_id: job_id.to_string(),
        token,
        task,
    }
}
