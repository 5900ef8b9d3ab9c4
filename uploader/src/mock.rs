//! Scripted in-memory [`UploadService`] for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{ProcessRequest, ProcessResponse, UploadService};
use crate::error::{ApiError, ApiResult};
use crate::models::{JobStatus, RowRecord, UploadType, ValidationError, ValidationResult, ValidationSource};

#[derive(Default)]
pub(crate) struct MockService {
    validation_errors: Mutex<Vec<ValidationError>>,
    validation_failure: Mutex<Option<String>>,
    enqueue_responses: Mutex<VecDeque<ApiResult<ProcessResponse>>>,
    statuses: Mutex<VecDeque<ApiResult<JobStatus>>>,
    last_request: Mutex<Option<ProcessRequest>>,
    validate_calls: AtomicUsize,
    enqueue_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors the remote validator reports for every call.
    pub fn with_validation_errors(self, errors: Vec<ValidationError>) -> Self {
        *self.validation_errors.lock().unwrap() = errors;
        self
    }

    /// Make every validate call fail with a 500 carrying `message`.
    pub fn with_validation_failure(self, message: &str) -> Self {
        *self.validation_failure.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Queue enqueue responses; once drained, enqueue accepts as `job-1`.
    pub fn with_enqueue(self, responses: Vec<ApiResult<ProcessResponse>>) -> Self {
        self.enqueue_responses.lock().unwrap().extend(responses);
        self
    }

    /// Queue job statuses; once drained, the job reports as still processing.
    pub fn with_statuses(self, statuses: Vec<ApiResult<JobStatus>>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProcessRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl UploadService for MockService {
    async fn validate(&self, _upload_type: UploadType, rows: &[RowRecord]) -> ApiResult<ValidationResult> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.validation_failure.lock().unwrap().clone() {
            return Err(ApiError::Http { status: 500, message });
        }
        let errors = self.validation_errors.lock().unwrap().clone();
        Ok(ValidationResult::new(errors, rows.to_vec(), ValidationSource::Remote))
    }

    async fn enqueue(&self, _upload_type: UploadType, request: &ProcessRequest) -> ApiResult<ProcessResponse> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let next = self.enqueue_responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ProcessResponse {
                success: true,
                job_id: Some("job-1".to_string()),
                message: Some(format!("{} records queued", request.csv_data.len())),
            })
        })
    }

    async fn job_status(&self, _job_id: &str) -> ApiResult<JobStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(JobStatus::processing(0, 0)))
    }

    async fn template(&self, upload_type: UploadType) -> ApiResult<String> {
        Ok(format!("{} template\n", upload_type))
    }
}
