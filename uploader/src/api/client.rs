//! HTTP client for the upload API.
//!
//! [`UploadService`] is the seam the wizard, submission and poller are
//! written against; [`HttpClient`] implements it with reqwest.
//!
//! ```rust,ignore
//! use rosterload::api::{HttpClient, UploadService};
//! use rosterload::models::UploadType;
//!
//! let client = HttpClient::new("http://localhost:3000");
//! let result = client.validate(UploadType::Staff, &rows).await?;
//! ```

use std::future::Future;

use crate::error::{ApiError, ApiResult};
use crate::models::{JobStatus, RowRecord, UploadType, ValidationResult};

use super::types::{ErrorBody, ProcessRequest, ProcessResponse, ValidateRequest, ValidateResponse};

/// Operations the pipeline needs from the upload API.
pub trait UploadService: Send + Sync {
    /// `POST /{resource}/validate`, normalized to a remote [`ValidationResult`].
    fn validate(
        &self,
        upload_type: UploadType,
        rows: &[RowRecord],
    ) -> impl Future<Output = ApiResult<ValidationResult>> + Send;

    /// `POST /{resource}/process`.
    fn enqueue(
        &self,
        upload_type: UploadType,
        request: &ProcessRequest,
    ) -> impl Future<Output = ApiResult<ProcessResponse>> + Send;

    /// `GET /job-status/{job_id}`; [`ApiError::NotFound`] once the job expired.
    fn job_status(&self, job_id: &str) -> impl Future<Output = ApiResult<JobStatus>> + Send;

    /// `GET /templates/{staff|student}` as CSV text.
    fn template(&self, upload_type: UploadType) -> impl Future<Output = ApiResult<String>> + Send;
}

/// reqwest-backed [`UploadService`].
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a client for an API base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Turn a non-success response into an [`ApiError`].
///
/// The server's own message is used when the body carries one, else
/// `"API error: <status>"`.
async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("API error: {}", status));

    if status == 404 {
        ApiError::NotFound(message)
    } else {
        ApiError::Http { status, message }
    }
}

impl UploadService for HttpClient {
    async fn validate(&self, upload_type: UploadType, rows: &[RowRecord]) -> ApiResult<ValidationResult> {
        let url = self.url(&format!("{}/validate", upload_type.resource()));
        log::debug!("POST {} ({} rows)", url, rows.len());

        let request = ValidateRequest {
            csv_data: rows.to_vec(),
        };
        let response = self.http.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: ValidateResponse = response.json().await?;
        Ok(body.into_result(rows))
    }

    async fn enqueue(&self, upload_type: UploadType, request: &ProcessRequest) -> ApiResult<ProcessResponse> {
        let url = self.url(&format!("{}/process", upload_type.resource()));
        log::debug!("POST {} ({} rows)", url, request.csv_data.len());

        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.json().await?)
    }

    async fn job_status(&self, job_id: &str) -> ApiResult<JobStatus> {
        let url = self.url(&format!("job-status/{}", job_id));
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.json().await?)
    }

    async fn template(&self, upload_type: UploadType) -> ApiResult<String> {
        let url = self.url(&format!("templates/{}", upload_type.template_name()));
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = HttpClient::new("http://localhost:3000/api/");
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert_eq!(client.url("/staff/validate"), "http://localhost:3000/api/staff/validate");
        assert_eq!(client.url("job-status/abc"), "http://localhost:3000/api/job-status/abc");
    }
}
