//! Batch submission.
//!
//! Rows that lost their identifying fields are dropped at this boundary
//! even after validation; the rest are sent to the enqueue endpoint.

use crate::api::{ProcessRequest, UploadService};
use crate::models::{ErrorMessage, ProcessingOptions, ProcessingResult, RowRecord, UploadType, UploaderContext};
use crate::validation::has_identity;

/// Keep rows that carry an email, a name and the type/level marker.
pub fn filter_submittable(rows: &[RowRecord], upload_type: UploadType) -> Vec<RowRecord> {
    let kept: Vec<RowRecord> = rows
        .iter()
        .filter(|row| has_identity(row, upload_type))
        .cloned()
        .collect();

    let dropped = rows.len() - kept.len();
    if dropped > 0 {
        log::warn!("Dropped {} row(s) without identifying fields before submission", dropped);
    }
    kept
}

/// Enqueue `rows` for processing.
///
/// Never returns an error: failures become
/// [`ProcessingResult::SubmissionFailed`] so the caller can offer a retry.
pub async fn submit<S: UploadService>(
    service: &S,
    upload_type: UploadType,
    rows: &[RowRecord],
    options: ProcessingOptions,
    context: &UploaderContext,
) -> ProcessingResult {
    let csv_data = filter_submittable(rows, upload_type);
    if csv_data.is_empty() {
        return failed("No valid records to process");
    }

    let total = csv_data.len();
    let request = ProcessRequest {
        csv_data,
        options: options.for_upload(upload_type),
        context: context.clone(),
    };

    log::info!("Submitting {} {} records", total, upload_type);

    match service.enqueue(upload_type, &request).await {
        Ok(response) if response.success => match response.job_id {
            Some(job_id) => {
                let message = response
                    .message
                    .unwrap_or_else(|| format!("{} records queued for processing", total));
                log::info!("Job {} queued", job_id);
                ProcessingResult::Queued { job_id, message, total }
            }
            None => failed("Server accepted the upload but returned no job id"),
        },
        Ok(response) => failed(&response.message.unwrap_or_else(|| "Upload was rejected".to_string())),
        Err(e) => failed(&e.to_string()),
    }
}

fn failed(message: &str) -> ProcessingResult {
    log::error!("Submission failed: {}", message);
    ProcessingResult::SubmissionFailed {
        message: message.to_string(),
        errors: vec![ErrorMessage::new(message)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProcessResponse;
    use crate::error::ApiError;
    use crate::mock::MockService;

    fn staff(email: &str, last: &str, staff_type: &str) -> RowRecord {
        vec![
            ("Title", "Mr"),
            ("First Name", ""),
            ("Last Name", last),
            ("Email Address", email),
            ("Staff Type", staff_type),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_no_surviving_rows_skips_http() {
        let service = MockService::new();
        let rows = vec![staff("", "Lee", "tut"), staff("a@s.org", "", "tut"), staff("b@s.org", "Bo", " ")];

        let result = submit(&service, UploadType::Staff, &rows, ProcessingOptions::default(), &UploaderContext::default()).await;

        assert_eq!(result.status_label(), "submission_failed");
        assert_eq!(service.enqueue_calls(), 0);
    }

    #[tokio::test]
    async fn test_queued_total_counts_filtered_rows() {
        let service = MockService::new();
        let rows = vec![staff("a@s.org", "Lee", "tut"), staff("", "Bo", "tut"), staff("c@s.org", "Cy", "admin")];
        let options = ProcessingOptions {
            send_notifications: true,
            notification_email: "it@s.org".into(),
            run_calculators: Some(true),
        };

        let result = submit(&service, UploadType::Staff, &rows, options, &UploaderContext::default()).await;

        match result {
            ProcessingResult::Queued { job_id, total, .. } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(total, 2);
            }
            other => panic!("expected queued, got {:?}", other),
        }

        let request = service.last_request().unwrap();
        assert_eq!(request.csv_data.len(), 2);
        assert_eq!(request.options.run_calculators, None);
    }

    #[tokio::test]
    async fn test_rejection_and_transport_errors() {
        let service = MockService::new().with_enqueue(vec![
            Ok(ProcessResponse {
                success: false,
                job_id: None,
                message: Some("School is locked".into()),
            }),
            Err(ApiError::Network("connection refused".into())),
            Ok(ProcessResponse {
                success: true,
                job_id: None,
                message: None,
            }),
        ]);
        let rows = vec![staff("a@s.org", "Lee", "tut")];
        let ctx = UploaderContext::default();

        let first = submit(&service, UploadType::Staff, &rows, ProcessingOptions::default(), &ctx).await;
        assert_eq!(
            first,
            ProcessingResult::SubmissionFailed {
                message: "School is locked".into(),
                errors: vec![ErrorMessage::new("School is locked")],
            }
        );

        let second = submit(&service, UploadType::Staff, &rows, ProcessingOptions::default(), &ctx).await;
        assert!(matches!(second, ProcessingResult::SubmissionFailed { message, .. } if message.contains("connection refused")));

        let third = submit(&service, UploadType::Staff, &rows, ProcessingOptions::default(), &ctx).await;
        assert_eq!(third.job_id(), None);
        assert_eq!(service.enqueue_calls(), 3);
    }
}
