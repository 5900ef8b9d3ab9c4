//! Error types for the upload pipeline.
//!
//! This module defines the error hierarchy used across the crate:
//!
//! - [`CsvError`] - CSV reading and parsing errors
//! - [`ApiError`] - transport errors talking to the upload API
//! - [`PipelineError`] - top-level errors of one ingestion attempt
//! - [`WizardError`] - step guard failures and wrapped pipeline errors
//! - [`ConfigError`] - invalid environment configuration
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! A job that completes with some failed records is *not* an error: it is a
//! [`crate::models::ProcessingResult::Completed`] carrying a non-empty
//! error list.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading or parsing an uploaded CSV file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing but blank lines.
    #[error("CSV file is empty")]
    EmptyFile,

    /// A header row exists but no data row follows it.
    #[error("CSV file has headers but no data rows")]
    NoDataRows,

    /// Input exceeds the configured size limit.
    #[error("File is too large ({size} bytes, limit is {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    /// Failed to serialize rows back to CSV.
    #[error("Failed to write CSV: {0}")]
    Write(String),
}

// =============================================================================
// API Errors
// =============================================================================

/// Errors from the upload API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Server answered with a non-success status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Resource does not exist (expired job, unknown template).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request never completed.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Errors of one pass through the ingestion pipeline.
///
/// Every variant is recovered where it happens and turned into display text
/// by [`crate::report::Report`]; none of them ends the wizard session.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file could not be parsed; a new file must be selected.
    #[error("CSV error: {0}")]
    Parse(#[from] CsvError),

    /// Schema or format problems found before any network call.
    #[error("{count} validation error(s) found in the file")]
    LocalValidation { count: usize },

    /// The validation endpoint failed.
    #[error("Validation service error: {0}")]
    RemoteValidation(#[source] ApiError),

    /// The enqueue request was rejected or never answered.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The server reported the job as failed.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The job is no longer known to the server.
    #[error("Job {0} not found; it may have expired")]
    JobExpired(String),

    /// The caller cancelled the upload before it was submitted, or stopped
    /// following the job.
    #[error("Upload cancelled")]
    Cancelled,
}

// =============================================================================
// Wizard Errors
// =============================================================================

/// Reasons the wizard refused a transition.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Please select an upload type")]
    NoUploadType,

    #[error("Please select a school")]
    NoSchool,

    #[error("Please select a CSV file")]
    NoFile,

    #[error("Please validate the file before continuing")]
    NotValidated,

    #[error("The file has validation errors; fix them and upload again")]
    ValidationFailed,

    #[error("An upload is already being processed")]
    AlreadyProcessing,

    /// The upload has not been accepted yet.
    #[error("Process the upload before continuing")]
    NotReady,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<CsvError> for WizardError {
    fn from(err: CsvError) -> Self {
        WizardError::Pipeline(PipelineError::Parse(err))
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for wizard transitions.
pub type WizardResult<T> = Result<T, WizardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError -> WizardError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let wizard_err: WizardError = pipeline_err.into();
        assert!(wizard_err.to_string().contains("empty"));
    }

    #[test]
    fn test_http_error_shows_server_message_verbatim() {
        let err = ApiError::Http {
            status: 422,
            message: "Duplicate email in row 4".into(),
        };
        assert_eq!(err.to_string(), "Duplicate email in row 4");

        let wrapped = PipelineError::RemoteValidation(err);
        assert!(wrapped.to_string().contains("Duplicate email in row 4"));
    }

    #[test]
    fn test_too_large_format() {
        let err = CsvError::TooLarge { size: 20, limit: 10 };
        let msg = err.to_string();
        assert!(msg.contains("20 bytes"));
        assert!(msg.contains("10 bytes"));
    }
}
