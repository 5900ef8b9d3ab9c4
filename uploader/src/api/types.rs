//! Wire types of the upload API.
//!
//! Shared by the HTTP client and the stub server so both ends agree on the
//! camelCase JSON shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{
    ProcessingOptions, RowRecord, RowRef, UploaderContext, ValidationError, ValidationResult, ValidationSource,
};

/// Body of `POST /{staff|students}/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub csv_data: Vec<RowRecord>,
}

/// Response of the validation endpoint.
///
/// Same shape as [`ValidationResult`] minus `source`; every field is
/// optional so partial server answers still normalize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<Vec<RowRecord>>,
}

impl ValidateResponse {
    /// Normalize into a remote [`ValidationResult`].
    ///
    /// `is_valid` is re-derived from the error list. A server that says
    /// "invalid" without listing errors gets a generic file-level error so
    /// the result still blocks submission.
    pub fn into_result(self, submitted: &[RowRecord]) -> ValidationResult {
        let mut errors = self.errors;
        if self.is_valid == Some(false) && errors.is_empty() {
            errors.push(ValidationError::new(
                RowRef::NotApplicable,
                "Validation Failed",
                "The server rejected the file without details",
            ));
        }

        let csv_data = self.csv_data.unwrap_or_else(|| submitted.to_vec());
        let total = self.total.unwrap_or(csv_data.len());
        ValidationResult::with_total(errors, csv_data, total, ValidationSource::Remote)
    }
}

/// Body of `POST /{staff|students}/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub csv_data: Vec<RowRecord>,
    pub options: ProcessingOptions,
    pub context: UploaderContext,
}

/// Response of the enqueue endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// First non-empty message in the body.
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|m| !m.trim().is_empty())
            .or(self.error.filter(|e| !e.trim().is_empty()))
    }
}

/// Create an error response body
pub fn error_response(message: &str) -> Value {
    json!({
        "success": false,
        "message": message,
    })
}
