//! Domain models for the upload pipeline.
//!
//! This module contains the data structures shared by every stage:
//!
//! - [`RowRecord`] - One parsed CSV data row (header -> value, in column order)
//! - [`ValidationError`] - One problem found in the uploaded file
//! - [`ValidationResult`] - Outcome of local or remote validation
//! - [`JobStatus`] - Server-side state of an asynchronous processing job
//! - [`ProcessingResult`] - What happened to a submission
//! - [`UploaderContext`] - Who is uploading, supplied by the host

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Upload Type
// =============================================================================

/// Kind of accounts contained in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    Staff,
    Student,
}

impl UploadType {
    /// API resource segment (`/staff/...`, `/students/...`).
    pub fn resource(&self) -> &'static str {
        match self {
            UploadType::Staff => "staff",
            UploadType::Student => "students",
        }
    }

    /// Template name (`/templates/staff`, `/templates/student`).
    pub fn template_name(&self) -> &'static str {
        match self {
            UploadType::Staff => "staff",
            UploadType::Student => "student",
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

impl FromStr for UploadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staff" => Ok(UploadType::Staff),
            "student" | "students" => Ok(UploadType::Student),
            other => Err(format!("unknown upload type '{}' (expected staff or student)", other)),
        }
    }
}

// =============================================================================
// Uploader Context
// =============================================================================

/// Role of the person running the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May pick the target school before uploading.
    Privileged,
    #[default]
    Standard,
}

/// Identity of the uploader, as provided by the host environment.
///
/// The pipeline treats it as opaque and forwards it with the enqueue request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploaderContext {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Target school; set from the wizard's school step for privileged users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
}

impl UploaderContext {
    pub fn is_privileged(&self) -> bool {
        self.role == Role::Privileged
    }
}

// =============================================================================
// Row Record
// =============================================================================

/// One CSV data row: column header -> trimmed cell value.
///
/// Keys keep the column order of the file and serialize as a JSON object in
/// that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecord {
    fields: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value. A repeated header keeps its first position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Value for a column, if the column exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for a column, or `""` when absent.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// True when the column is absent or holds only whitespace.
    pub fn is_blank(&self, key: &str) -> bool {
        self.value(key).trim().is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RowRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RowRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RowRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = RowRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of column values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RowRecord, A::Error> {
                let mut record = RowRecord::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    record.insert(key, text);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Row reference of a validation error: 1-based data row, or `"N/A"` for
/// file-level problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowRef {
    Row(usize),
    #[default]
    NotApplicable,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Row(n) => write!(f, "{}", n),
            RowRef::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for RowRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowRef::Row(n) => serializer.serialize_u64(*n as u64),
            RowRef::NotApplicable => serializer.serialize_str("N/A"),
        }
    }
}

impl<'de> Deserialize<'de> for RowRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
            Missing(()),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => RowRef::Row(n as usize),
            Raw::Text(s) => s.trim().parse().map(RowRef::Row).unwrap_or(RowRef::NotApplicable),
            Raw::Missing(()) => RowRef::NotApplicable,
        })
    }
}

/// One problem found in the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(default)]
    pub row: RowRef,
    /// Category, e.g. `Missing Field` or `Invalid Value`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    /// Offending value, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ValidationError {
    pub fn new(row: RowRef, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            kind: kind.into(),
            field: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Where a validation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSource {
    Local,
    Remote,
}

/// Aggregate outcome of validating a full row set.
///
/// `is_valid` always equals `errors.is_empty()`; the constructor derives it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    is_valid: bool,
    errors: Vec<ValidationError>,
    total: usize,
    csv_data: Vec<RowRecord>,
    source: ValidationSource,
}

impl ValidationResult {
    /// Build a result; `total` is the number of rows.
    pub fn new(errors: Vec<ValidationError>, csv_data: Vec<RowRecord>, source: ValidationSource) -> Self {
        let total = csv_data.len();
        Self::with_total(errors, csv_data, total, source)
    }

    /// Build a result with an explicit row total (the server may count differently).
    pub fn with_total(
        errors: Vec<ValidationError>,
        csv_data: Vec<RowRecord>,
        total: usize,
        source: ValidationSource,
    ) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            total,
            csv_data,
            source,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn csv_data(&self) -> &[RowRecord] {
        &self.csv_data
    }

    pub fn source(&self) -> ValidationSource {
        self.source
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Processing options sent with the enqueue request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOptions {
    pub send_notifications: bool,
    #[serde(default)]
    pub notification_email: String,
    /// Student uploads only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_calculators: Option<bool>,
}

impl ProcessingOptions {
    /// Drop options that do not apply to this upload type.
    pub fn for_upload(mut self, upload_type: UploadType) -> Self {
        if upload_type == UploadType::Staff {
            self.run_calculators = None;
        }
        self
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Server-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One record the job could not process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecordError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "error", default)]
    pub reason: String,
}

/// Status document returned by `GET /job-status/{jobId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub processed_records: usize,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub percent_complete: f64,
    #[serde(default)]
    pub errors: Vec<JobRecordError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Fatal failure message when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn processing(processed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (processed as f64 / total as f64 * 100.0).round()
        };
        Self {
            status: JobState::Processing,
            processed_records: processed,
            total_records: total,
            percent_complete: percent,
            errors: Vec::new(),
            duration: None,
            error: None,
        }
    }
}

/// A bare `{"message": ...}` error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Outcome of submitting a batch, and later of its job.
///
/// Serialized as a flat object tagged by `status` (see
/// [`ProcessingResult::status_label`]) with camelCase fields. `completed`
/// and `failed` carry the job status fields inline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingResult {
    /// Server accepted the batch.
    Queued { job_id: String, message: String, total: usize },
    /// Enqueue failed; the process action can be retried.
    SubmissionFailed { message: String, errors: Vec<ErrorMessage> },
    /// Job finished; `status.errors` lists records that failed individually.
    Completed { job_id: String, status: JobStatus },
    /// Job failed as a whole.
    Failed { job_id: String, status: JobStatus },
    /// Server no longer knows the job.
    Expired { job_id: String, message: String },
    /// Polling was cancelled; the job keeps running remotely.
    Detached { job_id: String },
}

impl ProcessingResult {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ProcessingResult::Queued { job_id, .. }
            | ProcessingResult::Completed { job_id, .. }
            | ProcessingResult::Failed { job_id, .. }
            | ProcessingResult::Expired { job_id, .. }
            | ProcessingResult::Detached { job_id } => Some(job_id),
            ProcessingResult::SubmissionFailed { .. } => None,
        }
    }

    /// Label matching the `status` values used on the wire.
    pub fn status_label(&self) -> &'static str {
        match self {
            ProcessingResult::Queued { .. } => "queued",
            ProcessingResult::SubmissionFailed { .. } => "submission_failed",
            ProcessingResult::Completed { .. } => "completed",
            ProcessingResult::Failed { .. } => "failed",
            ProcessingResult::Expired { .. } => "expired",
            ProcessingResult::Detached { .. } => "detached",
        }
    }
}

impl Serialize for ProcessingResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("status", self.status_label())?;

        match self {
            ProcessingResult::Queued { job_id, message, total } => {
                map.serialize_entry("jobId", job_id)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("total", total)?;
            }
            ProcessingResult::SubmissionFailed { message, errors } => {
                map.serialize_entry("message", message)?;
                map.serialize_entry("errors", errors)?;
            }
            ProcessingResult::Completed { job_id, status } | ProcessingResult::Failed { job_id, status } => {
                map.serialize_entry("jobId", job_id)?;
                map.serialize_entry("processedRecords", &status.processed_records)?;
                map.serialize_entry("totalRecords", &status.total_records)?;
                map.serialize_entry("percentComplete", &status.percent_complete)?;
                map.serialize_entry("errors", &status.errors)?;
                if let Some(duration) = &status.duration {
                    map.serialize_entry("duration", duration)?;
                }
                if let Some(error) = &status.error {
                    map.serialize_entry("error", error)?;
                }
            }
            ProcessingResult::Expired { job_id, message } => {
                map.serialize_entry("jobId", job_id)?;
                map.serialize_entry("message", message)?;
            }
            ProcessingResult::Detached { job_id } => {
                map.serialize_entry("jobId", job_id)?;
            }
        }

        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_record_keeps_column_order() {
        let row: RowRecord = vec![("Title", "Mr"), ("First Name", "Sam"), ("Email Address", "s@x.io")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Title":"Mr","First Name":"Sam","Email Address":"s@x.io"}"#);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["Title", "First Name", "Email Address"]);
    }

    #[test]
    fn test_row_record_from_json_stringifies_values() {
        let row: RowRecord = serde_json::from_value(json!({"Year Gp": 12, "Tutor": null, "Level": "Level 3"})).unwrap();
        assert_eq!(row.value("Year Gp"), "12");
        assert_eq!(row.value("Tutor"), "");
        assert_eq!(row.value("Level"), "Level 3");
        assert!(row.is_blank("Missing"));
    }

    #[test]
    fn test_row_ref_wire_format() {
        let err = ValidationError::new(RowRef::NotApplicable, "Empty File", "No rows");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["row"], "N/A");
        assert_eq!(value["type"], "Empty File");
        assert!(value.get("field").is_none());

        let parsed: ValidationError =
            serde_json::from_value(json!({"row": 3, "type": "Duplicate", "message": "dup"})).unwrap();
        assert_eq!(parsed.row, RowRef::Row(3));

        let parsed: ValidationError =
            serde_json::from_value(json!({"row": "7", "type": "Duplicate", "message": "dup"})).unwrap();
        assert_eq!(parsed.row, RowRef::Row(7));
    }

    #[test]
    fn test_processing_result_wire_format() {
        let rejected = ProcessingResult::SubmissionFailed {
            message: "School is locked".into(),
            errors: vec![ErrorMessage::new("School is locked")],
        };
        assert_eq!(
            serde_json::to_value(&rejected).unwrap(),
            json!({"status": "submission_failed", "message": "School is locked", "errors": [{"message": "School is locked"}]})
        );

        let queued = ProcessingResult::Queued {
            job_id: "job-9".into(),
            message: "Queued".into(),
            total: 3,
        };
        assert_eq!(
            serde_json::to_value(&queued).unwrap(),
            json!({"status": "queued", "jobId": "job-9", "message": "Queued", "total": 3})
        );

        let completed = ProcessingResult::Completed {
            job_id: "job-9".into(),
            status: JobStatus {
                status: JobState::Completed,
                duration: Some("3s".into()),
                errors: vec![JobRecordError {
                    email: Some("a@x.org".into()),
                    reason: "Email already in use".into(),
                    ..Default::default()
                }],
                ..JobStatus::processing(3, 3)
            },
        };
        let json = serde_json::to_string(&completed).unwrap();
        assert_eq!(json.matches("\"status\"").count(), 1);
        assert_eq!(
            serde_json::from_str::<Value>(&json).unwrap(),
            json!({
                "status": "completed",
                "jobId": "job-9",
                "processedRecords": 3,
                "totalRecords": 3,
                "percentComplete": 100.0,
                "errors": [{"email": "a@x.org", "reason": "Email already in use"}],
                "duration": "3s"
            })
        );

        let detached = ProcessingResult::Detached { job_id: "job-9".into() };
        assert_eq!(serde_json::to_value(&detached).unwrap(), json!({"status": "detached", "jobId": "job-9"}));
    }

    #[test]
    fn test_validation_result_derives_validity() {
        let ok = ValidationResult::new(vec![], vec![RowRecord::new()], ValidationSource::Local);
        assert!(ok.is_valid());
        assert_eq!(ok.total(), 1);

        let bad = ValidationResult::new(
            vec![ValidationError::new(RowRef::Row(1), "Missing Field", "x")],
            vec![RowRecord::new()],
            ValidationSource::Remote,
        );
        assert!(!bad.is_valid());
        let value = serde_json::to_value(&bad).unwrap();
        assert_eq!(value["isValid"], false);
        assert_eq!(value["source"], "remote");
    }

    #[test]
    fn test_options_drop_calculators_for_staff() {
        let options = ProcessingOptions {
            send_notifications: true,
            notification_email: "admin@school.org".into(),
            run_calculators: Some(true),
        };
        let staff = options.clone().for_upload(UploadType::Staff);
        assert!(serde_json::to_value(&staff).unwrap().get("runCalculators").is_none());

        let student = options.for_upload(UploadType::Student);
        assert_eq!(serde_json::to_value(&student).unwrap()["runCalculators"], true);
    }

    #[test]
    fn test_job_status_deserialization() {
        let status: JobStatus = serde_json::from_value(json!({
            "status": "completed",
            "processedRecords": 40,
            "totalRecords": 40,
            "percentComplete": 100,
            "errors": [{"name": "Ann Lee", "email": "ann@x.io", "error": "Email already in use"}],
            "duration": "12s"
        }))
        .unwrap();

        assert!(status.status.is_terminal());
        assert_eq!(status.errors[0].reason, "Email already in use");
        assert_eq!(status.duration.as_deref(), Some("12s"));
    }

    #[test]
    fn test_upload_type_parsing() {
        assert_eq!("Staff".parse::<UploadType>().unwrap(), UploadType::Staff);
        assert_eq!("students".parse::<UploadType>().unwrap(), UploadType::Student);
        assert!("parents".parse::<UploadType>().is_err());
        assert_eq!(UploadType::Student.resource(), "students");
    }
}
