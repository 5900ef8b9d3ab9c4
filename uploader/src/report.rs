//! Display-ready summaries of pipeline outcomes.
//!
//! A [`Report`] is what a view shows the user: a severity, one headline and
//! some detail lines. Long lists are cut at a limit and end with
//! `... and M more`; the underlying results keep every entry.

use std::fmt;

use crate::models::{JobRecordError, JobStatus, ProcessingResult, ValidationResult, ValidationSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub headline: String,
    pub details: Vec<String>,
}

impl Report {
    pub fn new(severity: Severity, headline: impl Into<String>) -> Self {
        Self {
            severity,
            headline: headline.into(),
            details: Vec::new(),
        }
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Summary of a validation pass.
    pub fn from_validation(result: &ValidationResult, limit: usize) -> Self {
        if result.is_valid() {
            let headline = match result.source() {
                ValidationSource::Local => format!("{} rows passed local checks", result.total()),
                ValidationSource::Remote => format!("All {} rows are valid and ready to process", result.total()),
            };
            return Report::new(Severity::Success, headline);
        }

        let lines = result
            .errors()
            .iter()
            .map(|e| match &e.field {
                Some(field) => format!("Row {}: [{}] {}", e.row, field, e.message),
                None => format!("Row {}: {}", e.row, e.message),
            })
            .collect();

        Report::new(
            Severity::Error,
            format!("Found {} validation error(s) in {} rows", result.errors().len(), result.total()),
        )
        .with_details(capped(lines, limit))
    }

    /// Summary of a submission or finished job.
    pub fn from_processing(result: &ProcessingResult, limit: usize) -> Self {
        match result {
            ProcessingResult::Queued { job_id, message, total } => Report::new(Severity::Info, message.clone())
                .with_details(vec![
                    format!("Job ID: {}", job_id),
                    format!("{} records will be processed in the background", total),
                ]),
            ProcessingResult::SubmissionFailed { message, errors } => {
                let lines = errors
                    .iter()
                    .filter(|e| e.message != *message)
                    .map(|e| e.message.clone())
                    .collect();
                Report::new(Severity::Error, format!("Upload failed: {}", message)).with_details(capped(lines, limit))
            }
            ProcessingResult::Completed { status, .. } if status.errors.is_empty() => {
                let mut details = Vec::new();
                if let Some(duration) = &status.duration {
                    details.push(format!("Completed in {}", duration));
                }
                Report::new(Severity::Success, format!("Processed {} records", status.total_records))
                    .with_details(details)
            }
            ProcessingResult::Completed { status, .. } => {
                let failed = status.errors.len();
                let ok = status.total_records.saturating_sub(failed);
                let lines = status.errors.iter().map(record_line).collect();
                Report::new(
                    Severity::Warning,
                    format!("Processed {} of {} records; {} failed", ok, status.total_records, failed),
                )
                .with_details(capped(lines, limit))
            }
            ProcessingResult::Failed { status, .. } => Report::new(
                Severity::Error,
                format!(
                    "Processing failed: {}",
                    status.error.as_deref().unwrap_or("the server did not give a reason")
                ),
            ),
            ProcessingResult::Expired { job_id, message } => {
                Report::new(Severity::Error, format!("Job {} not found; it may have expired", job_id))
                    .with_details(vec![message.clone()])
            }
            ProcessingResult::Detached { job_id } => Report::new(
                Severity::Info,
                format!("Stopped tracking job {}; it keeps running on the server", job_id),
            ),
        }
    }

    /// An error and its source chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut details = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            details.push(format!("Caused by: {}", cause));
            source = cause.source();
        }
        Report::new(Severity::Error, err.to_string()).with_details(details)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.severity {
            Severity::Success => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
            Severity::Info => "ℹ️",
        };
        write!(f, "{} {}", icon, self.headline)?;
        for line in &self.details {
            write!(f, "\n   {}", line)?;
        }
        Ok(())
    }
}

/// One-line progress text for a running job.
pub fn progress_line(status: &JobStatus) -> String {
    format!(
        "Processing: {:.0}% ({}/{} records)",
        status.percent_complete, status.processed_records, status.total_records
    )
}

fn record_line(err: &JobRecordError) -> String {
    let who: Vec<&str> = [err.name.as_deref(), err.email.as_deref(), err.id.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

    if who.is_empty() {
        err.reason.clone()
    } else {
        format!("{}: {}", who.join(" / "), err.reason)
    }
}

fn capped(mut lines: Vec<String>, limit: usize) -> Vec<String> {
    if lines.len() > limit {
        let more = lines.len() - limit;
        lines.truncate(limit);
        lines.push(format!("... and {} more", more));
    }
    lines
}
