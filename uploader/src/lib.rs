//! # Rosterload - bulk staff and student account uploads
//!
//! Rosterload takes a CSV roster, checks it locally and against the upload
//! API, submits it as a background job and follows that job to the end.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────┐   ┌────────────┐   ┌────────────┐   ┌────────┐   ┌────────┐
//! │ CSV File │──▶│ Parser │──▶│ Validation │──▶│ Submission │──▶│ Poller │──▶│ Report │
//! │ (any enc)│   │        │   │local+remote│   │  (enqueue) │   │ (jobs) │   │        │
//! └──────────┘   └────────┘   └────────────┘   └────────────┘   └────────┘   └────────┘
//!                       ╰──────────── driven step by step by the Wizard ────────────╯
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rosterload::{HttpClient, UploaderConfig, UploadType, WizardController};
//!
//! let config = UploaderConfig::from_env()?;
//! let service = Arc::new(HttpClient::new(&config.api_url));
//! let mut wizard = WizardController::new(service, view, uploader, config);
//! wizard.select_upload_type(UploadType::Staff);
//! wizard.next().await?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (RowRecord, ValidationResult, JobStatus)
//! - [`config`] - Defaults and environment overrides
//! - [`parser`] - CSV parsing with encoding detection
//! - [`validation`] - Local row checks and duplicate detection
//! - [`submission`] - Batch enqueueing
//! - [`poller`] - Cancellable job-status polling
//! - [`report`] - Display-ready outcome summaries
//! - [`wizard`] - Step state machine
//! - [`api`] - HTTP client, log broadcaster and stub server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Submission and jobs
pub mod poller;
pub mod submission;

// Presentation
pub mod report;
pub mod wizard;

// HTTP API
pub mod api;

#[cfg(test)]
mod mock;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ApiError, ConfigError, CsvError, PipelineError, WizardError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ErrorMessage,
    JobState,
    JobStatus,
    ProcessingOptions,
    ProcessingResult,
    Role,
    RowRecord,
    UploadType,
    UploaderContext,
    ValidationResult,
};

pub use config::UploaderConfig;

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use parser::{parse, parse_bytes, parse_file, to_csv, ParseResult};
pub use validation::validate_locally;
pub use submission::submit;
pub use poller::{poll_until_terminal, start_polling, PollHandle, PollOutcome};
pub use report::{Report, Severity};

// =============================================================================
// Re-exports - Wizard
// =============================================================================

pub use wizard::{StepView, WizardContext, WizardController, WizardStep};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::{HttpClient, UploadService};
