//! Step wizard driving one upload session.
//!
//! The wizard walks the user through choosing an upload type (and a school,
//! for privileged users), selecting a file, validating it, submitting it and
//! watching the result. All session state lives in one [`WizardContext`]
//! owned by [`WizardController`]; every transition re-renders the current
//! step through a host-supplied [`StepView`].
//!
//! ```text
//! privileged: SelectType → SelectSchool → Upload → Validate → Process → Results
//! standard:   SelectType →                Upload → Validate → Process → Results
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::UploadService;
use crate::config::UploaderConfig;
use crate::error::{PipelineError, WizardError, WizardResult};
use crate::models::{
    JobStatus, ProcessingOptions, ProcessingResult, RowRecord, UploadType, UploaderContext, ValidationResult,
    ValidationSource,
};
use crate::parser::{self, ParseResult};
use crate::poller::poll_until_terminal;
use crate::report::Report;
use crate::submission::submit;
use crate::validation::validate_locally;

// =============================================================================
// Steps
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectType,
    SelectSchool,
    Upload,
    Validate,
    Process,
    Results,
}

impl WizardStep {
    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::SelectType => "Select upload type",
            WizardStep::SelectSchool => "Select school",
            WizardStep::Upload => "Upload CSV file",
            WizardStep::Validate => "Validate data",
            WizardStep::Process => "Process upload",
            WizardStep::Results => "Results",
        }
    }
}

/// Steps shown to users who pick the target school.
pub const PRIVILEGED_STEPS: &[WizardStep] = &[
    WizardStep::SelectType,
    WizardStep::SelectSchool,
    WizardStep::Upload,
    WizardStep::Validate,
    WizardStep::Process,
    WizardStep::Results,
];

pub const STANDARD_STEPS: &[WizardStep] = &[
    WizardStep::SelectType,
    WizardStep::Upload,
    WizardStep::Validate,
    WizardStep::Process,
    WizardStep::Results,
];

// =============================================================================
// Context
// =============================================================================

/// The file picked in the upload step, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RowRecord>,
}

/// Everything one wizard session knows.
#[derive(Debug, Clone, PartialEq)]
pub struct WizardContext {
    /// 1-based position in the active step sequence.
    pub current_step: usize,
    pub upload_type: Option<UploadType>,
    pub selected_school: Option<String>,
    pub file: Option<SelectedFile>,
    pub validation_result: Option<ValidationResult>,
    pub processing_result: Option<ProcessingResult>,
    /// Set while an enqueue request is in flight.
    pub is_processing: bool,
    /// Last status seen while polling.
    pub job_status: Option<JobStatus>,
}

impl WizardContext {
    pub fn new() -> Self {
        Self {
            current_step: 1,
            upload_type: None,
            selected_school: None,
            file: None,
            validation_result: None,
            processing_result: None,
            is_processing: false,
            job_status: None,
        }
    }

    fn clear_results(&mut self) {
        self.validation_result = None;
        self.processing_result = None;
        self.job_status = None;
    }
}

impl Default for WizardContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Render target supplied by the host.
pub trait StepView {
    /// Show `step`; `position` is `(current, total)`.
    fn render(&mut self, step: WizardStep, position: (usize, usize), context: &WizardContext);

    /// Progress of a polled job.
    fn progress(&mut self, _status: &JobStatus) {}

    /// Outcome of validation, submission or a failure.
    fn report(&mut self, report: &Report);
}

// =============================================================================
// Controller
// =============================================================================

pub struct WizardController<S, V> {
    service: Arc<S>,
    view: V,
    context: WizardContext,
    uploader: UploaderContext,
    steps: &'static [WizardStep],
    config: UploaderConfig,
    options: ProcessingOptions,
    /// Cancelling this aborts the session before submission, or detaches
    /// polling after it. Renewed by `reset`.
    detach: CancellationToken,
    poll_token: Option<CancellationToken>,
}

impl<S: UploadService, V: StepView> WizardController<S, V> {
    /// Create a wizard and render its first step.
    pub fn new(service: Arc<S>, view: V, uploader: UploaderContext, config: UploaderConfig) -> Self {
        let steps = if uploader.is_privileged() {
            PRIVILEGED_STEPS
        } else {
            STANDARD_STEPS
        };

        let mut wizard = Self {
            service,
            view,
            context: WizardContext::new(),
            uploader,
            steps,
            config,
            options: ProcessingOptions::default(),
            detach: CancellationToken::new(),
            poll_token: None,
        };
        wizard.render();
        wizard
    }

    pub fn context(&self) -> &WizardContext {
        &self.context
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn steps(&self) -> &'static [WizardStep] {
        self.steps
    }

    pub fn current(&self) -> WizardStep {
        self.steps[self.context.current_step.clamp(1, self.steps.len()) - 1]
    }

    /// Token that cancels the current session until the next [`reset`](Self::reset).
    ///
    /// Before the batch is submitted, cancelling makes validation and
    /// submission fail with [`PipelineError::Cancelled`] and nothing is sent
    /// to the enqueue endpoint. After submission it only stops polling; the
    /// job keeps running on the server.
    pub fn detach_token(&self) -> CancellationToken {
        self.detach.clone()
    }

    fn render(&mut self) {
        let step = self.current();
        let position = (self.context.current_step, self.steps.len());
        self.view.render(step, position, &self.context);
    }

    // -------------------------------------------------------------------------
    // Selections
    // -------------------------------------------------------------------------

    pub fn select_upload_type(&mut self, upload_type: UploadType) {
        if self.context.upload_type != Some(upload_type) {
            self.context.clear_results();
        }
        self.context.upload_type = Some(upload_type);
        self.render();
    }

    pub fn select_school(&mut self, school_id: impl Into<String>) {
        self.context.selected_school = Some(school_id.into());
        self.render();
    }

    /// Parse CSV text and make it the selected file.
    pub fn select_file(&mut self, name: &str, text: &str) -> WizardResult<()> {
        let parsed = parser::parse_with_headers(text);
        self.accept_file(name, parsed)
    }

    /// Like [`select_file`](Self::select_file) for raw bytes of any supported encoding.
    pub fn select_file_bytes(&mut self, name: &str, bytes: &[u8]) -> WizardResult<()> {
        let parsed = parser::parse_bytes(bytes);
        self.accept_file(name, parsed)
    }

    fn accept_file(&mut self, name: &str, parsed: crate::error::CsvResult<ParseResult>) -> WizardResult<()> {
        self.context.clear_results();
        self.context.file = None;

        match parsed {
            Ok(result) => {
                log::info!("Loaded {} with {} data rows ({})", name, result.records.len(), result.encoding);
                self.context.file = Some(SelectedFile {
                    name: name.to_string(),
                    headers: result.headers,
                    rows: result.records,
                });
                self.render();
                Ok(())
            }
            Err(e) => {
                let err = PipelineError::Parse(e);
                self.view.report(&Report::from_error(&err));
                self.render();
                Err(err.into())
            }
        }
    }

    pub fn set_options(&mut self, options: ProcessingOptions) {
        self.options = options;
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Check that the current step has what it needs to move on.
    pub fn validate_current_step(&self) -> WizardResult<()> {
        match self.current() {
            WizardStep::SelectType if self.context.upload_type.is_none() => Err(WizardError::NoUploadType),
            WizardStep::SelectSchool if self.context.selected_school.is_none() => Err(WizardError::NoSchool),
            WizardStep::Upload if self.context.file.is_none() => Err(WizardError::NoFile),
            WizardStep::Validate => match &self.context.validation_result {
                None => Err(WizardError::NotValidated),
                Some(_) if !self.validation_passed() => Err(WizardError::ValidationFailed),
                Some(_) => Ok(()),
            },
            WizardStep::Process if !self.job_accepted() => Err(WizardError::NotReady),
            _ => Ok(()),
        }
    }

    /// Move forward.
    ///
    /// On the validate step this runs validation first and only advances on
    /// a valid remote result. On the process step it submits the batch and
    /// advances once the job is accepted, then tracks large jobs until they
    /// finish. On the results step it does nothing.
    pub async fn next(&mut self) -> WizardResult<()> {
        match self.current() {
            WizardStep::Validate if !self.validation_passed() => {
                self.run_validation().await?;
                tokio::time::sleep(self.config.advance_delay).await;
                self.advance();
            }
            WizardStep::Process if !self.job_accepted() => {
                self.run_submission().await?;
                tokio::time::sleep(self.config.advance_delay).await;
                self.advance();
                self.enter_results().await;
            }
            WizardStep::Results => {}
            _ => {
                self.validate_current_step()?;
                self.advance();
            }
        }
        Ok(())
    }

    pub fn prev(&mut self) {
        if self.context.current_step > 1 {
            self.context.current_step -= 1;
            self.render();
        }
    }

    /// Start a new upload. A tracked job keeps running on the server.
    ///
    /// Tokens handed out by [`detach_token`](Self::detach_token) before the
    /// reset no longer affect the new session.
    pub fn reset(&mut self) {
        if let Some(token) = self.poll_token.take() {
            token.cancel();
        }
        self.detach = CancellationToken::new();
        self.context = WizardContext::new();
        self.render();
    }

    fn advance(&mut self) {
        if self.context.current_step < self.steps.len() {
            self.context.current_step += 1;
        }
        self.render();
    }

    fn validation_passed(&self) -> bool {
        matches!(
            &self.context.validation_result,
            Some(result) if result.is_valid() && result.source() == ValidationSource::Remote
        )
    }

    fn job_accepted(&self) -> bool {
        matches!(&self.context.processing_result, Some(result) if result.job_id().is_some())
    }

    fn check_cancelled(&self) -> WizardResult<()> {
        if self.detach.is_cancelled() {
            log::warn!("Upload cancelled before submission");
            return Err(PipelineError::Cancelled.into());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    /// Validate the selected file: local checks, then the server.
    ///
    /// The server is only asked when the local checks pass.
    pub async fn run_validation(&mut self) -> WizardResult<()> {
        self.check_cancelled()?;
        let upload_type = self.context.upload_type.ok_or(WizardError::NoUploadType)?;
        let rows = match &self.context.file {
            Some(file) => file.rows.clone(),
            None => return Err(WizardError::NoFile),
        };
        self.context.processing_result = None;

        let local = validate_locally(&rows, upload_type);
        let local_errors = local.errors().len();
        self.view.report(&Report::from_validation(&local, self.config.report_limit));
        self.context.validation_result = Some(local);
        self.render();

        if local_errors > 0 {
            return Err(PipelineError::LocalValidation { count: local_errors }.into());
        }

        let response = tokio::select! {
            biased;
            _ = self.detach.cancelled() => return self.check_cancelled(),
            response = self.service.validate(upload_type, &rows) => response,
        };

        match response {
            Ok(remote) => {
                let valid = remote.is_valid();
                self.view.report(&Report::from_validation(&remote, self.config.report_limit));
                self.context.validation_result = Some(remote);
                self.render();
                if valid {
                    Ok(())
                } else {
                    Err(WizardError::ValidationFailed)
                }
            }
            Err(e) => {
                let err = PipelineError::RemoteValidation(e);
                self.view.report(&Report::from_error(&err));
                Err(err.into())
            }
        }
    }

    /// Submit the validated rows. Failures leave the wizard on this step.
    pub async fn run_submission(&mut self) -> WizardResult<()> {
        if self.context.is_processing {
            return Err(WizardError::AlreadyProcessing);
        }
        self.check_cancelled()?;
        if !self.validation_passed() {
            return Err(WizardError::NotValidated);
        }
        let upload_type = self.context.upload_type.ok_or(WizardError::NoUploadType)?;
        let rows = match &self.context.validation_result {
            Some(result) => result.csv_data().to_vec(),
            None => return Err(WizardError::NotValidated),
        };

        let mut uploader = self.uploader.clone();
        if let Some(school) = &self.context.selected_school {
            uploader.school_id = Some(school.clone());
        }

        self.context.is_processing = true;
        self.render();

        let result = submit(self.service.as_ref(), upload_type, &rows, self.options.clone(), &uploader).await;

        self.context.is_processing = false;
        self.view.report(&Report::from_processing(&result, self.config.report_limit));

        let outcome = match &result {
            ProcessingResult::SubmissionFailed { message, .. } => Err(PipelineError::Submission(message.clone()).into()),
            _ => Ok(()),
        };
        self.context.processing_result = Some(result);
        self.render();
        outcome
    }

    /// Poll a large queued job; small batches keep the queued message.
    async fn enter_results(&mut self) {
        let job_id = match &self.context.processing_result {
            Some(ProcessingResult::Queued { job_id, total, .. }) if *total > self.config.async_threshold => {
                job_id.clone()
            }
            _ => return,
        };
        self.track_job(&job_id).await;
    }

    /// Poll `job_id` until it ends or is detached, then report the outcome.
    pub async fn track_job(&mut self, job_id: &str) -> ProcessingResult {
        if let Some(previous) = self.poll_token.take() {
            previous.cancel();
        }
        let token = self.detach.child_token();
        self.poll_token = Some(token.clone());

        let service = Arc::clone(&self.service);
        let interval = self.config.poll_interval;
        let view = &mut self.view;
        let job_status = &mut self.context.job_status;

        let outcome = poll_until_terminal(service.as_ref(), job_id, interval, &token, |status| {
            *job_status = Some(status.clone());
            view.progress(status);
        })
        .await;
        self.poll_token = None;

        let result = outcome.into_processing_result(job_id);
        self.view.report(&Report::from_processing(&result, self.config.report_limit));
        self.context.processing_result = Some(result.clone());
        self.render();
        result
    }
}
