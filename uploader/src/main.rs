//! Rosterload CLI - bulk staff and student account uploads
//!
//! # Main Commands
//!
//! ```bash
//! rosterload upload staff.csv --type staff        # Validate, submit and follow a roster
//! rosterload status <job-id> --watch              # Follow a running job
//! rosterload serve                                # Start the stub upload API (port 3000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! rosterload parse staff.csv                      # Just parse CSV to JSON
//! rosterload validate staff.csv --type staff      # Local checks (add --remote for the API)
//! rosterload template student -o student.csv      # Download a CSV template
//! ```

use clap::{Parser, Subcommand};
use rosterload::api::logs;
use rosterload::report::progress_line;
use rosterload::{
    parse_file, start_polling, validate_locally, HttpClient, JobStatus, ProcessingOptions, ProcessingResult,
    Report, Role, UploadService, UploadType, UploaderConfig, UploaderContext, WizardContext, WizardController,
    WizardStep,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "rosterload")]
#[command(about = "Bulk-create staff and student accounts from CSV files", long_about = None)]
struct Cli {
    /// Upload API base URL (overrides ROSTERLOAD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a CSV file
    Validate {
        /// Input CSV file
        input: PathBuf,

        /// Upload type (staff or student)
        #[arg(short = 't', long = "type")]
        upload_type: UploadType,

        /// Also run the server-side checks
        #[arg(long)]
        remote: bool,
    },

    /// Full pipeline: parse, validate, submit and follow the job
    Upload {
        /// Input CSV file
        input: PathBuf,

        /// Upload type (staff or student)
        #[arg(short = 't', long = "type")]
        upload_type: UploadType,

        /// Target school (privileged uploads)
        #[arg(long)]
        school: Option<String>,

        /// Upload with the privileged role
        #[arg(long)]
        privileged: bool,

        /// Uploader email forwarded with the job
        #[arg(long, default_value = "")]
        user_email: String,

        /// Send a notification to this address when the job is done
        #[arg(long)]
        notify: Option<String>,

        /// Run calculators after a student upload
        #[arg(long)]
        run_calculators: bool,

        /// Do not follow the job after it is queued
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the status of a processing job
    Status {
        /// Job ID returned by the upload
        job_id: String,

        /// Keep polling until the job ends
        #[arg(short, long)]
        watch: bool,
    },

    /// Download the CSV template for an upload type
    Template {
        /// staff or student
        upload_type: UploadType,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the stub upload API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logs::init(if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    });

    let config = match UploaderConfig::from_env() {
        Ok(config) => match cli.api_url.as_deref() {
            Some(url) => config.with_api_url(url),
            None => config,
        },
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Validate {
            input,
            upload_type,
            remote,
        } => cmd_validate(&input, upload_type, remote, &config).await,

        Commands::Upload {
            input,
            upload_type,
            school,
            privileged,
            user_email,
            notify,
            run_calculators,
            no_wait,
        } => {
            let uploader = UploaderContext {
                user_id: "cli".to_string(),
                email: user_email,
                role: if privileged { Role::Privileged } else { Role::Standard },
                ..Default::default()
            };
            let options = ProcessingOptions {
                send_notifications: notify.is_some(),
                notification_email: notify.unwrap_or_default(),
                run_calculators: run_calculators.then_some(true),
            };
            cmd_upload(&input, upload_type, school, uploader, options, no_wait, config).await
        }

        Commands::Status { job_id, watch } => cmd_status(&job_id, watch, &config).await,

        Commands::Template { upload_type, output } => cmd_template(upload_type, output.as_deref(), &config).await,

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Terminal rendering of the wizard.
#[derive(Default)]
struct TerminalView;

impl rosterload::StepView for TerminalView {
    fn render(&mut self, step: WizardStep, position: (usize, usize), context: &WizardContext) {
        if context.is_processing {
            eprintln!("⏳ Submitting...");
            return;
        }
        eprintln!("[{}/{}] {}", position.0, position.1, step.title());
    }

    fn progress(&mut self, status: &JobStatus) {
        eprintln!("   {}", progress_line(status));
    }

    fn report(&mut self, report: &Report) {
        eprintln!("{}", report);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_file(input)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

async fn cmd_validate(
    input: &Path,
    upload_type: UploadType,
    remote: bool,
    config: &UploaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating {} file: {}", upload_type, input.display());

    let parsed = parse_file(input)?;
    let local = validate_locally(&parsed.records, upload_type);
    eprintln!("{}", Report::from_validation(&local, config.report_limit));

    if !local.is_valid() {
        return Err(rosterload::PipelineError::LocalValidation {
            count: local.errors().len(),
        }
        .into());
    }

    if remote {
        let client = HttpClient::new(&config.api_url);
        let result = client
            .validate(upload_type, &parsed.records)
            .await
            .map_err(rosterload::PipelineError::RemoteValidation)?;
        eprintln!("{}", Report::from_validation(&result, config.report_limit));
        if !result.is_valid() {
            return Err(format!("{} validation error(s) reported by the server", result.errors().len()).into());
        }
    }

    Ok(())
}

async fn cmd_upload(
    input: &Path,
    upload_type: UploadType,
    school: Option<String>,
    uploader: UploaderContext,
    options: ProcessingOptions,
    no_wait: bool,
    mut config: UploaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if no_wait {
        config.async_threshold = usize::MAX;
    }

    let service = Arc::new(HttpClient::new(&config.api_url));
    let mut wizard = WizardController::new(service, TerminalView, uploader, config);
    wizard.set_options(options);

    // Ctrl-C before submission aborts the upload; afterwards it stops
    // following the job, which keeps running on the server
    let detach = wizard.detach_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            detach.cancel();
        }
    });

    wizard.select_upload_type(upload_type);
    wizard.next().await?;

    if wizard.current() == WizardStep::SelectSchool {
        if let Some(school) = school {
            wizard.select_school(school);
        }
        wizard.next().await?;
    }

    let bytes = fs::read(input)?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string());
    wizard.select_file_bytes(&name, &bytes)?;

    // Upload -> Validate -> Process -> Results
    while wizard.current() != WizardStep::Results {
        wizard.next().await?;
    }

    match &wizard.context().processing_result {
        Some(ProcessingResult::Failed { .. }) | Some(ProcessingResult::Expired { .. }) => {
            Err("the upload job did not complete".into())
        }
        Some(result) => {
            if let Some(job_id) = result.job_id() {
                println!("{}", job_id);
            }
            Ok(())
        }
        None => Ok(()),
    }
}

async fn cmd_status(job_id: &str, watch: bool, config: &UploaderConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(HttpClient::new(&config.api_url));

    if !watch {
        let status = client.job_status(job_id).await?;
        eprintln!("{}", progress_line(&status));
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    eprintln!("🔄 Following job {} (Ctrl-C to stop)", job_id);
    let handle = start_polling(client, job_id, config.poll_interval, |status: &JobStatus| {
        eprintln!("   {}", progress_line(status));
    });

    let token: CancellationToken = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = handle.wait().await.into_processing_result(job_id);
    eprintln!("{}", Report::from_processing(&result, config.report_limit));

    match result {
        ProcessingResult::Failed { .. } | ProcessingResult::Expired { .. } => {
            Err(format!("job {} did not complete", job_id).into())
        }
        _ => Ok(()),
    }
}

async fn cmd_template(
    upload_type: UploadType,
    output: Option<&Path>,
    config: &UploaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = HttpClient::new(&config.api_url);
    let csv = client.template(upload_type).await?;
    write_output(csv.trim_end(), output)
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    rosterload::api::server::start_server(port).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
