//! Stub upload API.
//!
//! An in-memory implementation of the endpoints the wizard consumes, for
//! local development and integration tests. Jobs are processed by a
//! background task one row per tick and expire a while after finishing.
//!
//! # API Endpoints
//!
//! | Method | Path                         | Description                      |
//! |--------|------------------------------|----------------------------------|
//! | GET    | `/health`                    | Health check                     |
//! | GET    | `/templates/{staff,student}` | CSV template                     |
//! | POST   | `/staff/validate`            | Validate staff rows              |
//! | POST   | `/students/validate`         | Validate student rows            |
//! | POST   | `/staff/process`             | Enqueue staff rows               |
//! | POST   | `/students/process`          | Enqueue student rows             |
//! | GET    | `/job-status/{job_id}`       | Job progress; 404 once expired   |
//! | GET    | `/api/logs`                  | SSE stream of server log entries |

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{error_response, ProcessRequest, ProcessResponse, ValidateRequest, ValidateResponse};
use crate::config::JOB_TTL;
use crate::models::{JobRecordError, JobState, JobStatus, RowRecord, RowRef, UploadType, ValidationError};
use crate::parser::to_csv;
use crate::validation::{find_duplicate_emails, has_identity, is_valid_email, normalize_email, policy, validate_locally};

type ApiReply<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

struct JobRecord {
    status: JobStatus,
    finished_at: Option<Instant>,
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
    /// Time spent on each row.
    tick: Duration,
    /// How long finished jobs stay queryable.
    ttl: Duration,
}

impl AppState {
    pub fn new(tick: Duration, ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tick,
            ttl,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), JOB_TTL)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/templates/{kind}", get(template))
        .route("/staff/validate", post(validate_staff))
        .route("/students/validate", post(validate_students))
        .route("/staff/process", post(process_staff))
        .route("/students/process", post(process_students))
        .route("/job-status/{job_id}", get(job_status))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Stub upload API running on http://localhost:{}", port);
    println!("   POST /{{staff,students}}/validate");
    println!("   POST /{{staff,students}}/process");
    println!("   GET  /job-status/{{job_id}}");
    println!("   GET  /templates/{{staff,student}}");
    println!("   GET  /api/logs   - SSE log stream");
    println!();

    let listener = TcpListener::bind(addr).await?;
    serve(listener, AppState::default()).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "rosterload-stub",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn template(Path(kind): Path<String>) -> Response {
    let upload_type = match kind.parse::<UploadType>() {
        Ok(t) => t,
        Err(_) => {
            return (StatusCode::NOT_FOUND, Json(error_response(&format!("No template named '{}'", kind))))
                .into_response()
        }
    };

    let headers: Vec<String> = policy(upload_type).template.iter().map(|h| h.to_string()).collect();
    match to_csv(&headers, &[]) {
        Ok(body) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&e.to_string()))).into_response(),
    }
}

async fn validate_staff(Json(request): Json<ValidateRequest>) -> ApiReply<ValidateResponse> {
    validate_rows(UploadType::Staff, request.csv_data)
}

async fn validate_students(Json(request): Json<ValidateRequest>) -> ApiReply<ValidateResponse> {
    validate_rows(UploadType::Student, request.csv_data)
}

fn validate_rows(upload_type: UploadType, rows: Vec<RowRecord>) -> ApiReply<ValidateResponse> {
    if rows.is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(error_response("No rows provided"))));
    }

    log_info(format!("Validating {} {} rows", rows.len(), upload_type));

    let mut errors = validate_locally(&rows, upload_type).errors().to_vec();
    errors.extend(find_duplicate_emails(&rows, upload_type));

    if upload_type == UploadType::Student {
        for (idx, row) in rows.iter().enumerate() {
            let tutor = row.value("Tutor");
            if !tutor.is_empty() && !is_valid_email(tutor) {
                errors.push(
                    ValidationError::new(
                        RowRef::Row(idx + 1),
                        "Invalid Tutor",
                        "Tutor must be the email of an existing staff account",
                    )
                    .with_field("Tutor")
                    .with_data(tutor),
                );
            }
        }
    }

    if errors.is_empty() {
        log_success(format!("{} rows passed validation", rows.len()));
    } else {
        log_warning(format!("{} validation error(s)", errors.len()));
    }

    Ok(Json(ValidateResponse {
        is_valid: Some(errors.is_empty()),
        errors,
        total: Some(rows.len()),
        csv_data: Some(rows),
    }))
}

async fn process_staff(State(state): State<AppState>, Json(request): Json<ProcessRequest>) -> ApiReply<ProcessResponse> {
    enqueue(state, UploadType::Staff, request).await
}

async fn process_students(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiReply<ProcessResponse> {
    enqueue(state, UploadType::Student, request).await
}

async fn enqueue(state: AppState, upload_type: UploadType, request: ProcessRequest) -> ApiReply<ProcessResponse> {
    if request.csv_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(error_response("No records to process"))));
    }

    let job_id = Uuid::new_v4().to_string();
    let total = request.csv_data.len();
    log_info(format!(
        "Job {} queued: {} {} records for {}",
        job_id,
        total,
        upload_type,
        if request.context.email.is_empty() { "unknown uploader" } else { request.context.email.as_str() }
    ));

    // Visible to status queries before the first row is processed
    state.jobs.write().await.insert(
        job_id.clone(),
        JobRecord {
            status: JobStatus::processing(0, total),
            finished_at: None,
        },
    );
    tokio::spawn(run_job(state, job_id.clone(), upload_type, request.csv_data));

    Ok(Json(ProcessResponse {
        success: true,
        job_id: Some(job_id),
        message: Some(format!("{} records queued for processing", total)),
    }))
}

/// Process rows one per tick, mirroring progress into the job table.
async fn run_job(state: AppState, job_id: String, upload_type: UploadType, rows: Vec<RowRecord>) {
    let started = Instant::now();
    let total = rows.len();

    let columns = policy(upload_type);
    let mut seen = HashSet::new();

    for (idx, row) in rows.iter().enumerate() {
        tokio::time::sleep(state.tick).await;

        let email = row.value(columns.email);
        let failure = if !has_identity(row, upload_type) {
            Some("Missing identifying fields")
        } else if !seen.insert(normalize_email(email)) {
            Some("Duplicate email in upload")
        } else {
            None
        };

        let mut jobs = state.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return;
        };
        if let Some(reason) = failure {
            job.status.errors.push(JobRecordError {
                name: Some(display_name(row, upload_type)),
                email: Some(email.to_string()),
                id: Some((idx + 1).to_string()),
                reason: reason.to_string(),
            });
        }
        let errors = std::mem::take(&mut job.status.errors);
        job.status = JobStatus {
            errors,
            ..JobStatus::processing(idx + 1, total)
        };
    }

    let mut jobs = state.jobs.write().await;
    if let Some(job) = jobs.get_mut(&job_id) {
        let failed = job.status.errors.len();
        job.status.duration = Some(format_duration(started.elapsed()));
        if failed == total {
            job.status.status = JobState::Failed;
            job.status.error = Some("No records could be processed".to_string());
            log_warning(format!("Job {} failed", job_id));
        } else {
            job.status.status = JobState::Completed;
            log_success(format!("Job {} completed: {} ok, {} failed", job_id, total - failed, failed));
        }
        job.finished_at = Some(Instant::now());
    }
}

async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiReply<JobStatus> {
    let mut jobs = state.jobs.write().await;
    jobs.retain(|_, job| job.finished_at.map_or(true, |t| t.elapsed() < state.ttl));

    match jobs.get(&job_id) {
        Some(job) => Ok(Json(job.status.clone())),
        None => Err((StatusCode::NOT_FOUND, Json(error_response(&format!("Job {} not found", job_id))))),
    }
}

fn display_name(row: &RowRecord, upload_type: UploadType) -> String {
    policy(upload_type)
        .names
        .iter()
        .map(|column| row.value(column))
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_duration(elapsed: Duration) -> String {
    let d = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
    if d.num_minutes() > 0 {
        format!("{}m {}s", d.num_minutes(), d.num_seconds() % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
