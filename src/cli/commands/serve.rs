//! HTTP job service.
//!
//! Clients upload audio, get a job id back immediately and poll for the transcript.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::PodscribeError;
use crate::jobs::{Job, JobManager, JobResult, DEFAULT_LIST_LIMIT};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared application state.
struct AppState {
    manager: JobManager,
}

/// Run the HTTP job service.
pub async fn run_serve(host: Option<&str>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Transcribe) {
        Output::warning(&format!("Jobs will fail until this is fixed: {}", e));
    }

    let manager = JobManager::new(&settings)?;
    let app = router(manager, settings.max_upload_bytes());

    let host = host.unwrap_or(settings.server.host.as_str());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Podscribe Job Service");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Submit", "POST /submit/{podcast}/{episode}");
    Output::kv("Result", "GET  /result/{job_id}");
    Output::kv("List Jobs", "GET  /jobs");
    Output::kv("Get Job", "GET  /jobs/{job_id}");
    Output::kv("Cleanup", "POST /cleanup");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(manager: JobManager, max_upload_bytes: usize) -> Router {
    let state = Arc::new(AppState { manager });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .route("/submit/{podcast}/{episode}", post(submit))
        .route("/result/{job_id}", get(get_result))
        .route("/cleanup", post(cleanup))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

// === Response Types ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    job_id: String,
    status: String,
}

#[derive(Serialize)]
struct JobListResponse {
    jobs: Vec<Job>,
    total: usize,
}

#[derive(Serialize)]
struct JobDetailResponse {
    job: Job,
    logs: Vec<String>,
}

#[derive(Serialize)]
struct CleanupResponse {
    deleted: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn status_for(error: &PodscribeError) -> StatusCode {
    match error {
        PodscribeError::Validation(_) => StatusCode::BAD_REQUEST,
        PodscribeError::NotFound(_) => StatusCode::NOT_FOUND,
        PodscribeError::OutputMissing(_) => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: PodscribeError) -> Response {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", error);
    }
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.list_recent(DEFAULT_LIST_LIMIT).await {
        Ok(jobs) => Json(JobListResponse {
            total: jobs.len(),
            jobs,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    let job = match state.manager.get_status(&job_id).await {
        Ok(job) => job,
        Err(e) => return error_response(e),
    };

    match state.manager.logs(&job_id).await {
        Ok(logs) => Json(JobDetailResponse {
            job,
            logs: logs.iter().map(|entry| entry.formatted()).collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Path((podcast, episode)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    match state.manager.submit(&podcast, &episode, &body).await {
        Ok(submission) => (StatusCode::ACCEPTED, Json(submission)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_result(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.manager.get_result(&job_id).await {
        Ok(JobResult::Pending(status)) => (
            StatusCode::ACCEPTED,
            Json(JobStatusResponse {
                job_id,
                status: status.to_string(),
            }),
        )
            .into_response(),
        Ok(JobResult::Ready(bytes)) => {
            ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn cleanup(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.cleanup_stuck().await {
        Ok(deleted) => Json(CleanupResponse { deleted }).into_response(),
        Err(e) => error_response(e),
    }
}
