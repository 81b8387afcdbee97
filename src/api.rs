//! HTTP surface for ragline.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /api/upload` – Accept a PDF, stage it locally, create a `Pending`
//!   job record, and hand the job to the background workers. Returns the job id
//!   immediately; the request never waits for the pipeline.
//! - `GET /api/jobs/{job_id}` – Poll the current job record (status, step, error).
//! - `POST /api/chat` – Submit a retrieval-augmented query; returns a result handle.
//! - `GET /api/chat/result/{id}` – Poll a query result (pending, done, or failed).
//! - `POST /api/auth/signup` / `POST /api/auth/token` – Account creation and login.
//! - `GET /api/health` – Liveness probe.
//!
//! Handlers are thin adapters: every decision about job state lives in the
//! orchestrator, and every durable write goes through the injected stores.

use axum::{
    Json, Router,
    extract::{Multipart, Path as AxumPath, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, UserStore};
use crate::dispatch::{Dispatcher, QueryOutcome};
use crate::jobs::{JobStore, JobStoreError, JobStatus, StagedUpload};

/// Shared state injected into every handler.
pub struct AppState {
    /// Submission handle for the background worker pool.
    pub dispatcher: Dispatcher,
    /// Durable job records.
    pub job_store: Arc<dyn JobStore>,
    /// Accounts and bearer sessions.
    pub user_store: Arc<UserStore>,
}

/// Build the HTTP router exposing the API surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload_file))
        .route("/api/jobs/:job_id", get(get_job))
        .route("/api/chat", post(submit_chat))
        .route("/api/chat/result/:result_id", get(chat_result))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/token", post(login))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "message": "All OK!" }))
}

/// Accept a PDF upload, create the job record, and enqueue the pipeline run.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let owner = resolve_owner(&state, &headers).await;

    let mut staged: Option<(PathBuf, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if field.content_type() != Some("application/pdf") {
            return Err(AppError::BadRequest("Invalid file type".into()));
        }
        let filename = sanitize_filename(field.file_name());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(err.to_string()))?;
        let path = stage_to_tmp(&bytes, &filename)
            .await
            .map_err(|err| AppError::Internal(err.to_string()))?;
        staged = Some((path, filename));
        break;
    }

    let Some((path, filename)) = staged else {
        return Err(AppError::BadRequest("Missing file field".into()));
    };

    let job_id = Uuid::new_v4();
    state
        .job_store
        .create(job_id, &filename, owner)
        .await?;

    let upload = StagedUpload {
        job_id,
        path: path.clone(),
        filename,
    };
    if let Err(err) = state.dispatcher.submit_ingest(upload) {
        // The record exists but will never run; close it out and drop the copy.
        let _ = state
            .job_store
            .update(job_id, JobStatus::Failed, None, Some(err.to_string()))
            .await;
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AppError::Unavailable(err.to_string()));
    }

    tracing::info!(%job_id, "Upload accepted");
    Ok(Json(json!({ "job_id": job_id, "status": "pending" })))
}

/// Poll the current state of a job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<Json<crate::jobs::Job>, AppError> {
    match state.job_store.get(job_id).await? {
        Some(job) => Ok(Json(job)),
        None => Err(AppError::NotFound("Job not found".into())),
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

/// Submit a chat query for background answering.
async fn submit_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query must not be empty".into()));
    }
    let owner = resolve_owner(&state, &headers).await;
    let handle = state
        .dispatcher
        .submit_query(owner, request.query)
        .await
        .map_err(|err| AppError::Unavailable(err.to_string()))?;
    Ok(Json(json!({ "status": "queued", "result_id": handle })))
}

/// Poll the outcome of a submitted chat query.
async fn chat_result(
    State(state): State<Arc<AppState>>,
    AxumPath(result_id): AxumPath<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.dispatcher.fetch_result(result_id).await {
        None => Err(AppError::NotFound("Unknown result id".into())),
        Some(QueryOutcome::Pending) => Ok(Json(json!({ "status": "pending" }))),
        Some(QueryOutcome::Answered(result)) => {
            Ok(Json(json!({ "status": "done", "result": result })))
        }
        Some(QueryOutcome::Failed(error)) => {
            Ok(Json(json!({ "status": "failed", "error": error })))
        }
    }
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

/// Register a new user.
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    state
        .user_store
        .signup(&request.username, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully" })),
    )
        .into_response())
}

/// Verify credentials and issue a bearer session token.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = state
        .user_store
        .login(&request.username, &request.password)
        .await?;
    Ok(Json(json!({ "access_token": token, "token_type": "bearer" })))
}

/// Resolve an optional bearer token to the opaque owner identifier.
async fn resolve_owner(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))?;
    let username = state.user_store.resolve_token(token).await?;
    state.user_store.get_owner_id(&username).await
}

fn sanitize_filename(supplied: Option<&str>) -> String {
    supplied
        .and_then(|name| std::path::Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("uploaded_file")
        .to_string()
}

/// Stage upload bytes in the system temp dir under a collision-free name.
async fn stage_to_tmp(bytes: &[u8], filename: &str) -> std::io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("{}_{filename}", Uuid::new_v4()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::Conflict(detail) => (StatusCode::CONFLICT, detail),
            Self::Unavailable(detail) => (StatusCode::SERVICE_UNAVAILABLE, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<JobStoreError> for AppError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::DuplicateJob(_) => Self::Conflict(err.to_string()),
            JobStoreError::Unavailable(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UsernameTaken(_) => Self::BadRequest("Username already taken".into()),
            AuthError::InvalidCredentials => {
                Self::BadRequest("Incorrect username or password".into())
            }
            AuthError::Hashing(detail) => Self::Internal(detail),
        }
    }
}
