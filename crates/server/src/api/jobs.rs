//! Job API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use convoy_core::{CreateJobRequest, JobInput, JobSnapshot, OrchestratorError};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// Settings, callback URL and custom data
    #[serde(flatten)]
    pub request: CreateJobRequest,
    /// `{"path": ..}` or `{"url": ..}`
    pub input: JobInput,
}

/// Response for a created job
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub id: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::NotRunning | OrchestratorError::Pool(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OrchestratorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Callback targets must be absolute http(s) URLs.
fn check_callback_url(raw: &str) -> Result<(), ApiError> {
    let url = Url::parse(raw).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("callback_url is not a valid URL: {}", e),
        )
    })?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("callback_url must be an http(s) URL: {}", raw),
        )),
    }
}

/// Local inputs are only accepted from under the configured intake directory.
///
/// Symlinks and `..` are resolved before the check. A file that does not
/// exist yet is resolved through its parent so the job can fail with the
/// usual missing-input error.
async fn resolve_intake_path(intake: Option<&FsPath>, path: &FsPath) -> Result<PathBuf, ApiError> {
    let Some(intake) = intake else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "path inputs are disabled; submit a url input",
        ));
    };
    let outside = || {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("input path is outside the intake directory: {}", path.display()),
        )
    };

    let root = tokio::fs::canonicalize(intake).await.map_err(|e| {
        error!(path = %intake.display(), error = %e, "Intake directory unavailable");
        api_error(StatusCode::SERVICE_UNAVAILABLE, "intake directory unavailable")
    })?;

    let resolved = match tokio::fs::canonicalize(path).await {
        Ok(resolved) => resolved,
        // A dangling symlink could be pointed elsewhere before the job runs.
        Err(_) if tokio::fs::symlink_metadata(path).await.is_ok() => return Err(outside()),
        Err(_) => {
            let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                return Err(outside());
            };
            let parent = tokio::fs::canonicalize(parent)
                .await
                .map_err(|_| outside())?;
            parent.join(name)
        }
    };

    if resolved.starts_with(&root) && resolved != root {
        Ok(resolved)
    } else {
        Err(outside())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a job and queue its input
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    if let Some(url) = &body.request.callback_url {
        check_callback_url(url)?;
    }

    let input = match body.input {
        JobInput::File { path } => JobInput::File {
            path: resolve_intake_path(state.intake_dir(), &path).await?,
        },
        input => input,
    };

    match state.orchestrator().accept(body.request, input) {
        Ok(id) => {
            info!(job_id = %id, "Job accepted");
            Ok((StatusCode::CREATED, Json(CreateJobResponse { id })))
        }
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(error = %e, "Failed to accept job");
            }
            Err(api_error(status, e))
        }
    }
}

/// Get a job snapshot by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    state
        .orchestrator()
        .get(&id)
        .map(Json)
        .map_err(|e| api_error(status_for(&e), e))
}
