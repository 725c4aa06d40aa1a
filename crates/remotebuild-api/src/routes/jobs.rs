//! Job endpoints.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use remotebuild_core::{Error, JobType, UploadType};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::response::{
    envelope, success, AddJobRequest, AddJobResponse, JobInfoResponse, ListJobsResponse,
    OldJobEntry, OldJobsResponse, ResponseStatus, StringResponse,
};
use crate::AppState;

/// Default limit for the historical job listing.
const OLD_JOBS_LIMIT: i64 = 20;

pub async fn add_job(
    State(state): State<AppState>,
    Json(request): Json<AddJobRequest>,
) -> Result<Response, ApiError> {
    if request.job_type.is_empty() {
        return Err(ApiError::Unprocessable("input missing".to_string()));
    }

    let job_type: JobType = request
        .job_type
        .parse()
        .map_err(|_| ApiError::Unprocessable("build type not supported".to_string()))?;

    let upload_type: UploadType = request
        .upload_type
        .parse()
        .map_err(|_| ApiError::from(Error::NoValidUploadMethod))?;

    let item = state
        .jobs
        .add_job(job_type, upload_type, request.args, request.enable_ccache)
        .await?;

    info!(job_id = item.job.id, "Job added");
    Ok(success(AddJobResponse {
        id: item.id,
        job_id: item.job.id,
        position: state
            .jobs
            .queue()
            .queue_position(&item)
            .map(|p| p as i64)
            .unwrap_or(-1),
    }))
}

pub async fn job_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let info = state.jobs.job_info(id).await?;
    Ok(success(JobInfoResponse::from(info)))
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut jobs = Vec::new();
    for item in state.jobs.queue().jobs() {
        let info = state.jobs.job_info(item.job.id).await?;
        jobs.push(JobInfoResponse::from(info));
    }
    Ok(success(ListJobsResponse { jobs }))
}

pub async fn old_jobs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let jobs = state
        .jobs
        .old_jobs(OLD_JOBS_LIMIT)
        .await?
        .into_iter()
        .map(|job| OldJobEntry {
            job_id: job.id,
            created_at: job.created_at,
            result: job.result,
        })
        .collect();
    Ok(success(OldJobsResponse { jobs }))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.jobs.cancel_job(id).await?;
    info!(job_id = id, "Job cancelled");
    Ok(success(StringResponse {
        content: "Cancelled".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub since: i64,
}

/// Live logs of a queued job; falls back to the persisted tail once the job
/// has left the queue. The envelope headers carry the preamble: `"1"` plus
/// the server's unix-seconds timestamp for live logs, `"-1"` for post-hoc
/// logs.
pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let now = Utc::now();

    let mut buf = Vec::new();
    match state
        .jobs
        .job_logs(id, now, query.since, &mut buf, true)
        .await
    {
        Ok(()) => {
            let headers = envelope(ResponseStatus::Success, &now.timestamp().to_string());
            Ok((headers, buf).into_response())
        }
        Err(Error::NotFound(_)) | Err(Error::JobNotRunning) => {
            // The job is no longer live; serve the persisted tail.
            let logs = state.jobs.old_logs(id).await?;
            let headers = envelope(ResponseStatus::Success, "-1");
            Ok((headers, logs).into_response())
        }
        Err(other) => Err(other.into()),
    }
}

pub async fn set_state(
    State(state): State<AppState>,
    Path((id, new_state)): Path<(i64, String)>,
) -> Result<Response, ApiError> {
    match new_state.as_str() {
        "pause" => state.jobs.pause_job(id).await?,
        "resume" => state.jobs.resume_job(id).await?,
        other => {
            return Err(ApiError::Unprocessable(format!(
                "unsupported state change {other:?}"
            )))
        }
    }

    info!(job_id = id, state = %new_state, "Job state changed");
    Ok(success(StringResponse {
        content: new_state,
    }))
}
