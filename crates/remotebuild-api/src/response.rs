//! Response envelope and DTOs.
//!
//! Every response carries `X-Response-Status` and `X-Response-Message`
//! headers next to the JSON payload; the log endpoint uses them for the
//! stream preamble.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const HEADER_STATUS: &str = "x-response-status";
pub const HEADER_MESSAGE: &str = "x-response-message";

/// Wire value of `X-Response-Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Error,
    Success,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Error => "0",
            ResponseStatus::Success => "1",
        }
    }
}

/// Envelope headers for a response.
pub fn envelope(status: ResponseStatus, message: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(HEADER_STATUS),
        HeaderValue::from_static(status.as_str()),
    );
    if let Ok(value) = HeaderValue::from_str(message) {
        headers.insert(HeaderName::from_static(HEADER_MESSAGE), value);
    }
    headers
}

/// A successful JSON response with envelope headers.
pub fn success<T: Serialize>(payload: T) -> Response {
    (envelope(ResponseStatus::Success, ""), Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct AddJobRequest {
    pub job_type: String,
    pub upload_type: String,
    #[serde(default)]
    pub args: HashMap<String, String>,
    #[serde(default)]
    pub enable_ccache: bool,
}

#[derive(Debug, Serialize)]
pub struct AddJobResponse {
    pub id: i64,
    pub job_id: i64,
    pub position: i64,
}

#[derive(Debug, Serialize)]
pub struct JobInfoResponse {
    pub job_id: i64,
    pub job_type: String,
    pub upload_type: String,
    pub state: String,
    /// Index in the queue, or -1 once the job left it.
    pub position: i64,
    pub running_since: Option<DateTime<Utc>>,
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobInfoResponse>,
}

#[derive(Debug, Serialize)]
pub struct OldJobsResponse {
    pub jobs: Vec<OldJobEntry>,
}

#[derive(Debug, Serialize)]
pub struct OldJobEntry {
    pub job_id: i64,
    pub created_at: DateTime<Utc>,
    pub result: String,
}

/// Response containing only one string.
#[derive(Debug, Serialize)]
pub struct StringResponse {
    pub content: String,
}

impl From<remotebuild_scheduler::JobInfo> for JobInfoResponse {
    fn from(info: remotebuild_scheduler::JobInfo) -> Self {
        Self {
            job_id: info.job_id,
            job_type: info.job_type.to_string(),
            upload_type: info.upload_type.to_string(),
            state: info.state.to_string(),
            position: info.position.map(|p| p as i64).unwrap_or(-1),
            running_since: info.running_since,
            result: info.result,
        }
    }
}
