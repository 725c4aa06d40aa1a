//! Ccache maintenance endpoints, shelling out to the local `ccache` binary.

use axum::extract::State;
use axum::response::Response;
use tokio::process::Command;
use tracing::error;

use crate::error::ApiError;
use crate::response::{success, StringResponse};
use crate::AppState;

fn ccache_command(state: &AppState, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = state.config.ccache_dir() {
        cmd.env("CCACHE_DIR", dir);
    }
    cmd
}

pub async fn clear(State(state): State<AppState>) -> Result<Response, ApiError> {
    let output = ccache_command(&state, "ccache", &["-c"])
        .output()
        .await
        .map_err(|e| {
            error!("Error cleaning ccache: {e}");
            ApiError::Internal(e.to_string())
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!("Error cleaning ccache: {stderr}");
        return Err(ApiError::Internal(stderr));
    }

    Ok(success(StringResponse {
        content: String::from_utf8_lossy(&output.stdout).into_owned(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let output = ccache_command(&state, "sh", &["-c", "ccache -s | grep -v config"])
        .output()
        .await
        .map_err(|e| {
            error!("Error querying ccache: {e}");
            ApiError::Internal(e.to_string())
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!("Error querying ccache: {stderr}");
        return Err(ApiError::Internal(stderr));
    }

    Ok(success(StringResponse {
        content: String::from_utf8_lossy(&output.stdout).into_owned(),
    }))
}
