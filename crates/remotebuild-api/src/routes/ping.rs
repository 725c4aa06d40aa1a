//! Ping endpoint.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;

use crate::response::{success, PingRequest, StringResponse};

pub async fn ping(headers: HeaderMap, Json(_request): Json<PingRequest>) -> Response {
    let payload = if headers.contains_key(AUTHORIZATION) {
        "Authorized pong"
    } else {
        "pong"
    };

    success(StringResponse {
        content: payload.to_string(),
    })
}
