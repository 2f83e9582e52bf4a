// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP response envelope (§4.6): `{ data, message, request_id,
//! timestamp }`, shared by success and error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gwa_core::GwaError;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    message: String,
    request_id: String,
    timestamp: String,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Build a success response: 2xx status, optional `data`, a human
/// `message`, and the request's correlation ID.
pub fn ok<T: Serialize>(
    status: StatusCode,
    data: Option<T>,
    message: impl Into<String>,
    request_id: &str,
) -> Response {
    let body = Envelope {
        data,
        message: message.into(),
        request_id: request_id.to_string(),
        timestamp: now_rfc3339(),
    };
    (status, Json(body)).into_response()
}

/// An error carrying the request ID it occurred under, so handlers can
/// build the full envelope without threading the ID through every
/// return path by hand.
pub struct ApiError {
    pub err: GwaError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(err: GwaError, request_id: impl Into<String>) -> Self {
        Self { err, request_id: request_id.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.err.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            let correlation_id =
                self.err.correlation_id.clone().unwrap_or_else(|| self.request_id.clone());
            error!(
                request_id = %self.request_id,
                correlation_id = %correlation_id,
                error_kind = self.err.kind.as_str(),
                message = %self.err.message,
                "request failed"
            );
        }

        let data: Value = serde_json::json!({ "error_kind": self.err.kind.as_str() });
        let body = Envelope {
            data: Some(data),
            message: self.err.message.clone(),
            request_id: self.request_id,
            timestamp: now_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
