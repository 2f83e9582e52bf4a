// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the admin API and health endpoints (§4.6).

use std::time::Duration;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gwa_lifecycle::OperationContext;
use serde::Deserialize;
use serde_json::Value;

use crate::envelope::{self, ApiError};
use crate::middleware::RequestId;
use crate::state::AppState;

fn request_id_of(id: &Extension<RequestId>) -> String {
    id.0 .0.clone()
}

/// `POST /admin/instances`. The body carries `port` plus any other
/// `InstanceConfig` fields to override; `port` is pulled out before the
/// rest is handed to the lifecycle manager as an overlay, since `port`
/// is itself an immutable field once an instance exists.
pub async fn create_instance(
    State(state): State<AppState>,
    request_id: Extension<RequestId>,
    Json(mut body): Json<Value>,
) -> Response {
    let rid = request_id_of(&request_id);

    let port = match body
        .as_object_mut()
        .and_then(|obj| obj.remove("port"))
        .and_then(|v| v.as_u64())
        .and_then(|v| u16::try_from(v).ok())
    {
        Some(port) => port,
        None => {
            return ApiError::new(
                gwa_core::GwaError::invalid_request("request body must include an integer `port`"),
                rid,
            )
            .into_response();
        }
    };

    let overlay = body.as_object().filter(|obj| !obj.is_empty()).map(|_| body.clone());

    let ctx = OperationContext::default();
    match state.lifecycle().create_instance(&ctx, port, overlay).await {
        Ok(instance) => envelope::ok(StatusCode::CREATED, Some(instance), "instance created", &rid),
        Err(err) => ApiError::new(err, rid).into_response(),
    }
}

/// `GET /admin/instances/{port}`
pub async fn get_instance(
    State(state): State<AppState>,
    request_id: Extension<RequestId>,
    Path(port): Path<u16>,
) -> Response {
    let rid = request_id_of(&request_id);
    match state.lifecycle().get_instance(port).await {
        Ok(instance) => envelope::ok(StatusCode::OK, Some(instance), "instance retrieved", &rid),
        Err(err) => ApiError::new(err, rid).into_response(),
    }
}

/// `GET /admin/instances`
pub async fn list_instances(
    State(state): State<AppState>,
    request_id: Extension<RequestId>,
) -> Response {
    let rid = request_id_of(&request_id);
    match state.lifecycle().list_instances().await {
        Ok(instances) => envelope::ok(StatusCode::OK, Some(instances), "instances listed", &rid),
        Err(err) => ApiError::new(err, rid).into_response(),
    }
}

/// `PATCH /admin/instances/{port}`
pub async fn update_instance(
    State(state): State<AppState>,
    request_id: Extension<RequestId>,
    Path(port): Path<u16>,
    Json(patch): Json<Value>,
) -> Response {
    let rid = request_id_of(&request_id);
    let ctx = OperationContext::default();
    match state.lifecycle().update_instance(&ctx, port, patch).await {
        Ok(instance) => envelope::ok(StatusCode::OK, Some(instance), "instance updated", &rid),
        Err(err) => ApiError::new(err, rid).into_response(),
    }
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    purge: bool,
}

/// `DELETE /admin/instances/{port}?purge=bool`
pub async fn delete_instance(
    State(state): State<AppState>,
    request_id: Extension<RequestId>,
    Path(port): Path<u16>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let rid = request_id_of(&request_id);
    let ctx = OperationContext::default();
    match state.lifecycle().delete_instance(&ctx, port, query.purge).await {
        Ok(()) => envelope::ok(StatusCode::OK, None::<()>, "instance deleted", &rid),
        Err(err) => ApiError::new(err, rid).into_response(),
    }
}

/// `GET /healthz`: process liveness plus a shallow supervisor ping.
/// Always 200 once the process is serving requests; `supervisor_healthy`
/// reports the ping result without gating the status code (§4.6).
pub async fn healthz(State(state): State<AppState>, request_id: Extension<RequestId>) -> Response {
    let rid = request_id_of(&request_id);
    let supervisor_healthy = state.supervisor().all_process_info().await.is_ok();
    envelope::ok(
        StatusCode::OK,
        Some(serde_json::json!({ "supervisor_healthy": supervisor_healthy })),
        "ok",
        &rid,
    )
}

/// `GET /readyz`: 200 only if the supervisor answers within the
/// configured timeout, 503 otherwise (§4.6).
pub async fn readyz(State(state): State<AppState>, request_id: Extension<RequestId>) -> Response {
    let rid = request_id_of(&request_id);
    let timeout = state.readyz_timeout();
    match tokio::time::timeout(timeout, state.supervisor().all_process_info()).await {
        Ok(Ok(_)) => envelope::ok(StatusCode::OK, Some(serde_json::json!({ "ready": true })), "ready", &rid),
        Ok(Err(e)) => {
            ApiError::new(gwa_core::GwaError::from(e), rid).into_response()
        }
        Err(_elapsed) => ApiError::new(
            gwa_core::GwaError::timeout(format!(
                "supervisor did not respond within {}ms",
                timeout.as_millis()
            )),
            rid,
        )
        .into_response(),
    }
}

pub const DEFAULT_READYZ_TIMEOUT: Duration = Duration::from_secs(1);
