// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting middleware, applied in the order the spec fixes (§4.6):
//! request ID, access log, panic recovery (via `tower_http::catch_panic`
//! in `router.rs`), bearer auth.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;
use tracing::info;
use uuid::Uuid;

use crate::envelope::ApiError;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The request ID for the current request, attached as an extension by
/// [`request_id`] and read by handlers needing to build an envelope.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Middleware 1: echo `X-Request-ID` if present, otherwise mint one.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Middleware 2: structured access log with duration, status, request
/// ID, remote address. `remote_addr` is logged as `"-"` when no
/// `ConnectInfo` is available (e.g. when the router is driven directly
/// through `tower::ServiceExt::oneshot` in tests rather than served
/// behind `into_make_service_with_connect_info`).
pub async fn access_log(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id =
        req.extensions().get::<RequestId>().map(|r| r.0.clone()).unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;

    match connect_info {
        Some(ConnectInfo(addr)) => info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis(),
            request_id = %request_id,
            remote_addr = %addr,
            "request handled"
        ),
        None => info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis(),
            request_id = %request_id,
            remote_addr = "-",
            "request handled"
        ),
    }
    response
}

/// Middleware 4: bearer authentication, constant-time compared against
/// `admin_token`. Runs `/healthz` and `/readyz` exempt (handled by not
/// being nested under this layer in the router). Port-range validation
/// on `/admin/instances/{port}` routes is checked here first so a
/// malformed path returns 400 without requiring a valid token (§4.6:
/// "non-numeric or out-of-range values → 400 before
/// authentication-dependent work").
pub async fn bearer_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let request_id =
        req.extensions().get::<RequestId>().map(|r| r.0.clone()).unwrap_or_default();

    if let Some(port_segment) = instances_port_segment(req.uri().path()) {
        if parse_port(port_segment).is_none() {
            return ApiError::new(
                gwa_core::GwaError::invalid_request(format!(
                    "invalid port path parameter: {port_segment:?}"
                )),
                request_id,
            )
            .into_response();
        }
    }

    let Some(token) = bearer_token(&req) else {
        return ApiError::new(
            gwa_core::GwaError::new(gwa_core::ErrorKind::Unauthorized, "missing or malformed bearer token"),
            request_id,
        )
        .into_response();
    };

    if !constant_time_eq(&token, state.admin_token()) {
        return ApiError::new(
            gwa_core::GwaError::new(gwa_core::ErrorKind::Unauthorized, "invalid bearer token"),
            request_id,
        )
        .into_response();
    }

    next.run(req).await
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    let header = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn instances_port_segment(path: &str) -> Option<&str> {
    path.strip_prefix("/admin/instances/")
}

fn parse_port(segment: &str) -> Option<u16> {
    let port: u32 = segment.parse().ok()?;
    let port = u16::try_from(port).ok()?;
    (port >= gwa_core::MIN_PORT).then_some(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_port_segment_extracts_trailing_path_component() {
        assert_eq!(instances_port_segment("/admin/instances/3001"), Some("3001"));
        assert_eq!(instances_port_segment("/admin/instances"), None);
        assert_eq!(instances_port_segment("/healthz"), None);
    }

    #[test]
    fn parse_port_rejects_non_numeric_and_out_of_range() {
        assert_eq!(parse_port("3001"), Some(3001));
        assert_eq!(parse_port("abc"), None);
        assert_eq!(parse_port("80"), None);
        assert_eq!(parse_port("99999999"), None);
    }

    #[test]
    fn constant_time_eq_matches_ordinary_equality() {
        assert!(constant_time_eq("secret-token", "secret-token"));
        assert!(!constant_time_eq("secret-token", "other-token"));
        assert!(!constant_time_eq("short", "longer-value"));
    }
}
