// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared by every layer of the control plane (§7).
//!
//! Each [`ErrorKind`] maps to exactly one HTTP status; the mapping lives
//! here (rather than in `gwa-daemon`) so that lifecycle/lock/config/
//! supervisor crates can construct errors that already carry their final
//! client-facing shape.

use thiserror::Error;

/// A distinct, client-mappable error kind (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    NotFound,
    AlreadyExists,
    Conflict,
    PortInUse,
    Timeout,
    SupervisorUnavailable,
    InternalError,
}

impl ErrorKind {
    /// HTTP status code this kind maps to.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict | ErrorKind::PortInUse => 409,
            ErrorKind::Timeout => 504,
            ErrorKind::SupervisorUnavailable => 503,
            ErrorKind::InternalError => 500,
        }
    }

    /// Stable lowercase wire identifier, e.g. for `data.error_kind` in the
    /// HTTP envelope.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PortInUse => "port_in_use",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SupervisorUnavailable => "supervisor_unavailable",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// The control plane's top-level error type. Carries a [`ErrorKind`], a
/// human message, and an optional correlation ID for 5xx responses
/// (logged, never echoed to the client body per §7's propagation policy).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GwaError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl GwaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), correlation_id: None }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn port_in_use(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PortInUse, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn supervisor_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SupervisorUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Wrap with `operation`/`port` context, per §7's propagation policy
    /// for renderer I/O errors and RPC faults.
    pub fn with_context(mut self, operation: &str, port: u16) -> Self {
        self.message = format!("{operation} (port {port}): {}", self.message);
        self
    }
}

impl From<std::io::Error> for GwaError {
    fn from(e: std::io::Error) -> Self {
        GwaError::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        invalid_request = { ErrorKind::InvalidRequest, 400 },
        unauthorized = { ErrorKind::Unauthorized, 401 },
        not_found = { ErrorKind::NotFound, 404 },
        already_exists = { ErrorKind::AlreadyExists, 409 },
        conflict = { ErrorKind::Conflict, 409 },
        port_in_use = { ErrorKind::PortInUse, 409 },
        timeout = { ErrorKind::Timeout, 504 },
        supervisor_unavailable = { ErrorKind::SupervisorUnavailable, 503 },
        internal_error = { ErrorKind::InternalError, 500 },
    )]
    fn status_codes_match_spec_table(kind: ErrorKind, expected: u16) {
        assert_eq!(kind.status_code(), expected);
    }

    #[test]
    fn with_context_prefixes_message() {
        let err = GwaError::internal("rename failed").with_context("WriteConfig", 3001);
        assert_eq!(err.message, "WriteConfig (port 3001): rename failed");
    }
}
