// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed client for the supervisor's process-control API (§4.3).
//!
//! `SupervisorClient` is a trait so the lifecycle manager can depend on
//! it abstractly rather than on a global client singleton (Design Note:
//! "Global mutable client reference" is rejected in favor of dependency
//! injection).

use std::time::Duration;

use async_trait::async_trait;
use gwa_core::{program_name, ErrorKind, GwaError};
use thiserror::Error;

use crate::xmlrpc::{decode_response, encode_call, MethodResponse, Value, XmlRpcError};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("supervisor codec error: {0}")]
    Codec(#[from] XmlRpcError),
    #[error("supervisor fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("unexpected response shape from supervisor: {0}")]
    UnexpectedShape(String),
}

impl From<SupervisorError> for GwaError {
    fn from(e: SupervisorError) -> Self {
        match &e {
            SupervisorError::Transport(_) => {
                GwaError::supervisor_unavailable(e.to_string())
            }
            SupervisorError::Fault { code, message } => map_fault(*code, message),
            SupervisorError::Codec(_) | SupervisorError::UnexpectedShape(_) => {
                GwaError::internal(e.to_string())
            }
        }
    }
}

/// supervisord's process-control XML-RPC faults use a small fixed set of
/// codes (§6.2); `BAD_NAME` means the program isn't registered yet,
/// `ALREADY_STARTED`/`NOT_RUNNING` are state conflicts, everything else
/// collapses to a generic internal error so a new fault code doesn't
/// silently become a 200.
fn map_fault(code: i64, message: &str) -> GwaError {
    match code {
        10 => GwaError::not_found(format!("program not registered with supervisor: {message}")),
        60 => GwaError::conflict(format!("program already started: {message}")),
        70 => GwaError::conflict(format!("program not running: {message}")),
        _ => GwaError::internal(format!("supervisor fault {code}: {message}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub state_name: String,
    pub pid: u32,
    pub uptime_secs: u64,
}

fn process_info_from_value(value: &Value) -> Result<ProcessInfo, SupervisorError> {
    let name = value
        .field("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SupervisorError::UnexpectedShape("missing name".into()))?
        .to_string();
    let state_name = value
        .field("statename")
        .and_then(Value::as_str)
        .ok_or_else(|| SupervisorError::UnexpectedShape("missing statename".into()))?
        .to_string();
    let pid = value
        .field("pid")
        .and_then(Value::as_int)
        .ok_or_else(|| SupervisorError::UnexpectedShape("missing pid".into()))?
        .max(0) as u32;
    let now = value
        .field("now")
        .and_then(Value::as_int)
        .unwrap_or(0);
    let start = value
        .field("start")
        .and_then(Value::as_int)
        .unwrap_or(now);
    let uptime_secs = (now - start).max(0) as u64;

    Ok(ProcessInfo { name, state_name, pid, uptime_secs })
}

/// The process-control surface the lifecycle manager needs from a
/// supervisor daemon. Implemented over XML-RPC by [`HttpSupervisorClient`]
/// in production and faked in lifecycle tests.
#[async_trait]
pub trait SupervisorClient: Send + Sync {
    async fn reload(&self) -> Result<(), SupervisorError>;
    async fn start_program(&self, port: u16) -> Result<(), SupervisorError>;
    async fn stop_program(&self, port: u16) -> Result<(), SupervisorError>;
    async fn remove_program(&self, port: u16) -> Result<(), SupervisorError>;
    async fn process_info(&self, port: u16) -> Result<ProcessInfo, SupervisorError>;
    async fn all_process_info(&self) -> Result<Vec<ProcessInfo>, SupervisorError>;
}

/// Default transport: HTTP Basic auth + hand-rolled XML-RPC codec over
/// `reqwest` (§6.2).
pub struct HttpSupervisorClient {
    http: reqwest::Client,
    url: String,
    user: Option<String>,
    pass: Option<String>,
}

impl HttpSupervisorClient {
    pub fn new(
        url: impl Into<String>,
        user: Option<String>,
        pass: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SupervisorError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into(), user, pass })
    }

    async fn call(&self, method: &str, args: &[Value]) -> Result<Value, SupervisorError> {
        let body = encode_call(method, args)?;
        let mut request = self.http.post(&self.url).header("Content-Type", "text/xml").body(body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.pass.clone());
        }
        let response = request.send().await?;
        let bytes = response.bytes().await?;
        match decode_response(&bytes)? {
            MethodResponse::Value(v) => Ok(v),
            MethodResponse::Fault { code, message } => Err(SupervisorError::Fault { code, message }),
        }
    }
}

#[async_trait]
impl SupervisorClient for HttpSupervisorClient {
    async fn reload(&self) -> Result<(), SupervisorError> {
        self.call("supervisor.reloadConfig", &[]).await?;
        Ok(())
    }

    async fn start_program(&self, port: u16) -> Result<(), SupervisorError> {
        self.call("supervisor.startProcess", &[Value::String(program_name(port))]).await?;
        Ok(())
    }

    async fn stop_program(&self, port: u16) -> Result<(), SupervisorError> {
        self.call("supervisor.stopProcess", &[Value::String(program_name(port))]).await?;
        Ok(())
    }

    async fn remove_program(&self, port: u16) -> Result<(), SupervisorError> {
        self.call(
            "supervisor.removeProcessGroup",
            &[Value::String(program_name(port))],
        )
        .await?;
        Ok(())
    }

    async fn process_info(&self, port: u16) -> Result<ProcessInfo, SupervisorError> {
        let value = self
            .call("supervisor.getProcessInfo", &[Value::String(program_name(port))])
            .await?;
        process_info_from_value(&value)
    }

    async fn all_process_info(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        let value = self.call("supervisor.getAllProcessInfo", &[]).await?;
        let items = value
            .as_array()
            .ok_or_else(|| SupervisorError::UnexpectedShape("expected array".into()))?;
        items.iter().map(process_info_from_value).collect()
    }
}

/// Map a supervisor state name to the control plane's [`InstanceState`].
///
/// `EXITED` joins `FATAL`/`BACKOFF` under `Fatal` rather than `Stopped`:
/// a cleanly-stopped instance never reaches `EXITED` (supervisord only
/// uses it for a program that ran and quit unexpectedly), and
/// `WaitForState` treats every `Fatal` observation as a terminal failure
/// (§4.4.2).
pub fn parse_instance_state(state_name: &str) -> gwa_core::InstanceState {
    use gwa_core::InstanceState::*;
    match state_name {
        "RUNNING" => Running,
        "STOPPED" => Stopped,
        "STARTING" => Starting,
        "STOPPING" => Stopping,
        "FATAL" | "BACKOFF" | "EXITED" => Fatal,
        _ => Unknown,
    }
}
