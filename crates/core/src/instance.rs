// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types for the data model in spec §3: `InstanceConfig` (desired)
//! and `Instance` (observed, derived from the supervisor).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The full set of knobs that parameterize one worker instance (§3).
///
/// Identified uniquely by `port`. Serializes as the body of `CreateRequest`
/// and (partially) `PATCH /admin/instances/{port}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub port: u16,
    pub binary_path: PathBuf,
    pub conf_dir: PathBuf,
    pub instances_dir: PathBuf,
    pub log_dir: PathBuf,
    #[serde(default)]
    pub basic_auth: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_os_name")]
    pub os_name: String,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub auto_reply: bool,
    #[serde(default)]
    pub auto_mark_read: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_true")]
    pub account_validation: bool,
    #[serde(default = "default_true")]
    pub chat_storage: bool,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub proxy_no_websocket: bool,
    #[serde(default)]
    pub proxy_only_login: bool,
    #[serde(default)]
    pub proxy_no_media: bool,
}

fn default_os_name() -> String {
    "Chrome".to_string()
}

fn default_true() -> bool {
    true
}

impl InstanceConfig {
    /// Directory holding this instance's on-disk worker state.
    pub fn storages_dir(&self) -> PathBuf {
        self.instances_dir.join(self.port.to_string()).join("storages")
    }

    /// Stdout log path for this instance.
    pub fn stdout_log(&self) -> PathBuf {
        self.log_dir.join(format!("gowa_{}.out.log", self.port))
    }

    /// Stderr log path for this instance.
    pub fn stderr_log(&self) -> PathBuf {
        self.log_dir.join(format!("gowa_{}.err.log", self.port))
    }

    /// Path to the rendered supervisor fragment for this instance.
    pub fn fragment_path(&self) -> PathBuf {
        self.conf_dir.join(format!("gowa-{}.conf", self.port))
    }
}

/// Observable state of a supervisor-managed program (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Running,
    Stopped,
    Starting,
    Stopping,
    Fatal,
    Unknown,
}

impl InstanceState {
    /// States from which a `WaitForState` poll should short-circuit rather
    /// than keep waiting (§4.4.2).
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, InstanceState::Fatal)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceState::Running => "RUNNING",
            InstanceState::Stopped => "STOPPED",
            InstanceState::Starting => "STARTING",
            InstanceState::Stopping => "STOPPING",
            InstanceState::Fatal => "FATAL",
            InstanceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// The runtime view of an instance, derived from the supervisor and never
/// persisted by the control plane (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub port: u16,
    pub state: InstanceState,
    pub pid: u32,
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
