// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration (§6.4), environment-sourced.
//!
//! Mirrors the teacher's centralized `oj-daemon::env` module: one function
//! (or field) per setting, env-var first, with a thin `clap` overlay in
//! `gwa-daemon::main` for flag-based overrides. No dynamic reconfiguration.

use std::path::PathBuf;
use std::time::Duration;

/// Process-wide settings consumed at startup (§6.4).
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub admin_token: String,
    pub admin_port: u16,
    pub supervisor_url: String,
    pub supervisor_user: Option<String>,
    pub supervisor_pass: Option<String>,
    pub conf_dir: PathBuf,
    pub instances_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub binary_path: PathBuf,
    pub strict_security: bool,
    pub defaults: InstanceDefaults,
}

/// Default values applied to `InstanceConfig` fields a create request omits.
#[derive(Debug, Clone)]
pub struct InstanceDefaults {
    pub os_name: String,
    pub debug: bool,
    pub auto_reply: bool,
    pub auto_mark_read: bool,
    pub account_validation: bool,
    pub chat_storage: bool,
    pub basic_auth: String,
}

impl Default for InstanceDefaults {
    fn default() -> Self {
        Self {
            os_name: "Chrome".to_string(),
            debug: false,
            auto_reply: false,
            auto_mark_read: false,
            account_validation: true,
            chat_storage: true,
            basic_auth: String::new(),
        }
    }
}

/// Error loading process configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

impl ProcessConfig {
    /// Load from environment variables, as described in spec §6.4.
    /// `admin_token` is the only strictly required setting; everything
    /// else has a documented default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_token =
            std::env::var("GWA_ADMIN_TOKEN").map_err(|_| ConfigError::MissingVar("GWA_ADMIN_TOKEN"))?;

        Ok(Self {
            admin_token,
            admin_port: env_u16("GWA_ADMIN_PORT", 8088),
            supervisor_url: std::env::var("GWA_SUPERVISOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9001/RPC2".to_string()),
            supervisor_user: std::env::var("GWA_SUPERVISOR_USER").ok(),
            supervisor_pass: std::env::var("GWA_SUPERVISOR_PASS").ok(),
            conf_dir: env_path("GWA_CONF_DIR", "/etc/gowa/conf.d"),
            instances_dir: env_path("GWA_INSTANCES_DIR", "/var/lib/gowa/instances"),
            log_dir: env_path("GWA_LOG_DIR", "/var/log/gowa"),
            lock_dir: env_path("GWA_LOCK_DIR", std::env::temp_dir().to_string_lossy().as_ref()),
            binary_path: env_path("GWA_BINARY_PATH", "/usr/local/bin/gowa"),
            strict_security: env_bool("GWA_STRICT_SECURITY"),
            defaults: InstanceDefaults::default(),
        })
    }

    /// Default acquisition deadline for the port lock (§4.2): 30s.
    pub fn default_lock_timeout() -> Duration {
        Duration::from_secs(30)
    }

    /// Default state-convergence deadline (§4.4.1 step 8): 20s.
    pub fn default_convergence_timeout() -> Duration {
        Duration::from_secs(20)
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_bool(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes"))
}
