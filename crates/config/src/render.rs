// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic rendering of an `InstanceConfig` into a supervisor
//! program fragment (spec §4.1, §6.1).

use std::path::{Path, PathBuf};

use gwa_core::{ErrorKind, GwaError, InstanceConfig};
use thiserror::Error;

use crate::atomic::write_atomic;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("binary not found or not executable: {0}")]
    BinaryNotExecutable(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sidecar decode error: {0}")]
    SidecarDecode(#[from] serde_json::Error),
}

impl From<RenderError> for GwaError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::BinaryNotExecutable(path) => GwaError::new(
                ErrorKind::InvalidRequest,
                format!("configured binary is not executable: {}", path.display()),
            ),
            RenderError::Io(source) => GwaError::internal(format!("config I/O error: {source}")),
            RenderError::SidecarDecode(source) => {
                GwaError::internal(format!("config sidecar decode error: {source}"))
            }
        }
    }
}

/// One flag this renderer knows how to emit, in fixed order. Order here
/// IS the contract: two calls with identical `InstanceConfig` must
/// produce byte-identical output (§4.1 Determinism).
enum FlagValue {
    /// Always emitted, rendered as `true`/`false`.
    Bool(bool),
    /// Always emitted as a bare (unquoted) value.
    Bare(String),
    /// Omitted entirely when `None` or empty; quoted when present.
    OptionalString(Option<String>),
}

fn flags(cfg: &InstanceConfig) -> Vec<(&'static str, FlagValue)> {
    vec![
        ("port", FlagValue::Bare(cfg.port.to_string())),
        (
            "basic-auth",
            FlagValue::OptionalString(
                (!cfg.basic_auth.is_empty()).then(|| cfg.basic_auth.clone()),
            ),
        ),
        ("debug", FlagValue::Bool(cfg.debug)),
        ("os", FlagValue::OptionalString(Some(cfg.os_name.clone()))),
        ("base-path", FlagValue::OptionalString(cfg.base_path.clone())),
        ("auto-reply", FlagValue::Bool(cfg.auto_reply)),
        ("auto-mark-read", FlagValue::Bool(cfg.auto_mark_read)),
        ("webhook", FlagValue::OptionalString(cfg.webhook_url.clone())),
        ("webhook-secret", FlagValue::OptionalString(cfg.webhook_secret.clone())),
        ("account-validation", FlagValue::Bool(cfg.account_validation)),
        ("chat-storage", FlagValue::Bool(cfg.chat_storage)),
        ("proxy", FlagValue::OptionalString(cfg.proxy_url.clone())),
        ("proxy-no-websocket", FlagValue::Bool(cfg.proxy_no_websocket)),
        ("proxy-only-login", FlagValue::Bool(cfg.proxy_only_login)),
        ("proxy-no-media", FlagValue::Bool(cfg.proxy_no_media)),
    ]
}

/// Escape a value for inclusion inside a double-quoted token: backslash
/// and double-quote are escaped, matching §9's "tokenized builder with
/// explicit escape" guidance.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn env_key(flag: &str) -> String {
    flag.to_uppercase().replace('-', "_")
}

/// Render the full supervisor fragment text for `cfg`. Deterministic:
/// identical inputs produce byte-identical output (§8 round-trip law).
pub fn render_fragment(cfg: &InstanceConfig) -> String {
    let mut command_parts = vec![
        cfg.binary_path.display().to_string(),
        "rest".to_string(),
    ];
    let mut env_parts = Vec::new();

    for (flag, value) in flags(cfg) {
        match value {
            FlagValue::Bool(b) => {
                command_parts.push(format!("--{flag}={}", b));
                env_parts.push(format!("{}=\"{}\"", env_key(flag), b));
            }
            FlagValue::Bare(s) => {
                command_parts.push(format!("--{flag}={s}"));
                env_parts.push(format!("{}=\"{s}\"", env_key(flag)));
            }
            FlagValue::OptionalString(Some(s)) => {
                command_parts.push(format!("--{flag}={}", quote(&s)));
                env_parts.push(format!("{}={}", env_key(flag), quote(&s)));
            }
            FlagValue::OptionalString(None) => {
                // Empty optional field: no flag, no matching env entry.
            }
        }
    }

    let command = command_parts.join(" ");
    let environment = env_parts.join(",");

    format!(
        "[program:gowa_{port}]\n\
         command={command}\n\
         directory={directory}\n\
         autostart=true\n\
         autorestart=true\n\
         startretries=3\n\
         stdout_logfile={stdout}\n\
         stderr_logfile={stderr}\n\
         environment={environment}\n",
        port = cfg.port,
        directory = cfg.storages_dir().display(),
        stdout = cfg.stdout_log().display(),
        stderr = cfg.stderr_log().display(),
    )
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

fn sidecar_path(cfg: &InstanceConfig) -> PathBuf {
    cfg.conf_dir.join(format!(".gowa-{}.json", cfg.port))
}

/// Render and atomically persist the fragment (and its sidecar) for
/// `cfg`. Creates `conf_dir`, `log_dir`, and the per-port storages
/// directory if missing. Fails if `binary_path` is missing/not
/// executable, if a directory cannot be created, or the final rename
/// fails (§4.1 `WriteConfig`).
pub fn write_config(cfg: &InstanceConfig) -> Result<(), RenderError> {
    if !is_executable(&cfg.binary_path) {
        return Err(RenderError::BinaryNotExecutable(cfg.binary_path.clone()));
    }

    std::fs::create_dir_all(&cfg.conf_dir)?;
    std::fs::create_dir_all(&cfg.log_dir)?;
    std::fs::create_dir_all(cfg.storages_dir())?;

    let fragment = render_fragment(cfg);
    write_atomic(&cfg.fragment_path(), fragment.as_bytes())?;

    let sidecar = serde_json::to_vec_pretty(cfg)?;
    write_atomic(&sidecar_path(cfg), &sidecar)?;

    Ok(())
}

/// Delete the fragment (and sidecar) for `port` if present. Idempotent:
/// absence is not an error. Never touches `{instances_dir}/{port}/`
/// (§4.1 `RemoveConfig`; data retention is the operator's decision).
pub fn remove_config(conf_dir: &Path, port: u16) -> Result<(), RenderError> {
    remove_if_present(&conf_dir.join(format!("gowa-{port}.conf")))?;
    remove_if_present(&conf_dir.join(format!(".gowa-{port}.json")))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Load the last-written effective `InstanceConfig` for `port`, if any.
/// Backed by the sidecar JSON file written alongside the fragment — the
/// data-model note in §3 allows either "derive from fragment parse" or
/// "small sidecar"; this implementation takes the sidecar, since it
/// round-trips every field losslessly rather than only the ones encoded
/// as flags.
pub fn load_effective_config(conf_dir: &Path, port: u16) -> Result<Option<InstanceConfig>, RenderError> {
    let path = conf_dir.join(format!(".gowa-{port}.json"));
    match std::fs::read(&path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// True if a fragment currently exists on disk for `port`.
pub fn fragment_exists(conf_dir: &Path, port: u16) -> bool {
    conf_dir.join(format!("gowa-{port}.conf")).exists()
}
