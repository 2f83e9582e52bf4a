// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Security Validator (spec §4.5): classifies the process-wide
//! configuration against weak-credential rules and emits structured
//! warnings without blocking operation, mirroring the accumulate-then-
//! report shape of the shell crate's AST validator.

use gwa_core::SecurityLevel;
pub use gwa_core::SecurityWarning;
use subtle::ConstantTimeEq;

const WEAK_TOKEN_BLACKLIST: &[&str] =
    &["admin", "secret", "dev-token-123", "changeme", "password", "token"];

const WEAK_BASIC_AUTH_PAIRS: &[(&str, &str)] =
    &[("admin", "admin"), ("admin", "password"), ("root", "root"), ("admin", "")];

const MIN_TOKEN_LEN: usize = 32;
const MIN_BASIC_AUTH_PASSWORD_LEN: usize = 8;
const MIN_WEBHOOK_SECRET_LEN: usize = 16;

/// What the validator needs to know about the running process to check
/// it against the weak-credential rules (§4.5). Assembled by the daemon
/// crate from `ProcessConfig` at startup, and optionally re-derived per
/// mutating request from the instance's own config.
pub struct SecurityContext<'a> {
    pub admin_token: &'a str,
    pub basic_auth: &'a str,
    pub webhook_secret: Option<&'a str>,
    pub supervisor_url: &'a str,
}

/// Run every check and collect the resulting warnings. Never fails:
/// weak configuration is reported, not rejected, unless the caller
/// separately escalates via [`has_critical`].
pub fn validate(ctx: &SecurityContext<'_>) -> Vec<SecurityWarning> {
    let mut warnings = Vec::new();
    check_admin_token(ctx.admin_token, &mut warnings);
    check_basic_auth(ctx.basic_auth, &mut warnings);
    check_webhook_secret(ctx.webhook_secret, &mut warnings);
    check_supervisor_transport(ctx, &mut warnings);
    warnings
}

/// True if any warning reached [`SecurityLevel::Critical`]. Used by the
/// daemon's strict-security startup gate.
pub fn has_critical(warnings: &[SecurityWarning]) -> bool {
    warnings.iter().any(|w| w.level == SecurityLevel::Critical)
}

fn check_admin_token(token: &str, warnings: &mut Vec<SecurityWarning>) {
    if token.is_empty() {
        warnings.push(SecurityWarning::new(
            SecurityLevel::Critical,
            "weak_admin_token",
            "admin bearer token is empty",
        ));
        return;
    }
    if token.len() < MIN_TOKEN_LEN {
        warnings.push(SecurityWarning::new(
            SecurityLevel::Critical,
            "weak_admin_token",
            format!("admin bearer token is shorter than {MIN_TOKEN_LEN} characters"),
        ));
        return;
    }
    if WEAK_TOKEN_BLACKLIST.iter().any(|weak| constant_time_str_eq(weak, token)) {
        warnings.push(SecurityWarning::new(
            SecurityLevel::Critical,
            "weak_admin_token",
            "admin bearer token matches a known-weak value",
        ));
    }
}

fn check_basic_auth(basic_auth: &str, warnings: &mut Vec<SecurityWarning>) {
    if basic_auth.is_empty() {
        return;
    }
    let (user, password) = basic_auth.split_once(':').unwrap_or((basic_auth, ""));

    if password.is_empty() || password.len() < MIN_BASIC_AUTH_PASSWORD_LEN {
        warnings.push(SecurityWarning::new(
            SecurityLevel::Critical,
            "weak_basic_auth",
            format!(
                "basic_auth password is empty or shorter than {MIN_BASIC_AUTH_PASSWORD_LEN} characters"
            ),
        ));
        return;
    }
    if WEAK_BASIC_AUTH_PAIRS
        .iter()
        .any(|(u, p)| constant_time_str_eq(u, user) && constant_time_str_eq(p, password))
    {
        warnings.push(SecurityWarning::new(
            SecurityLevel::Critical,
            "weak_basic_auth",
            "basic_auth matches a known-default credential pair",
        ));
    }
}

fn check_webhook_secret(secret: Option<&str>, warnings: &mut Vec<SecurityWarning>) {
    let Some(secret) = secret else { return };
    if secret.is_empty() {
        return;
    }
    if constant_time_str_eq(secret, "secret") || secret.len() < MIN_WEBHOOK_SECRET_LEN {
        warnings.push(SecurityWarning::new(
            SecurityLevel::High,
            "weak_webhook_secret",
            format!("webhook_secret is a known-weak value or shorter than {MIN_WEBHOOK_SECRET_LEN} characters"),
        ));
    }
}

fn check_supervisor_transport(ctx: &SecurityContext<'_>, warnings: &mut Vec<SecurityWarning>) {
    let Ok(url) = url_host_is_loopback(ctx.supervisor_url) else {
        return;
    };
    if url {
        return;
    }

    let uses_tls = ctx.supervisor_url.starts_with("https://");
    if !uses_tls {
        warnings.push(SecurityWarning::new(
            SecurityLevel::High,
            "supervisor_transport_no_tls",
            "supervisor endpoint is non-loopback and not using TLS",
        ));
    }

    // Re-use the same known-default pair list: a non-loopback supervisor
    // endpoint combined with default creds is worse than either alone.
    if let Some((user, password)) = ctx.basic_auth.split_once(':') {
        if WEAK_BASIC_AUTH_PAIRS
            .iter()
            .any(|(u, p)| constant_time_str_eq(u, user) && constant_time_str_eq(p, password))
        {
            warnings.push(SecurityWarning::new(
                SecurityLevel::Critical,
                "non_loopback_default_creds",
                "supervisor endpoint is non-loopback and uses known-default credentials",
            ));
        }
    }
}

/// Crude host-is-loopback check good enough for the warning heuristic:
/// anything that isn't `127.0.0.1`/`localhost`/`::1` is treated as
/// potentially remote.
fn url_host_is_loopback(url: &str) -> Result<bool, ()> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme.split(['/', ':']).next().unwrap_or("");
    Ok(matches!(host, "127.0.0.1" | "localhost" | "::1" | ""))
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}
