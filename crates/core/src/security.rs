// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared types for the Security Validator (§3, §4.5). The checks
//! themselves live in `gwa-security`; these types are shared so
//! `gwa-daemon` can log and (optionally) act on them without depending on
//! the validator's internals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A single finding from the Security Validator (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityWarning {
    pub level: SecurityLevel,
    pub code: String,
    pub message: String,
}

impl SecurityWarning {
    pub fn new(level: SecurityLevel, code: &str, message: impl Into<String>) -> Self {
        Self { level, code: code.to_string(), message: message.into() }
    }
}
