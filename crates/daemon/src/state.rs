// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use gwa_lifecycle::LifecycleManager;
use gwa_supervisor::SupervisorClient;

/// Shared, cheaply-cloneable handle every handler receives via
/// `axum::extract::State`.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    lifecycle: LifecycleManager,
    supervisor: Arc<dyn SupervisorClient>,
    admin_token: String,
    readyz_timeout: Duration,
}

impl AppState {
    pub fn new(
        lifecycle: LifecycleManager,
        supervisor: Arc<dyn SupervisorClient>,
        admin_token: String,
        readyz_timeout: Duration,
    ) -> Self {
        Self(Arc::new(Inner { lifecycle, supervisor, admin_token, readyz_timeout }))
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.0.lifecycle
    }

    pub fn supervisor(&self) -> &dyn SupervisorClient {
        self.0.supervisor.as_ref()
    }

    pub fn admin_token(&self) -> &str {
        &self.0.admin_token
    }

    pub fn readyz_timeout(&self) -> Duration {
        self.0.readyz_timeout
    }
}
