// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so lock timeouts and convergence polling are testable
//! without real sleeps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A source of monotonic time and async sleep, mockable in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Sleep for `dur`. Real clocks await `tokio::time::sleep`; fake clocks
    /// advance their internal cursor instantly so polling-loop tests run in
    /// microseconds instead of real wall time.
    fn sleep(&self, dur: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
}

/// Real clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(dur))
    }
}

/// Fake clock for deterministic tests: `now()` advances only when `advance`
/// is called or when `sleep` is awaited (which advances and returns
/// immediately, no real delay).
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Instant::now())) }
    }

    pub fn advance(&self, dur: Duration) {
        let mut guard = self.inner.lock();
        *guard += dur;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock()
    }

    fn sleep(&self, dur: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        self.advance(dur);
        Box::pin(std::future::ready(()))
    }
}
