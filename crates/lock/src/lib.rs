// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Per-port advisory file locking (spec §4.2).
//!
//! Generalizes the single whole-daemon lock in
//! `oj-daemon::lifecycle::startup::startup_inner` (open-or-create +
//! `fs2::FileExt::try_lock_exclusive`, PID written for diagnostics) to one
//! lock file per port, retried on a ~100ms tick until either the lock is
//! acquired or the caller's context is done.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use gwa_core::{ErrorKind, GwaError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Poll interval while waiting for a contended lock (§4.2).
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default acquisition deadline when the caller does not set one (§4.2).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("port {port} locked by another operation")]
    Contended { port: u16 },
    #[error("lock I/O error for port {port}: {source}")]
    Io { port: u16, #[source] source: std::io::Error },
}

impl From<LockError> for GwaError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Contended { port } => {
                GwaError::new(ErrorKind::Conflict, format!("port {port} locked by another operation"))
            }
            LockError::Io { port, source } => {
                GwaError::internal(format!("lock I/O error for port {port}: {source}"))
            }
        }
    }
}

/// A held advisory lock for one port. Releasing is idempotent: `release()`
/// consumes the handle; dropping an un-released handle also unlocks
/// (best-effort) so a panicking caller never wedges the port forever.
pub struct LockHandle {
    file: Option<File>,
    port: u16,
    path: PathBuf,
}

impl LockHandle {
    /// Release the advisory lock and close the file descriptor.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            fs2::FileExt::unlock(&file)
                .map_err(|source| LockError::Io { port: self.port, source })?;
            drop(file);
            debug!(port = self.port, path = %self.path.display(), "lock released");
        }
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.release_inner();
        }
    }
}

/// Per-port advisory lock manager (§4.2).
#[derive(Debug, Clone)]
pub struct LockManager {
    lock_dir: PathBuf,
}

impl LockManager {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self { lock_dir: lock_dir.into() }
    }

    fn lock_path(&self, port: u16) -> PathBuf {
        self.lock_dir.join(format!("gowa.{port}.lock"))
    }

    /// Acquire the exclusive lock for `port`, retrying every ~100ms until
    /// either the lock is free or `deadline` elapses / `cancel` fires.
    /// Existence of the lock file alone never implies it is held — a
    /// crashed owner's file is tolerated and reacquired immediately
    /// (the advisory lock, not the file, is authoritative).
    pub async fn acquire(
        &self,
        port: u16,
        cancel: CancellationToken,
        deadline: Duration,
    ) -> Result<LockHandle, LockError> {
        std::fs::create_dir_all(&self.lock_dir)
            .map_err(|source| LockError::Io { port, source })?;
        let path = self.lock_path(port);

        let file = open_lock_file(&path).map_err(|source| LockError::Io { port, source })?;

        let deadline_fut = tokio::time::sleep(deadline);
        tokio::pin!(deadline_fut);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    write_pid_marker(&file, &path);
                    debug!(port, path = %path.display(), "lock acquired");
                    return Ok(LockHandle { file: Some(file), port, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                        _ = &mut deadline_fut => return Err(LockError::Contended { port }),
                        _ = cancel.cancelled() => return Err(LockError::Contended { port }),
                    }
                }
                Err(source) => return Err(LockError::Io { port, source }),
            }
        }
    }

    /// Remove the lock file from disk. Safe to call after the advisory
    /// lock has been released (§4.4.1 Delete step 4); best-effort, absence
    /// is not an error.
    pub fn remove_lock_file(&self, port: u16) {
        let path = self.lock_path(port);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(port, path = %path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(false).open(path)
}

fn write_pid_marker(file: &File, path: &Path) {
    let mut file = file.try_clone().ok();
    if let Some(f) = file.as_mut() {
        let _ = f.set_len(0);
        if let Err(e) = writeln!(f, "{}", std::process::id()) {
            debug!(path = %path.display(), error = %e, "failed to write pid marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let handle = mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
        handle.release().unwrap();
    }

    #[tokio::test]
    async fn second_acquirer_waits_then_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _held = mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();

        let err = mgr
            .acquire(3001, CancellationToken::new(), Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Contended { port: 3001 }));
    }

    #[tokio::test]
    async fn cancellation_aborts_acquisition_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _held = mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = mgr.acquire(3001, cancel, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, LockError::Contended { port: 3001 }));
    }

    #[tokio::test]
    async fn distinct_ports_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let a = mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
        let b = mgr.acquire(3002, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
        a.release().unwrap();
        b.release().unwrap();
    }

    #[tokio::test]
    async fn stale_lock_file_on_disk_does_not_block_reacquisition() {
        // A lock file left on disk (e.g. from a crashed process) must not
        // block a fresh acquisition: the OS releases the advisory lock
        // when the owning process/fd goes away, not when the file is
        // deleted.
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        {
            let held = mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
            // Simulate a crash: drop without calling release(), file stays on disk.
            drop(held);
        }
        assert!(dir.path().join("gowa.3001.lock").exists());
        let reacquired =
            mgr.acquire(3001, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
        reacquired.release().unwrap();
    }

    #[tokio::test]
    async fn remove_lock_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        mgr.remove_lock_file(9999);
        mgr.remove_lock_file(9999);
    }

    #[tokio::test]
    async fn zero_deadline_fails_fast_when_contended() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let _held = mgr.acquire(3101, CancellationToken::new(), DEFAULT_DEADLINE).await.unwrap();
        let err =
            mgr.acquire(3101, CancellationToken::new(), Duration::from_millis(0)).await.unwrap_err();
        assert!(matches!(err, LockError::Contended { .. }));
    }

    #[tokio::test]
    async fn zero_deadline_succeeds_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LockManager::new(dir.path());
        let handle =
            mgr.acquire(3102, CancellationToken::new(), Duration::from_millis(0)).await.unwrap();
        handle.release().unwrap();
    }
}
