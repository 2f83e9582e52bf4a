// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WaitForState` (§4.4.2): poll the supervisor until the observed state
//! matches the target, short-circuiting on terminal failure states.

use std::sync::Arc;
use std::time::Duration;

use gwa_core::{program_name, Clock, GwaError, InstanceConfig, InstanceState};
use gwa_supervisor::{parse_instance_state, SupervisorClient};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll interval while waiting for convergence (§4.4.2).
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default convergence deadline when the caller does not set one (§4.4.1
/// step 8 references "20 s" for Create).
pub const DEFAULT_CONVERGENCE_DEADLINE: Duration = Duration::from_secs(20);

pub async fn wait_for_state(
    supervisor: &dyn SupervisorClient,
    clock: &Arc<dyn Clock>,
    cancel: &CancellationToken,
    port: u16,
    target: InstanceState,
    deadline: Duration,
    stderr_log_hint: &std::path::Path,
) -> Result<(), GwaError> {
    let deadline_instant = clock.now() + deadline;

    loop {
        let info = supervisor.process_info(port).await;
        match info {
            Ok(info) => {
                let state = parse_instance_state(&info.state_name);
                debug!(port, state = %state, target = %target, "convergence poll");
                if state == target {
                    return Ok(());
                }
                if state.is_terminal_failure() {
                    return Err(GwaError::internal(format!(
                        "program {} entered terminal state {} while waiting for {target}; see {}",
                        program_name(port),
                        info.state_name,
                        stderr_log_hint.display()
                    )));
                }
            }
            Err(e) => return Err(e.into()),
        }

        if clock.now() >= deadline_instant {
            return Err(GwaError::timeout(format!(
                "timed out waiting for {} to reach {target}",
                program_name(port)
            )));
        }
        if cancel.is_cancelled() {
            return Err(GwaError::timeout(format!(
                "cancelled while waiting for {} to reach {target}",
                program_name(port)
            )));
        }

        clock.sleep(POLL_INTERVAL).await;
    }
}

pub fn stderr_log_path(cfg: &InstanceConfig) -> std::path::PathBuf {
    cfg.stderr_log()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gwa_core::FakeClock;
    use gwa_supervisor::{ProcessInfo, SupervisorError};
    use std::sync::Mutex;

    struct ScriptedSupervisor {
        responses: Mutex<Vec<Result<ProcessInfo, String>>>,
    }

    #[async_trait]
    impl SupervisorClient for ScriptedSupervisor {
        async fn reload(&self) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn start_program(&self, _port: u16) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn stop_program(&self, _port: u16) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn remove_program(&self, _port: u16) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn process_info(&self, _port: u16) -> Result<ProcessInfo, SupervisorError> {
            let mut responses = self.responses.lock().unwrap();
            match responses.remove(0) {
                Ok(info) => Ok(info),
                Err(_) => Ok(ProcessInfo {
                    name: "gowa_3001".into(),
                    state_name: "FATAL".into(),
                    pid: 0,
                    uptime_secs: 0,
                }),
            }
        }
        async fn all_process_info(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
            Ok(vec![])
        }
    }

    fn info(state: &str) -> ProcessInfo {
        ProcessInfo { name: "gowa_3001".into(), state_name: state.into(), pid: 100, uptime_secs: 1 }
    }

    #[tokio::test]
    async fn returns_immediately_when_already_at_target() {
        let supervisor = ScriptedSupervisor { responses: Mutex::new(vec![Ok(info("RUNNING"))]) };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_secs(5),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn polls_through_starting_to_running() {
        let supervisor = ScriptedSupervisor {
            responses: Mutex::new(vec![
                Ok(info("STARTING")),
                Ok(info("STARTING")),
                Ok(info("RUNNING")),
            ]),
        };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_secs(5),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn fatal_state_short_circuits_with_internal_error() {
        let supervisor = ScriptedSupervisor { responses: Mutex::new(vec![Ok(info("FATAL"))]) };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        let err = wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_secs(5),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap_err();
        assert!(err.message.contains("FATAL"));
        assert!(err.message.contains("gowa_3001.err.log"));
    }

    #[tokio::test]
    async fn exited_state_short_circuits_with_internal_error() {
        let supervisor = ScriptedSupervisor { responses: Mutex::new(vec![Ok(info("EXITED"))]) };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        let err = wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_secs(5),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::InternalError);
        assert!(err.message.contains("EXITED"));
        assert!(err.message.contains("gowa_3001.err.log"));
    }

    #[tokio::test]
    async fn deadline_elapses_to_timeout() {
        let supervisor = ScriptedSupervisor {
            responses: Mutex::new(vec![Ok(info("STARTING")), Ok(info("STARTING"))]),
        };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        let err = wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_millis(200),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_the_loop() {
        let supervisor = ScriptedSupervisor {
            responses: Mutex::new(vec![Ok(info("STARTING")), Ok(info("STARTING"))]),
        };
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_state(
            &supervisor,
            &clock,
            &cancel,
            3001,
            InstanceState::Running,
            Duration::from_secs(30),
            std::path::Path::new("/var/log/gowa/gowa_3001.err.log"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::Timeout);
    }
}
