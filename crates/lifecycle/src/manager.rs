// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle Manager (§4.4): composes the renderer, lock manager, and
//! supervisor client into idempotent, observable operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gwa_config::{load_effective_config, remove_config, write_config};
use gwa_core::{
    program_name, Clock, GwaError, Instance, InstanceConfig, InstanceDefaults, InstanceState,
};
use gwa_lock::LockManager;
use gwa_supervisor::{parse_instance_state, SupervisorClient};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::merge::apply_partial;
use crate::wait::{wait_for_state, DEFAULT_CONVERGENCE_DEADLINE};

/// Per-call cancellation and deadline context, threaded through every
/// mutating operation (§5 "every lifecycle method takes a context").
#[derive(Clone)]
pub struct OperationContext {
    pub cancel: CancellationToken,
    pub lock_deadline: Duration,
    pub convergence_deadline: Duration,
}

impl OperationContext {
    pub fn new(lock_deadline: Duration, convergence_deadline: Duration) -> Self {
        Self { cancel: CancellationToken::new(), lock_deadline, convergence_deadline }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new(gwa_lock::DEFAULT_DEADLINE, DEFAULT_CONVERGENCE_DEADLINE)
    }
}

pub struct LifecycleManager {
    lock: LockManager,
    supervisor: Arc<dyn SupervisorClient>,
    clock: Arc<dyn Clock>,
    conf_dir: PathBuf,
    instances_dir: PathBuf,
    log_dir: PathBuf,
    binary_path: PathBuf,
    defaults: InstanceDefaults,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: LockManager,
        supervisor: Arc<dyn SupervisorClient>,
        clock: Arc<dyn Clock>,
        conf_dir: PathBuf,
        instances_dir: PathBuf,
        log_dir: PathBuf,
        binary_path: PathBuf,
        defaults: InstanceDefaults,
    ) -> Self {
        Self { lock, supervisor, clock, conf_dir, instances_dir, log_dir, binary_path, defaults }
    }

    fn default_config(&self, port: u16) -> InstanceConfig {
        InstanceConfig {
            port,
            binary_path: self.binary_path.clone(),
            conf_dir: self.conf_dir.clone(),
            instances_dir: self.instances_dir.clone(),
            log_dir: self.log_dir.clone(),
            basic_auth: self.defaults.basic_auth.clone(),
            debug: self.defaults.debug,
            os_name: self.defaults.os_name.clone(),
            base_path: None,
            auto_reply: self.defaults.auto_reply,
            auto_mark_read: self.defaults.auto_mark_read,
            webhook_url: None,
            webhook_secret: None,
            account_validation: self.defaults.account_validation,
            chat_storage: self.defaults.chat_storage,
            proxy_url: None,
            proxy_no_websocket: false,
            proxy_only_login: false,
            proxy_no_media: false,
        }
    }

    fn validate_port(port: u16) -> Result<(), GwaError> {
        if port < gwa_core::MIN_PORT {
            return Err(GwaError::invalid_request(format!(
                "port {port} is below the minimum of {}",
                gwa_core::MIN_PORT
            )));
        }
        Ok(())
    }

    /// `CreateInstance(ctx, port, config?)` (§4.4.1).
    pub async fn create_instance(
        &self,
        ctx: &OperationContext,
        port: u16,
        overlay: Option<Value>,
    ) -> Result<Instance, GwaError> {
        Self::validate_port(port)?;

        let handle = self.lock.acquire(port, ctx.cancel.clone(), ctx.lock_deadline).await?;

        if gwa_config::fragment_exists(&self.conf_dir, port) {
            return Err(GwaError::already_exists(format!(
                "fragment already exists for port {port}"
            )));
        }
        if self.program_known_to_supervisor(port).await? {
            return Err(GwaError::already_exists(format!(
                "supervisor already knows program {}",
                program_name(port)
            )));
        }

        let mut config = self.default_config(port);
        if let Some(overlay) = overlay {
            config = apply_partial(&config, &overlay)?;
        }

        write_config(&config).map_err(|e| GwaError::from(e).with_context("WriteConfig", port))?;

        if let Err(e) = self.reload_and_start(port).await {
            warn!(port, error = %e, "create failed after writing config, rolling back");
            let _ = remove_config(&self.conf_dir, port);
            let _ = self.supervisor.reload().await;
            return Err(e.with_context("CreateInstance", port));
        }

        let result = wait_for_state(
            self.supervisor.as_ref(),
            &self.clock,
            &ctx.cancel,
            port,
            InstanceState::Running,
            ctx.convergence_deadline,
            &config.stderr_log(),
        )
        .await;

        if let Err(e) = result {
            warn!(port, error = %e, "create failed to converge, rolling back");
            let _ = remove_config(&self.conf_dir, port);
            let _ = self.supervisor.reload().await;
            return Err(e.with_context("CreateInstance", port));
        }

        info!(port, "instance created");
        let instance = self.get_instance_inner(port).await;
        drop(handle);
        instance
    }

    /// `UpdateInstance(ctx, port, partial_config)` (§4.4.1).
    pub async fn update_instance(
        &self,
        ctx: &OperationContext,
        port: u16,
        patch: Value,
    ) -> Result<Instance, GwaError> {
        Self::validate_port(port)?;

        let _handle = self.lock.acquire(port, ctx.cancel.clone(), ctx.lock_deadline).await?;

        if !gwa_config::fragment_exists(&self.conf_dir, port) {
            return Err(GwaError::not_found(format!("no fragment for port {port}")));
        }

        let current = load_effective_config(&self.conf_dir, port)
            .map_err(|e| GwaError::from(e).with_context("LoadEffectiveConfig", port))?
            .unwrap_or_else(|| self.default_config(port));

        let new_config = apply_partial(&current, &patch)?;

        self.supervisor
            .stop_program(port)
            .await
            .or_else(tolerate_not_running_or_not_found)
            .map_err(|e| GwaError::from(e).with_context("StopProgram", port))?;

        write_config(&new_config).map_err(|e| GwaError::from(e).with_context("WriteConfig", port))?;

        self.reload_and_start(port).await.map_err(|e| e.with_context("UpdateInstance", port))?;

        wait_for_state(
            self.supervisor.as_ref(),
            &self.clock,
            &ctx.cancel,
            port,
            InstanceState::Running,
            ctx.convergence_deadline,
            &new_config.stderr_log(),
        )
        .await
        .map_err(|e| e.with_context("UpdateInstance", port))?;

        info!(port, "instance updated");
        self.get_instance_inner(port).await
    }

    /// `DeleteInstance(ctx, port)` (§4.4.1). `purge` additionally removes
    /// `{instances_dir}/{port}/` — an operator-initiated extension beyond
    /// the default behavior (an explicit query flag, never implicit).
    pub async fn delete_instance(
        &self,
        ctx: &OperationContext,
        port: u16,
        purge: bool,
    ) -> Result<(), GwaError> {
        Self::validate_port(port)?;

        let handle = self.lock.acquire(port, ctx.cancel.clone(), ctx.lock_deadline).await?;

        let fragment_present = gwa_config::fragment_exists(&self.conf_dir, port);
        let known_to_supervisor = self.program_known_to_supervisor(port).await?;
        if !fragment_present && !known_to_supervisor {
            return Err(GwaError::not_found(format!("no instance on port {port}")));
        }

        self.supervisor
            .stop_program(port)
            .await
            .or_else(tolerate_not_running_or_not_found)
            .map_err(|e| GwaError::from(e).with_context("StopProgram", port))?;

        remove_config(&self.conf_dir, port)
            .map_err(|e| GwaError::from(e).with_context("RemoveConfig", port))?;

        self.supervisor
            .reload()
            .await
            .map_err(|e| GwaError::from(e).with_context("Reload", port))?;

        // Removing the fragment and reloading does not unregister the
        // process group by itself (supervisord only reports it as
        // "removed" from the reload diff) — explicitly remove it so a
        // second Delete(P) observes NotFound rather than a stale entry.
        self.supervisor
            .remove_program(port)
            .await
            .or_else(tolerate_not_running_or_not_found)
            .map_err(|e| GwaError::from(e).with_context("RemoveProgram", port))?;

        self.lock.remove_lock_file(port);
        drop(handle);

        if purge {
            let state_dir = self.instances_dir.join(port.to_string());
            if state_dir.exists() {
                std::fs::remove_dir_all(&state_dir)
                    .map_err(|e| GwaError::from(e).with_context("PurgeInstanceState", port))?;
            }
        }

        info!(port, purge, "instance deleted");
        Ok(())
    }

    /// `ListInstances(ctx)` (§4.4.1). No lock held; eventually consistent.
    pub async fn list_instances(&self) -> Result<Vec<Instance>, GwaError> {
        let all = self.supervisor.all_process_info().await?;
        let mut instances: Vec<Instance> = all
            .into_iter()
            .filter_map(|info| port_from_program_name(&info.name).map(|port| (port, info)))
            .map(|(port, info)| to_instance(port, &info, &self.log_dir))
            .collect();
        instances.sort_by_key(|i| i.port);
        Ok(instances)
    }

    /// `GetInstance(ctx, port)` (§4.4.1). No lock held.
    pub async fn get_instance(&self, port: u16) -> Result<Instance, GwaError> {
        Self::validate_port(port)?;
        self.get_instance_inner(port).await
    }

    async fn get_instance_inner(&self, port: u16) -> Result<Instance, GwaError> {
        match self.supervisor.process_info(port).await {
            Ok(info) => Ok(to_instance(port, &info, &self.log_dir)),
            Err(gwa_supervisor::SupervisorError::Fault { .. }) => {
                Err(GwaError::not_found(format!("no supervisor program for port {port}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn program_known_to_supervisor(&self, port: u16) -> Result<bool, GwaError> {
        match self.supervisor.process_info(port).await {
            Ok(_) => Ok(true),
            Err(gwa_supervisor::SupervisorError::Fault { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn reload_and_start(&self, port: u16) -> Result<(), GwaError> {
        self.supervisor.reload().await.map_err(GwaError::from)?;
        self.supervisor.start_program(port).await.map_err(GwaError::from)?;
        Ok(())
    }
}

fn tolerate_not_running_or_not_found(
    e: gwa_supervisor::SupervisorError,
) -> Result<(), gwa_supervisor::SupervisorError> {
    match &e {
        gwa_supervisor::SupervisorError::Fault { code, .. } if *code == 10 || *code == 70 => Ok(()),
        _ => Err(e),
    }
}

fn port_from_program_name(name: &str) -> Option<u16> {
    name.strip_prefix("gowa_")?.parse().ok()
}

fn to_instance(port: u16, info: &gwa_supervisor::ProcessInfo, log_dir: &std::path::Path) -> Instance {
    Instance {
        port,
        state: parse_instance_state(&info.state_name),
        pid: info.pid,
        uptime: Duration::from_secs(info.uptime_secs),
        stdout_log: log_dir.join(format!("gowa_{port}.out.log")),
        stderr_log: log_dir.join(format!("gowa_{port}.err.log")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gwa_core::FakeClock;
    use gwa_supervisor::{ProcessInfo, SupervisorError};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// An in-memory stand-in for a supervisord instance: registers a
    /// program on `start_program` if unknown, tracks RUNNING/STOPPED, and
    /// returns `BAD_NAME` faults for anything it doesn't know about.
    struct FakeSupervisor {
        programs: StdMutex<HashMap<u16, String>>,
    }

    impl FakeSupervisor {
        fn new() -> Self {
            Self { programs: StdMutex::new(HashMap::new()) }
        }

        fn seed_known(&self, port: u16, state: &str) {
            self.programs.lock().unwrap().insert(port, state.to_string());
        }
    }

    #[async_trait]
    impl SupervisorClient for FakeSupervisor {
        async fn reload(&self) -> Result<(), SupervisorError> {
            Ok(())
        }

        async fn start_program(&self, port: u16) -> Result<(), SupervisorError> {
            self.programs.lock().unwrap().insert(port, "RUNNING".to_string());
            Ok(())
        }

        async fn stop_program(&self, port: u16) -> Result<(), SupervisorError> {
            let mut programs = self.programs.lock().unwrap();
            match programs.get_mut(&port) {
                Some(state) => {
                    *state = "STOPPED".to_string();
                    Ok(())
                }
                None => Err(SupervisorError::Fault { code: 10, message: "BAD_NAME".into() }),
            }
        }

        async fn remove_program(&self, port: u16) -> Result<(), SupervisorError> {
            self.programs.lock().unwrap().remove(&port);
            Ok(())
        }

        async fn process_info(&self, port: u16) -> Result<ProcessInfo, SupervisorError> {
            let programs = self.programs.lock().unwrap();
            match programs.get(&port) {
                Some(state) => Ok(ProcessInfo {
                    name: program_name(port),
                    state_name: state.clone(),
                    pid: if state == "RUNNING" { 4242 } else { 0 },
                    uptime_secs: 7,
                }),
                None => Err(SupervisorError::Fault { code: 10, message: "BAD_NAME".into() }),
            }
        }

        async fn all_process_info(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
            let programs = self.programs.lock().unwrap();
            Ok(programs
                .iter()
                .map(|(port, state)| ProcessInfo {
                    name: program_name(*port),
                    state_name: state.clone(),
                    pid: if state == "RUNNING" { 4242 } else { 0 },
                    uptime_secs: 7,
                })
                .collect())
        }
    }

    fn fake_binary(dir: &std::path::Path) -> PathBuf {
        use std::io::Write as _;
        let path = dir.join("gowa");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = f.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        path
    }

    fn default_defaults() -> InstanceDefaults {
        InstanceDefaults::default()
    }

    fn manager(dir: &std::path::Path, supervisor: Arc<FakeSupervisor>) -> LifecycleManager {
        let binary = fake_binary(dir);
        LifecycleManager::new(
            LockManager::new(dir.join("locks")),
            supervisor,
            Arc::new(FakeClock::new()),
            dir.join("conf.d"),
            dir.join("instances"),
            dir.join("log"),
            binary,
            default_defaults(),
        )
    }

    #[tokio::test]
    async fn create_then_get_returns_running_instance() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        let instance = mgr.create_instance(&ctx, 3001, None).await.unwrap();
        assert_eq!(instance.state, InstanceState::Running);
        assert!(gwa_config::fragment_exists(&dir.path().join("conf.d"), 3001));

        let fetched = mgr.get_instance(3001).await.unwrap();
        assert_eq!(fetched.port, 3001);
    }

    #[tokio::test]
    async fn create_twice_on_same_port_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        let err = mgr.create_instance(&ctx, 3001, None).await.unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn create_rejects_port_below_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        let err = mgr.create_instance(&ctx, 80, None).await.unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn update_preserves_unspecified_fields_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        let patch = serde_json::json!({ "debug": true });
        let updated = mgr.update_instance(&ctx, 3001, patch).await.unwrap();
        assert_eq!(updated.state, InstanceState::Running);

        let cfg = load_effective_config(&dir.path().join("conf.d"), 3001).unwrap().unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.os_name, "Chrome");
    }

    #[tokio::test]
    async fn update_on_missing_port_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        let err = mgr
            .update_instance(&ctx, 3001, serde_json::json!({ "debug": true }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        mgr.delete_instance(&ctx, 3001, false).await.unwrap();

        let err = mgr.get_instance(3001).await.unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_twice_is_not_found_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        mgr.delete_instance(&ctx, 3001, false).await.unwrap();
        let err = mgr.delete_instance(&ctx, 3001, false).await.unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_with_purge_removes_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        let state_dir = dir.path().join("instances").join("3001");
        assert!(state_dir.exists());

        mgr.delete_instance(&ctx, 3001, true).await.unwrap();
        assert!(!state_dir.exists());
    }

    #[tokio::test]
    async fn delete_without_purge_keeps_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3001, None).await.unwrap();
        let state_dir = dir.path().join("instances").join("3001");

        mgr.delete_instance(&ctx, 3001, false).await.unwrap();
        assert!(state_dir.exists());
    }

    #[tokio::test]
    async fn list_instances_is_sorted_by_port() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        mgr.create_instance(&ctx, 3002, None).await.unwrap();
        mgr.create_instance(&ctx, 3001, None).await.unwrap();

        let instances = mgr.list_instances().await.unwrap();
        assert_eq!(instances.iter().map(|i| i.port).collect::<Vec<_>>(), vec![3001, 3002]);
    }

    #[tokio::test]
    async fn create_reconciles_against_supervisor_only_drift() {
        // A program known to the supervisor but with no fragment on disk
        // (operator-induced drift) still blocks create (§4.4.1 step 2).
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Arc::new(FakeSupervisor::new());
        supervisor.seed_known(3001, "RUNNING");
        let mgr = manager(dir.path(), supervisor);
        let ctx = OperationContext::default();

        let err = mgr.create_instance(&ctx, 3001, None).await.unwrap_err();
        assert_eq!(err.kind, gwa_core::ErrorKind::AlreadyExists);
    }
}
