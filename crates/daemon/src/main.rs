// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gwa_core::{Clock, ProcessConfig, SystemClock};
use gwa_daemon::{build_router, AppState, DEFAULT_READYZ_TIMEOUT};
use gwa_lifecycle::LifecycleManager;
use gwa_lock::LockManager;
use gwa_security::{has_critical, validate, SecurityContext};
use gwa_supervisor::{HttpSupervisorClient, SupervisorClient};
use tracing::{error, info};

/// CLI overlay on top of `ProcessConfig::from_env` (§6.4): flags win
/// over environment variables where both are given.
#[derive(Parser, Debug)]
#[command(name = "gwad", version, about = "WhatsApp gateway instance control plane")]
struct Cli {
    /// Admin API bind port, overrides GWA_ADMIN_PORT.
    #[arg(long)]
    admin_port: Option<u16>,

    /// supervisord XML-RPC endpoint, overrides GWA_SUPERVISOR_URL.
    #[arg(long)]
    supervisor_url: Option<String>,

    /// Directory supervisord's `[include]` directive watches, overrides
    /// GWA_CONF_DIR.
    #[arg(long)]
    conf_dir: Option<PathBuf>,

    /// Log level passed to the tracing env filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let mut config = match ProcessConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = cli.admin_port {
        config.admin_port = port;
    }
    if let Some(url) = cli.supervisor_url {
        config.supervisor_url = url;
    }
    if let Some(dir) = cli.conf_dir {
        config.conf_dir = dir;
    }

    let security_ctx = SecurityContext {
        admin_token: &config.admin_token,
        basic_auth: &config.defaults.basic_auth,
        webhook_secret: None,
        supervisor_url: &config.supervisor_url,
    };
    let warnings = validate(&security_ctx);
    for warning in &warnings {
        tracing::warn!(level = ?warning.level, code = warning.code, message = %warning.message, "security check");
    }
    if config.strict_security && has_critical(&warnings) {
        error!("GWA_STRICT_SECURITY is set and a critical security warning was found, refusing to start");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "gwad exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProcessConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = env!("CARGO_PKG_VERSION"), "gwad starting");

    let supervisor: Arc<dyn SupervisorClient> = Arc::new(HttpSupervisorClient::new(
        config.supervisor_url.clone(),
        config.supervisor_user.clone(),
        config.supervisor_pass.clone(),
        Duration::from_secs(10),
    )?);

    let lock = LockManager::new(config.lock_dir.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let lifecycle = LifecycleManager::new(
        lock,
        Arc::clone(&supervisor),
        clock,
        config.conf_dir.clone(),
        config.instances_dir.clone(),
        config.log_dir.clone(),
        config.binary_path.clone(),
        config.defaults.clone(),
    );

    let state = AppState::new(
        lifecycle,
        supervisor,
        config.admin_token.clone(),
        DEFAULT_READYZ_TIMEOUT,
    );

    let router = build_router(state).into_make_service_with_connect_info::<std::net::SocketAddr>();

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.admin_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "admin API listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    info!("gwad stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
