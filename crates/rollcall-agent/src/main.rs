//! # rollcall-agent
//!
//! Headless sync agent for one device. Opens the local attendance store,
//! checks that the signed-in user's session belongs to this device, then
//! keeps the store reconciled with the remote: once at start, periodically,
//! on `SIGUSR1`, and once more before exiting.

mod device;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rollcall_store::Database;
use rollcall_sync::{
    HttpRemote, LogNotifier, Reconciler, Scheduler, SessionContext, SessionGuard, SessionStatus,
    SyncConfig, SyncCursor, SyncError, Trigger,
};

/// Longest wait for the final background sync on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rollcall_sync=debug")),
        )
        .with_target(true)
        .init();

    info!(
        "Starting {} sync agent v{}",
        rollcall_shared::constants::APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = SyncConfig::from_env();
    info!(
        remote = %config.remote_url,
        user = %config.user_id,
        role = %config.role,
        interval = ?config.sync_interval,
        session_policy = %config.session_policy,
        auth_enabled = config.auth_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the local store
    // -----------------------------------------------------------------------
    let data_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => rollcall_store::database::default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let db = Database::open_at(&data_dir.join("rollcall.db"))?;
    info!(
        path = %data_dir.display(),
        unsynced = db.count_unsynced_attendance()?,
        "Local store ready"
    );
    let db = Arc::new(Mutex::new(db));

    // -----------------------------------------------------------------------
    // 4. Identify this device and check the session
    // -----------------------------------------------------------------------
    let device_label = device::resolve_label(config.device_label.as_deref(), &data_dir)?;
    let session = SessionContext::new(config.user_id.clone(), config.role, device_label);

    let remote = Arc::new(HttpRemote::new(
        config.remote_url.clone(),
        config.auth_token.clone(),
        config.http_timeout,
    )?);

    let guard = SessionGuard::new(config.session_policy);
    match guard.verify(remote.as_ref(), &session).await {
        Ok(SessionStatus::Valid) => {
            if let Err(e) = guard.claim(remote.as_ref(), &session).await {
                tracing::warn!(error = %e, "Could not record session, continuing");
            }
        }
        Ok(SessionStatus::Unverified) => {
            tracing::warn!(policy = %guard.policy(), "Remote unreachable, session not verified");
        }
        Err(SyncError::SessionRejected(other)) => {
            anyhow::bail!(
                "user {} is signed in on another device ({other}); sign in again there or here",
                session.user_id
            );
        }
        Err(e) => return Err(e).context("session check failed"),
    }

    // -----------------------------------------------------------------------
    // 5. Start the scheduler
    // -----------------------------------------------------------------------
    let reconciler = Arc::new(Reconciler::new(
        db,
        remote.clone(),
        SyncCursor::in_dir(&data_dir),
        Arc::new(LogNotifier),
        session,
    ));
    if let Some(last) = reconciler.last_sync().await? {
        info!(
            device = %reconciler.session().device_label,
            last_sync_millis = last,
            "Previous sync found"
        );
    }

    let scheduler = Scheduler::start(reconciler, remote, config.scheduler());
    scheduler.trigger(Trigger::Foreground);

    // -----------------------------------------------------------------------
    // 6. Run until Ctrl+C, syncing on request
    // -----------------------------------------------------------------------
    let mut manual = manual_signal()?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = next_manual_request(&mut manual) => {
                scheduler.trigger(Trigger::Manual);
            }
        }
    }

    scheduler.trigger(Trigger::Background);
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler.idle())
        .await
        .is_err()
    {
        tracing::warn!("Final sync did not finish in time, unsynced rows stay queued");
    }
    scheduler.shutdown().await;

    Ok(())
}

#[cfg(unix)]
type ManualSignal = tokio::signal::unix::Signal;

#[cfg(unix)]
fn manual_signal() -> std::io::Result<ManualSignal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
}

#[cfg(unix)]
async fn next_manual_request(signal: &mut ManualSignal) {
    if signal.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
struct ManualSignal;

#[cfg(not(unix))]
fn manual_signal() -> std::io::Result<ManualSignal> {
    Ok(ManualSignal)
}

#[cfg(not(unix))]
async fn next_manual_request(_: &mut ManualSignal) {
    std::future::pending::<()>().await;
}
