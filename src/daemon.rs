//! Daemon bootstrap and the run loop that drives the execution engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Result, SpoolError};
use crate::ipc::server;
use crate::shutdown;
use crate::spool::{ClientId, Spool};
use crate::worker::JobExecutor;

/// State shared between the connection handlers and the run loop. The
/// spool mutex is the single serialization point for all core
/// operations; `kick` wakes the run loop after a submission.
pub struct DaemonState {
    pub spool: Mutex<Spool>,
    pub kick: Notify,
    pub shutdown: CancellationToken,
    next_client: AtomicU64,
}

impl DaemonState {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            spool: Mutex::new(Spool::new()),
            kick: Notify::new(),
            shutdown,
            next_client: AtomicU64::new(1),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }
}

/// Runs the daemon in the foreground: bind the socket, serve requests
/// and drive the run loop until a shutdown signal or request arrives.
pub async fn run(config: Config) -> Result<()> {
    if let Some(pid) = config.live_daemon_pid() {
        return Err(SpoolError::AlreadyRunning(pid));
    }

    config.ensure_runtime_dir()?;
    // A dead daemon may have left its socket behind.
    config.remove_socket()?;

    let listener = UnixListener::bind(&config.socket_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))?;
    }
    config.write_pid()?;

    let token = shutdown::install_shutdown_handler();
    let state = Arc::new(DaemonState::new(token));
    let executor = JobExecutor::new();

    tracing::info!(
        socket = %config.socket_path.display(),
        pid = std::process::id(),
        "spoolq daemon listening"
    );

    let runner = tokio::spawn(run_loop(Arc::clone(&state), executor));
    let served = server::serve(listener, Arc::clone(&state)).await;
    let _ = runner.await;

    config.remove_socket().ok();
    config.remove_pid().ok();
    tracing::info!("spoolq daemon stopped");

    served
}

/// The execution engine's pull loop: woken by a submission kick, it
/// drains the queue one job at a time (poll, spawn, attach, await,
/// complete) until nothing is queued, then sleeps again. Shutdown kills
/// the running child and stops between jobs.
pub async fn run_loop(state: Arc<DaemonState>, executor: JobExecutor) {
    loop {
        tokio::select! {
            _ = state.kick.notified() => {}
            _ = state.shutdown.cancelled() => return,
        }

        loop {
            let next = {
                let mut spool = state.spool.lock().await;
                spool.poll_next()
            };
            let Some(job_id) = next else { break };

            let Some((command, store_output)) = ({
                let spool = state.spool.lock().await;
                spool
                    .find(job_id)
                    .map(|job| (job.command.clone(), job.store_output))
            }) else {
                tracing::error!(job_id, "dispatched job vanished from the store");
                return;
            };

            // The spool is unlocked while the child runs; only the
            // spawn/attach/complete edges take the lock.
            match executor.spawn(job_id, &command, store_output).await {
                Ok(mut running) => {
                    {
                        let mut spool = state.spool.lock().await;
                        if let Err(e) = spool.attach_execution_info(
                            job_id,
                            running.output_path.clone(),
                            running.pid,
                        ) {
                            tracing::error!(job_id, error = %e, "refusing inconsistent execution info");
                        }
                    }

                    let exit_code = tokio::select! {
                        code = running.wait() => code,
                        _ = state.shutdown.cancelled() => {
                            tracing::info!(job_id, "shutdown while a job is running, killing it");
                            running.kill().await;
                            running.wait().await
                        }
                    };

                    let mut spool = state.spool.lock().await;
                    if let Err(e) = spool.completed(exit_code) {
                        tracing::error!(job_id, error = %e, "completion refused, aborting dispatch");
                        return;
                    }
                }
                Err(e) => {
                    // The slot must never stay wedged on a job that
                    // could not even start; report the shell's own
                    // command-not-found convention.
                    tracing::warn!(job_id, error = %e, "job could not be spawned");
                    let mut spool = state.spool.lock().await;
                    if let Err(e) = spool.completed(127) {
                        tracing::error!(job_id, error = %e, "completion refused, aborting dispatch");
                        return;
                    }
                }
            }

            if state.shutdown.is_cancelled() {
                return;
            }
        }
    }
}
