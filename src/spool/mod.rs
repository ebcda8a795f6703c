pub mod job;
pub mod listing;
pub mod notify;
pub mod slot;
pub mod store;

use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::error::{Result, SpoolError};
pub use job::{Job, JobId, JobState, JobTarget};
pub use notify::ClientId;
use notify::NotifyRegistry;
use slot::RunSlot;
use store::JobStore;

/// How a wait request was resolved.
#[derive(Debug)]
pub enum WaitDisposition {
    /// The job had already finished; here is its exit code.
    Immediate(i32),
    /// A notification entry was registered; the exit code arrives on
    /// this receiver when the job completes.
    Registered(oneshot::Receiver<i32>),
}

/// Answer to an output query: only produced once the execution engine
/// has attached the child's pid and output path.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub job_id: JobId,
    pub pid: u32,
    pub output_path: PathBuf,
}

/// The owning context for all queue state: the job store, the single run
/// slot and the notification registry. Every core operation is a method
/// here, and the daemon serializes them behind one mutex; nothing in this
/// type blocks or awaits.
#[derive(Debug, Default)]
pub struct Spool {
    store: JobStore,
    slot: RunSlot,
    notify: NotifyRegistry,
}

impl Spool {
    pub fn new() -> Self {
        Self {
            store: JobStore::new(),
            slot: RunSlot::new(),
            notify: NotifyRegistry::new(),
        }
    }

    pub fn submit(&mut self, command: String, store_output: bool) -> JobId {
        let job_id = self.store.submit(command, store_output);
        tracing::info!(job_id, store_output, "job submitted");
        job_id
    }

    pub fn remove(&mut self, target: JobTarget) -> Result<JobId> {
        let job_id = self.store.remove(target)?;
        tracing::info!(job_id, "queued job removed");
        Ok(job_id)
    }

    pub fn urgent(&mut self, target: JobTarget) -> Result<JobId> {
        let job_id = self.store.move_to_front(target, !self.slot.is_free())?;
        tracing::info!(job_id, "job moved to the front of the queue");
        Ok(job_id)
    }

    pub fn clear_finished(&mut self) {
        self.store.clear_finished();
    }

    pub fn find(&self, id: JobId) -> Option<&Job> {
        self.store.find(id)
    }

    pub fn render(&self) -> String {
        listing::render(&self.store)
    }

    /// Pull operation for the execution engine: if the slot is free and
    /// a job is queued, the head becomes the running job and its id is
    /// returned. Idempotent no-op otherwise.
    pub fn poll_next(&mut self) -> Option<JobId> {
        if !self.slot.is_free() {
            return None;
        }
        let job_id = self.store.head_id()?;
        self.mark_running();
        self.slot.occupy(job_id);
        tracing::debug!(job_id, "job dispatched to the run slot");
        Some(job_id)
    }

    /// Lower-level half of dispatch: flips the head of the active list
    /// from queued to running without touching the slot.
    pub fn mark_running(&mut self) {
        self.store.mark_head_running();
    }

    /// Completion report from the execution engine. The slot must be
    /// occupied and the head of the active list must be the running job;
    /// anything else is a contract violation by the engine.
    pub fn completed(&mut self, exit_code: i32) -> Result<JobId> {
        let running = self.slot.running_job().ok_or_else(|| {
            SpoolError::Consistency("completion reported while the run slot is free".to_string())
        })?;
        let job_id = self.store.finish_head(running, exit_code)?;
        self.slot.release();
        let notified = self.notify.fire(job_id, exit_code);
        tracing::info!(job_id, exit_code, notified, "job finished");
        Ok(job_id)
    }

    /// Called once per job by the execution engine after the child is
    /// actually spawned; this runs after the slot flipped to occupied,
    /// so readers tolerate the window where the info is missing.
    pub fn attach_execution_info(
        &mut self,
        job_id: JobId,
        output_path: Option<PathBuf>,
        pid: u32,
    ) -> Result<()> {
        self.store.attach_execution_info(job_id, output_path, pid)
    }

    /// Wait resolution: `Last` is the active tail, else the finished
    /// tail. A finished job answers immediately; otherwise a waiter is
    /// registered for `client` (replacing any previous one).
    pub fn wait(&mut self, client: ClientId, target: JobTarget) -> Result<WaitDisposition> {
        let job = self.store.resolve_wait_target(target)?;
        if job.state == JobState::Finished {
            return Ok(WaitDisposition::Immediate(job.exit_code.unwrap_or(-1)));
        }
        let job_id = job.id;
        let (tx, rx) = oneshot::channel();
        self.notify.register(client, job_id, tx);
        tracing::debug!(client, job_id, "wait registered");
        Ok(WaitDisposition::Registered(rx))
    }

    /// Disconnect cleanup: drops `client`'s pending wait, if any,
    /// without notifying.
    pub fn cancel_wait(&mut self, client: ClientId) {
        self.notify.cancel(client);
    }

    /// State query; `Last` resolves like wait.
    pub fn job_state(&self, target: JobTarget) -> Result<JobState> {
        Ok(self.store.resolve_wait_target(target)?.state)
    }

    /// Output query. Its resolution domain is narrower than wait's: the
    /// running job and the finished list. `Last` is the running job when
    /// the slot is occupied, else the most recently finished job; an
    /// explicit id never reaches a queued job. A running job whose info
    /// has not been attached yet reports not-found (the client retries).
    pub fn output_info(&self, target: JobTarget) -> Result<OutputInfo> {
        let job = match target {
            JobTarget::Last => match self.slot.running_job() {
                Some(id) => self.store.find(id),
                None => self.store.finished_tail(),
            },
            JobTarget::Id(id) => {
                if self.slot.running_job() == Some(id) {
                    self.store.find(id)
                } else {
                    self.store.find_finished(id)
                }
            }
        }
        .ok_or(SpoolError::NotFound(target))?;

        if !job.store_output {
            return Err(SpoolError::NoOutputStored(job.id));
        }
        match (&job.output_path, job.pid) {
            (Some(path), Some(pid)) => Ok(OutputInfo {
                job_id: job.id,
                pid,
                output_path: path.clone(),
            }),
            _ => Err(SpoolError::NotFound(target)),
        }
    }
}
