use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::Result;
use crate::spool::JobId;

/// Spawns job commands through `sh -c`, redirecting their output to a
/// per-job file when the job stores output.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    out_dir: PathBuf,
}

impl JobExecutor {
    pub fn new() -> Self {
        Self {
            out_dir: std::env::temp_dir(),
        }
    }

    /// Output files land in `dir` instead of the system temp dir.
    pub fn with_out_dir(dir: PathBuf) -> Self {
        Self { out_dir: dir }
    }

    fn output_path(&self, job_id: JobId) -> PathBuf {
        self.out_dir
            .join(format!("spoolq-out-{}-{}", std::process::id(), job_id))
    }

    /// Spawns the command. With `store_output` both stdout and stderr go
    /// to the job's output file; otherwise the child inherits the
    /// daemon's stdio. The returned handle carries the pid and path the
    /// caller reports back to the queue.
    pub async fn spawn(
        &self,
        job_id: JobId,
        command: &str,
        store_output: bool,
    ) -> Result<RunningJob> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).stdin(Stdio::null());

        let output_path = if store_output {
            let path = self.output_path(job_id);
            let out = std::fs::File::create(&path)?;
            let err = out.try_clone()?;
            cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
            Some(path)
        } else {
            None
        };

        let child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        tracing::info!(
            job_id,
            pid,
            command,
            output = ?output_path.as_ref().map(|p| p.display().to_string()),
            "job process spawned"
        );

        Ok(RunningJob {
            pid,
            output_path,
            child,
        })
    }
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned job process.
#[derive(Debug)]
pub struct RunningJob {
    pub pid: u32,
    pub output_path: Option<PathBuf>,
    child: Child,
}

impl RunningJob {
    /// Waits for the child and maps its exit status: the exit code, or
    /// -1 when the child was terminated by a signal.
    pub async fn wait(&mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                tracing::error!(pid = self.pid, error = %e, "waiting on job process failed");
                -1
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(pid = self.pid, error = %e, "failed to kill job process");
        }
    }
}
