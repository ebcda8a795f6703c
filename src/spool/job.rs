use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Job ids are assigned at submission, strictly increasing, never reused
/// for the lifetime of the daemon.
pub type JobId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Finished,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Finished => write!(f, "finished"),
        }
    }
}

/// A job reference as given by a client: either an explicit id or "the
/// implicit target". Each operation resolves `Last` by its own rule, so
/// this type carries no resolution logic of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobTarget {
    Id(JobId),
    Last,
}

impl std::fmt::Display for JobTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobTarget::Id(id) => write!(f, "job {}", id),
            JobTarget::Last => write!(f, "the last job"),
        }
    }
}

impl From<Option<JobId>> for JobTarget {
    fn from(id: Option<JobId>) -> Self {
        match id {
            Some(id) => JobTarget::Id(id),
            None => JobTarget::Last,
        }
    }
}

/// One submitted unit of work. Owned exclusively by the job store; it
/// lives in the active list until completion, then moves to the finished
/// list.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub store_output: bool,
    /// Attached by the execution engine after the child is spawned. A
    /// `Running` job may transiently have no path yet.
    pub output_path: Option<PathBuf>,
    pub pid: Option<u32>,
    /// Set exactly once, together with the transition to `Finished`.
    pub exit_code: Option<i32>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, command: String, store_output: bool) -> Self {
        Self {
            id,
            command,
            state: JobState::Queued,
            store_output,
            output_path: None,
            pid: None,
            exit_code: None,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued() {
        let job = Job::new(1, "echo hello".to_string(), true);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.command, "echo hello");
        assert!(job.output_path.is_none());
        assert!(job.pid.is_none());
        assert!(job.exit_code.is_none());
    }

    #[test]
    fn state_display() {
        assert_eq!(JobState::Queued.to_string(), "queued");
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(JobState::Finished.to_string(), "finished");
    }

    #[test]
    fn target_display() {
        assert_eq!(JobTarget::Id(7).to_string(), "job 7");
        assert_eq!(JobTarget::Last.to_string(), "the last job");
    }

    #[test]
    fn target_from_optional_id() {
        assert_eq!(JobTarget::from(Some(3)), JobTarget::Id(3));
        assert_eq!(JobTarget::from(None), JobTarget::Last);
    }
}
