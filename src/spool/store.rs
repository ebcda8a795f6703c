use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::{Result, SpoolError};
use crate::spool::job::{Job, JobId, JobState, JobTarget};

/// Owns every job the daemon knows about: the FIFO active list (queued
/// and running jobs) and the retained finished list. The running job, if
/// any, is always the head of the active list.
#[derive(Debug)]
pub struct JobStore {
    active: VecDeque<Job>,
    finished: Vec<Job>,
    next_id: JobId,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            active: VecDeque::new(),
            finished: Vec::new(),
            next_id: 1,
        }
    }

    /// Appends a new queued job at the tail of the active list and
    /// assigns it the next id. Never fails.
    pub fn submit(&mut self, command: String, store_output: bool) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        self.active.push_back(Job::new(id, command, store_output));
        id
    }

    /// Removes a job only while it is still queued. `Last` means the
    /// tail of the active list, never the finished list.
    pub fn remove(&mut self, target: JobTarget) -> Result<JobId> {
        let idx = match target {
            JobTarget::Last => match self.active.len().checked_sub(1) {
                Some(idx) => idx,
                None => return Err(SpoolError::NotRemovable(target)),
            },
            JobTarget::Id(id) => match self.active.iter().position(|j| j.id == id) {
                Some(idx) => idx,
                None => return Err(SpoolError::NotRemovable(target)),
            },
        };
        if self.active[idx].state != JobState::Queued {
            return Err(SpoolError::NotRemovable(target));
        }
        let id = self.active[idx].id;
        self.active.remove(idx);
        Ok(id)
    }

    /// Repositions a still-queued job at the front of the queued portion
    /// of the active list. With `keep_head` the current head (the running
    /// job) stays at index 0 and the moved job lands right behind it.
    pub fn move_to_front(&mut self, target: JobTarget, keep_head: bool) -> Result<JobId> {
        let idx = match target {
            JobTarget::Last => match self.active.len().checked_sub(1) {
                Some(idx) => idx,
                None => return Err(SpoolError::NotMovable(target)),
            },
            JobTarget::Id(id) => match self.active.iter().position(|j| j.id == id) {
                Some(idx) => idx,
                None => return Err(SpoolError::NotMovable(target)),
            },
        };
        if self.active[idx].state != JobState::Queued {
            return Err(SpoolError::NotMovable(target));
        }
        let front = usize::from(keep_head);
        let id = self.active[idx].id;
        if idx > front {
            if let Some(job) = self.active.remove(idx) {
                self.active.insert(front, job);
            }
        }
        Ok(id)
    }

    /// Looks in the active list first, then the finished list.
    pub fn find(&self, id: JobId) -> Option<&Job> {
        self.active
            .iter()
            .find(|j| j.id == id)
            .or_else(|| self.finished.iter().find(|j| j.id == id))
    }

    pub fn find_finished(&self, id: JobId) -> Option<&Job> {
        self.finished.iter().find(|j| j.id == id)
    }

    /// Resolution rule shared by wait and the state query: `Last` is the
    /// active tail when the active list is non-empty, otherwise the most
    /// recently finished job.
    pub fn resolve_wait_target(&self, target: JobTarget) -> Result<&Job> {
        match target {
            JobTarget::Last => self
                .active
                .back()
                .or_else(|| self.finished.last())
                .ok_or(SpoolError::NotFound(target)),
            JobTarget::Id(id) => self.find(id).ok_or(SpoolError::NotFound(target)),
        }
    }

    /// Discards the entire finished list. No-op when already empty.
    pub fn clear_finished(&mut self) {
        self.finished.clear();
    }

    /// Records the child pid and output path reported by the execution
    /// engine after dispatch. Called exactly once per job.
    pub fn attach_execution_info(
        &mut self,
        job_id: JobId,
        output_path: Option<PathBuf>,
        pid: u32,
    ) -> Result<()> {
        let job = self
            .active
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| {
                SpoolError::Consistency(format!("execution info reported for unknown job {}", job_id))
            })?;
        if job.state != JobState::Running {
            return Err(SpoolError::Consistency(format!(
                "execution info reported for job {} in state {}",
                job_id, job.state
            )));
        }
        if job.pid.is_some() {
            return Err(SpoolError::Consistency(format!(
                "execution info reported twice for job {}",
                job_id
            )));
        }
        job.output_path = output_path;
        job.pid = Some(pid);
        Ok(())
    }

    /// Flips the head of the active list from queued to running. The
    /// lower-level half of dispatch; `Spool::poll_next` drives it.
    pub fn mark_head_running(&mut self) {
        if let Some(job) = self.active.front_mut() {
            job.state = JobState::Running;
        }
    }

    /// Moves the head job, which must be the running job `expected`, to
    /// the tail of the finished list, recording its exit code.
    pub fn finish_head(&mut self, expected: JobId, exit_code: i32) -> Result<JobId> {
        let Some(mut job) = self.active.pop_front() else {
            return Err(SpoolError::Consistency(format!(
                "completion reported for job {} but the active list is empty",
                expected
            )));
        };
        if job.id != expected || job.state != JobState::Running {
            let msg = format!(
                "completion reported for job {} but the head is job {} in state {}",
                expected, job.id, job.state
            );
            self.active.push_front(job);
            return Err(SpoolError::Consistency(msg));
        }
        job.state = JobState::Finished;
        job.exit_code = Some(exit_code);
        let id = job.id;
        self.finished.push(job);
        Ok(id)
    }

    pub fn head_id(&self) -> Option<JobId> {
        self.active.front().map(|j| j.id)
    }

    pub fn finished_tail(&self) -> Option<&Job> {
        self.finished.last()
    }

    pub fn active(&self) -> impl Iterator<Item = &Job> {
        self.active.iter()
    }

    pub fn finished(&self) -> impl Iterator<Item = &Job> {
        self.finished.iter()
    }
}
