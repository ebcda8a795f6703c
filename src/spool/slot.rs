use crate::spool::job::JobId;

/// The single run slot. `FREE` is modelled as `None`, `WAITING` as
/// `Some(id)` so the currently running job is recorded explicitly rather
/// than assumed from list order.
#[derive(Debug, Default)]
pub struct RunSlot {
    running: Option<JobId>,
}

impl RunSlot {
    pub fn new() -> Self {
        Self { running: None }
    }

    pub fn is_free(&self) -> bool {
        self.running.is_none()
    }

    pub fn running_job(&self) -> Option<JobId> {
        self.running
    }

    pub fn occupy(&mut self, id: JobId) {
        self.running = Some(id);
    }

    pub fn release(&mut self) {
        self.running = None;
    }
}
