use tokio::sync::oneshot;

use crate::spool::job::JobId;

/// Identifies one client connection; the connection handler allocates
/// one per accepted socket.
pub type ClientId = u64;

/// One client blocked on "wake me when job X finishes".
#[derive(Debug)]
struct NotificationEntry {
    client: ClientId,
    job_id: JobId,
    sender: oneshot::Sender<i32>,
}

/// Pending wait registrations, fired by the scheduler on completion.
#[derive(Debug, Default)]
pub struct NotifyRegistry {
    entries: Vec<NotificationEntry>,
}

impl NotifyRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a waiter. A client holds at most one entry: a new wait
    /// on the same channel replaces the old one, whose receiver then
    /// observes the dropped sender.
    pub fn register(&mut self, client: ClientId, job_id: JobId, sender: oneshot::Sender<i32>) {
        self.entries.retain(|e| e.client != client);
        self.entries.push(NotificationEntry {
            client,
            job_id,
            sender,
        });
    }

    /// Sends the exit code to every waiter on `job_id` and removes the
    /// fired entries. Each waiter is notified at most once. Returns how
    /// many were notified.
    pub fn fire(&mut self, job_id: JobId, exit_code: i32) -> usize {
        let mut fired = 0;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].job_id == job_id {
                let entry = self.entries.swap_remove(i);
                // A closed receiver just means the client went away first.
                let _ = entry.sender.send(exit_code);
                fired += 1;
            } else {
                i += 1;
            }
        }
        fired
    }

    /// Drops any entry owned by `client` without notifying. Used on
    /// disconnect; no-op if the client has no entry.
    pub fn cancel(&mut self, client: ClientId) {
        self.entries.retain(|e| e.client != client);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
