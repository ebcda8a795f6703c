use thiserror::Error;

use crate::spool::job::{JobId, JobTarget};

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("{0} cannot be found")]
    NotFound(JobTarget),

    #[error("{0} cannot be removed")]
    NotRemovable(JobTarget),

    #[error("{0} cannot be moved to the front of the queue")]
    NotMovable(JobTarget),

    #[error("job {0} has no output stored")]
    NoOutputStored(JobId),

    #[error("run-slot contract violated: {0}")]
    Consistency(String),

    #[error("a daemon is already running with pid {0}")]
    AlreadyRunning(u32),

    #[error("cannot reach the daemon: {0}")]
    DaemonUnreachable(String),

    #[error("{0}")]
    Daemon(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpoolError>;
