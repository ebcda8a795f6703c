//! Wire protocol for the daemon socket: newline-delimited JSON frames,
//! one serde-tagged message per line.

use serde::{Deserialize, Serialize};

use crate::spool::{JobId, JobState, JobTarget};

/// Largest accepted request frame (1 MiB).
pub const MAX_REQUEST_FRAME_SIZE: usize = 1024 * 1024;
/// Largest accepted response frame (10 MiB).
pub const MAX_RESPONSE_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Client -> daemon request, one per decoded frame. Each maps 1:1 to a
/// core operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Submit { command: String, store_output: bool },
    List,
    Remove { target: JobTarget },
    Wait { target: JobTarget },
    Urgent { target: JobTarget },
    Output { target: JobTarget },
    JobState { target: JobTarget },
    ClearFinished,
    Shutdown,
}

/// Daemon -> client response. User-triggered failures travel as `Error`
/// on the same path as success; clients tell them apart by the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Submitted {
        job_id: JobId,
    },
    Listing {
        text: String,
    },
    Removed {
        job_id: JobId,
    },
    WaitDone {
        exit_code: i32,
    },
    Moved {
        job_id: JobId,
    },
    OutputInfo {
        job_id: JobId,
        pid: u32,
        output_path: String,
    },
    State {
        state: JobState,
    },
    Cleared,
    ShuttingDown,
    Error {
        message: String,
    },
}

/// Serialize a message to JSON bytes with the newline delimiter.
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize one message from a frame (strips the trailing newline).
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = match bytes.last() {
        Some(b'\n') => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    serde_json::from_slice(trimmed)
}
