//! Client-side follow loop for `tail` and `cat`: print a job's output
//! file as it grows while waiting for the job to finish over the daemon
//! connection, then exit with the job's exit code.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::config::Config;
use crate::error::{Result, SpoolError};
use crate::ipc::{DaemonConnection, Request, Response};
use crate::spool::{JobId, JobTarget};

const BLOCK: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long to keep retrying the output query while a freshly dispatched
/// job has no execution info attached yet.
const RESOLVE_ATTEMPTS: u32 = 25;

/// Follows the target job's output. With `from_start` the whole file is
/// printed; otherwise only the last 10 lines are shown before following.
/// Returns the job's exit code.
pub async fn follow(config: &Config, target: JobTarget, from_start: bool) -> Result<i32> {
    let mut conn = DaemonConnection::connect_or_start(config).await?;
    let (job_id, path) = resolve_output(&mut conn, target).await?;

    // Register the wait on the same connection before reading the file,
    // so completion can never slip between the two.
    conn.send(&Request::Wait {
        target: JobTarget::Id(job_id),
    })
    .await?;

    // A dedicated task owns the connection from here; the file loop just
    // watches for its answer.
    let (done_tx, mut done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = done_tx.send(conn.recv().await);
    });

    let mut file = File::open(&path).await?;
    if !from_start {
        seek_to_last_lines(&mut file, 10).await?;
    }

    let mut stdout = tokio::io::stdout();
    let mut buf = [0u8; BLOCK];
    let mut exit_code: Option<i32> = None;

    loop {
        // Drain whatever the job has written so far.
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stdout.write_all(&buf[..n]).await?;
        }
        stdout.flush().await?;

        if let Some(code) = exit_code {
            // The job is done and the file is drained.
            return Ok(code);
        }

        tokio::select! {
            answer = &mut done_rx => {
                let resp = answer
                    .map_err(|_| SpoolError::Protocol("wait task ended without an answer".to_string()))??;
                exit_code = Some(match resp {
                    Response::WaitDone { exit_code } => exit_code,
                    Response::Error { message } => return Err(SpoolError::Daemon(message)),
                    other => {
                        return Err(SpoolError::Protocol(format!(
                            "unexpected wait answer: {:?}",
                            other
                        )))
                    }
                });
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Asks the daemon for the job's output path, retrying through the
/// transient window where a running job has no execution info yet.
async fn resolve_output(
    conn: &mut DaemonConnection,
    target: JobTarget,
) -> Result<(JobId, PathBuf)> {
    let mut attempts = 0;
    loop {
        match conn.request(&Request::Output { target }).await? {
            Response::OutputInfo {
                job_id,
                output_path,
                ..
            } => return Ok((job_id, PathBuf::from(output_path))),
            Response::Error { message }
                if message.contains("cannot be found") && attempts < RESOLVE_ATTEMPTS =>
            {
                attempts += 1;
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Response::Error { message } => return Err(SpoolError::Daemon(message)),
            other => {
                return Err(SpoolError::Protocol(format!(
                    "unexpected output answer: {:?}",
                    other
                )))
            }
        }
    }
}

/// Positions the file so that reading forward yields at most the last
/// `lines` lines, scanning backwards from the end in 1 KiB blocks.
async fn seek_to_last_lines(file: &mut File, lines: usize) -> Result<()> {
    let len = file.seek(SeekFrom::End(0)).await?;
    let mut buf = [0u8; BLOCK];
    let mut pos = len;
    let mut newlines = 0;
    let mut offset = 0;

    'scan: while pos > 0 {
        let chunk = pos.min(BLOCK as u64);
        pos -= chunk;
        file.seek(SeekFrom::Start(pos)).await?;
        file.read_exact(&mut buf[..chunk as usize]).await?;

        for i in (0..chunk as usize).rev() {
            if buf[i] == b'\n' {
                newlines += 1;
                // One extra newline: the line terminator before the
                // first line we want to print.
                if newlines > lines {
                    offset = pos + i as u64 + 1;
                    break 'scan;
                }
            }
        }
    }

    file.seek(SeekFrom::Start(offset)).await?;
    Ok(())
}
