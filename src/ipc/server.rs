//! Server side of the daemon socket: the accept loop and per-connection
//! request dispatch. All core operations funnel through the spool mutex,
//! one request at a time.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;

use crate::daemon::DaemonState;
use crate::error::Result;
use crate::ipc::protocol::{
    deserialize_message, serialize_message, Request, Response, MAX_REQUEST_FRAME_SIZE,
};
use crate::spool::{ClientId, WaitDisposition};

enum Dispatch {
    Reply(Response),
    ReplyAndShutdown(Response),
    /// A wait was registered; the exit code arrives on this receiver.
    Park(oneshot::Receiver<i32>),
}

/// Accepts connections until the shutdown token trips.
pub async fn serve(listener: UnixListener, state: Arc<DaemonState>) -> Result<()> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        let client = state.next_client_id();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(state, stream, client).await {
                                tracing::debug!(client, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = state.shutdown.cancelled() => {
                return Ok(());
            }
        }
    }
}

async fn handle_client(
    state: Arc<DaemonState>,
    mut stream: UnixStream,
    client: ClientId,
) -> Result<()> {
    let (read, mut writer) = stream.split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    loop {
        line.clear();
        let n = tokio::select! {
            r = reader.read_line(&mut line) => r?,
            _ = state.shutdown.cancelled() => break,
        };
        if n == 0 {
            break;
        }

        if line.len() > MAX_REQUEST_FRAME_SIZE {
            let resp = Response::Error {
                message: format!("request frame too large: {} bytes", line.len()),
            };
            write_response(&mut writer, &resp).await?;
            continue;
        }

        let request = match deserialize_message::<Request>(line.as_bytes()) {
            Ok(request) => request,
            Err(e) => {
                let resp = Response::Error {
                    message: format!("malformed request: {}", e),
                };
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        match dispatch(&state, client, request).await {
            Dispatch::Reply(resp) => {
                write_response(&mut writer, &resp).await?;
            }
            Dispatch::ReplyAndShutdown(resp) => {
                write_response(&mut writer, &resp).await?;
                tracing::info!(client, "shutdown requested");
                state.shutdown.cancel();
            }
            Dispatch::Park(mut rx) => {
                // The connection is held until the job finishes. A read
                // returning 0 here means the client went away, which
                // cancels its registration.
                let mut probe = String::new();
                tokio::select! {
                    res = &mut rx => {
                        let resp = match res {
                            Ok(exit_code) => Response::WaitDone { exit_code },
                            Err(_) => Response::Error {
                                message: "the wait was cancelled".to_string(),
                            },
                        };
                        write_response(&mut writer, &resp).await?;
                    }
                    r = reader.read_line(&mut probe) => {
                        state.spool.lock().await.cancel_wait(client);
                        match r {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {
                                let resp = Response::Error {
                                    message: "a wait is outstanding on this connection".to_string(),
                                };
                                write_response(&mut writer, &resp).await?;
                            }
                        }
                    }
                    _ = state.shutdown.cancelled() => break,
                }
            }
        }
    }

    state.spool.lock().await.cancel_wait(client);
    Ok(())
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    response: &Response,
) -> Result<()> {
    let bytes = serialize_message(response)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

async fn dispatch(state: &DaemonState, client: ClientId, request: Request) -> Dispatch {
    tracing::debug!(client, request = ?request, "dispatching request");
    let mut spool = state.spool.lock().await;

    match request {
        Request::Submit {
            command,
            store_output,
        } => {
            let job_id = spool.submit(command, store_output);
            drop(spool);
            state.kick.notify_one();
            Dispatch::Reply(Response::Submitted { job_id })
        }

        Request::List => Dispatch::Reply(Response::Listing {
            text: spool.render(),
        }),

        Request::Remove { target } => reply(
            spool
                .remove(target)
                .map(|job_id| Response::Removed { job_id }),
        ),

        Request::Urgent { target } => reply(
            spool
                .urgent(target)
                .map(|job_id| Response::Moved { job_id }),
        ),

        Request::Output { target } => reply(spool.output_info(target).map(|info| {
            Response::OutputInfo {
                job_id: info.job_id,
                pid: info.pid,
                output_path: info.output_path.display().to_string(),
            }
        })),

        Request::JobState { target } => {
            reply(spool.job_state(target).map(|state| Response::State { state }))
        }

        Request::ClearFinished => {
            spool.clear_finished();
            Dispatch::Reply(Response::Cleared)
        }

        Request::Wait { target } => match spool.wait(client, target) {
            Ok(WaitDisposition::Immediate(exit_code)) => {
                Dispatch::Reply(Response::WaitDone { exit_code })
            }
            Ok(WaitDisposition::Registered(rx)) => Dispatch::Park(rx),
            Err(e) => Dispatch::Reply(Response::Error {
                message: e.to_string(),
            }),
        },

        Request::Shutdown => Dispatch::ReplyAndShutdown(Response::ShuttingDown),
    }
}

fn reply(result: Result<Response>) -> Dispatch {
    match result {
        Ok(resp) => Dispatch::Reply(resp),
        Err(e) => Dispatch::Reply(Response::Error {
            message: e.to_string(),
        }),
    }
}
