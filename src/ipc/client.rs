//! Client side of the daemon socket: connect (starting the daemon when
//! it is not up yet) and exchange framed messages.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::config::Config;
use crate::error::{Result, SpoolError};
use crate::ipc::protocol::{
    deserialize_message, serialize_message, Request, Response, MAX_RESPONSE_FRAME_SIZE,
};

/// One connection to the daemon, carrying a sequence of request/response
/// pairs. The daemon answers each request fully before reading the next.
pub struct DaemonConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonConnection {
    /// Connects to a daemon that is expected to be up already.
    pub async fn connect(config: &Config) -> Result<Self> {
        match UnixStream::connect(&config.socket_path).await {
            Ok(stream) => {
                let (read, write) = stream.into_split();
                Ok(Self {
                    reader: BufReader::new(read),
                    writer: write,
                })
            }
            Err(e) => Err(SpoolError::DaemonUnreachable(format!(
                "{}: {}",
                config.socket_path.display(),
                e
            ))),
        }
    }

    /// Connects, spawning `spoolq server` as a detached child first when
    /// no daemon answers, and retrying the connect for up to 2 seconds.
    pub async fn connect_or_start(config: &Config) -> Result<Self> {
        if let Ok(conn) = Self::connect(config).await {
            return Ok(conn);
        }

        let exe = std::env::current_exe()?;
        tracing::debug!(exe = %exe.display(), "no daemon answering, starting one");
        std::process::Command::new(exe)
            .arg("server")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(conn) = Self::connect(config).await {
                return Ok(conn);
            }
        }

        Err(SpoolError::DaemonUnreachable(format!(
            "daemon did not come up within 2 seconds (socket {})",
            config.socket_path.display()
        )))
    }

    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let bytes = serialize_message(request)?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Response> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(SpoolError::Protocol(
                "daemon closed the connection".to_string(),
            ));
        }
        if line.len() > MAX_RESPONSE_FRAME_SIZE {
            return Err(SpoolError::Protocol(format!(
                "response frame too large: {} bytes",
                line.len()
            )));
        }
        Ok(deserialize_message(line.as_bytes())?)
    }

    /// One request/response exchange.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        self.send(request).await?;
        self.recv().await
    }
}
