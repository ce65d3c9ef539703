//! Control socket: one JSON command in, one JSON response out.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::{ControlCommand, ControlRequest, ControlResponse};

const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[instrument(skip(to_scheduler, cancel), fields(socket = %socket_path.display()))]
pub async fn serve(
    socket_path: PathBuf,
    to_scheduler: Sender<ControlRequest>,
    cancel: CancellationToken,
) -> Result<()> {
    claim_socket_path(&socket_path).await?;
    if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind control socket {}", socket_path.display()))?;
    info!("control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; closing control socket");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let to_scheduler = to_scheduler.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, to_scheduler).await {
                            debug!("control connection ended: {err:#}");
                        }
                    });
                }
                Err(err) => warn!("control accept failed: {err}"),
            }
        }
    }

    if let Err(err) = remove_stale_socket(&socket_path) {
        warn!("{err:#}");
    }
    Ok(())
}

async fn handle_connection(mut stream: UnixStream, to_scheduler: Sender<ControlRequest>) -> Result<()> {
    let mut raw = Vec::new();
    (&mut stream)
        .take(MAX_REQUEST_BYTES)
        .read_to_end(&mut raw)
        .await
        .context("failed to read control request")?;
    if raw.is_empty() {
        // Liveness check from another instance; nothing to answer.
        debug!("control connection closed without a request");
        return Ok(());
    }

    let response = match serde_json::from_slice::<ControlCommand>(&raw) {
        Ok(command) => forward(command, &to_scheduler).await,
        Err(err) => {
            warn!("malformed control request: {err}");
            ControlResponse::error(format!("malformed request: {err}"))
        }
    };

    let mut payload = serde_json::to_vec(&response)?;
    payload.push(b'\n');
    stream
        .write_all(&payload)
        .await
        .context("failed to write control response")?;
    stream.shutdown().await.ok();
    Ok(())
}

async fn forward(command: ControlCommand, to_scheduler: &Sender<ControlRequest>) -> ControlResponse {
    let (reply, response) = oneshot::channel();
    if to_scheduler
        .send(ControlRequest { command, reply })
        .await
        .is_err()
    {
        return ControlResponse::error("scheduler is not running");
    }
    response
        .await
        .unwrap_or_else(|_| ControlResponse::error("scheduler dropped the request"))
}

/// Send one command to a running daemon and wait for its answer.
pub async fn send_command(socket_path: &Path, command: &ControlCommand) -> Result<ControlResponse> {
    let mut stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "failed to connect to control socket at {}",
            socket_path.display()
        )
    })?;

    let payload = serde_json::to_vec(command)?;
    stream
        .write_all(&payload)
        .await
        .context("failed to send control command")?;
    stream
        .shutdown()
        .await
        .context("failed to finish control command")?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .context("failed to read control response")?;
    if raw.is_empty() {
        return Err(anyhow!("daemon closed the connection without answering"));
    }
    serde_json::from_slice(&raw).context("failed to parse control response")
}

/// Make `path` free for binding without stealing it from a live daemon.
///
/// A socket that accepts connections belongs to a running instance and is
/// left alone. Anything that refuses them is a leftover and gets removed.
async fn claim_socket_path(path: &Path) -> Result<()> {
    match UnixStream::connect(path).await {
        Ok(_) => bail!("daemon already running at {}", path.display()),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            remove_stale_socket(path)
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to check control socket {}", path.display()))
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(socket = %path.display(), "removed stale control socket");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}
