use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

pub mod mux;

pub use mux::{PendingReply, ResponseMux};

/// The marker the inspector reprints before accepting each command. Reply
/// units are delimited on it, so it must match the binary's output exactly
/// (two trailing spaces).
pub const PROMPT: &str = "debugfs:  ";

#[derive(Error, Debug, Clone)]
pub enum InspectorError {
    #[error("Inspector stream ended with requests outstanding")]
    Closed,

    #[error("Inspector session disposed")]
    Disposed,

    #[error("Inspector stream error: {0}")]
    Stream(String),

    #[error("Protocol desynchronization: {0}")]
    Desync(String),
}

impl From<std::io::Error> for InspectorError {
    fn from(err: std::io::Error) -> Self {
        InspectorError::Stream(err.to_string())
    }
}

/// One interactive inspector subprocess and its command channel.
///
/// The inspector answers commands strictly in the order they arrive on its
/// input, one prompt-terminated reply per command. [`submit`] takes the
/// writer lock, writes the command, and registers the reply slot before
/// releasing the lock, so write order always equals reply-resolution order;
/// callers may pipeline any number of commands before awaiting a reply.
///
/// [`submit`]: InspectorSession::submit
pub struct InspectorSession<W> {
    writer: tokio::sync::Mutex<W>,
    mux: ResponseMux,
    child: Option<Child>,
}

impl InspectorSession<ChildStdin> {
    /// Launches `binary device` with piped stdio and discards the startup
    /// banner (everything up to the first prompt).
    pub async fn spawn(binary: &str, device: &Path) -> Result<Self, InspectorError> {
        let mut child = Command::new(binary)
            .arg(device)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InspectorError::Stream("inspector stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InspectorError::Stream("inspector stdout not captured".into()))?;

        info!(binary, device = %device.display(), "inspector started");

        let session = Self {
            writer: tokio::sync::Mutex::new(stdin),
            mux: ResponseMux::new(stdout, PROMPT),
            child: Some(child),
        };
        session.discard_banner().await?;
        Ok(session)
    }
}

impl<W: AsyncWrite + Unpin> InspectorSession<W> {
    /// Builds a session over arbitrary stream halves. Tests drive this with
    /// `tokio::io::duplex` pairs instead of a real subprocess.
    pub async fn open<R>(writer: W, reader: R) -> Result<Self, InspectorError>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let session = Self {
            writer: tokio::sync::Mutex::new(writer),
            mux: ResponseMux::new(reader, PROMPT),
            child: None,
        };
        session.discard_banner().await?;
        Ok(session)
    }

    async fn discard_banner(&self) -> Result<(), InspectorError> {
        self.mux.subscribe().recv().await?;
        Ok(())
    }

    /// Writes one command and reserves its reply slot. The slot is taken
    /// under the writer lock, which is the ordering guarantee everything
    /// else rests on.
    pub async fn submit(&self, command: &str) -> Result<PendingReply, InspectorError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(command.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        debug!(command, "submitted");
        Ok(self.mux.subscribe())
    }

    /// Awaits a reserved reply and strips the framing: the leading echo line
    /// and the trailing prompt marker. An empty remainder means the reply
    /// stream no longer lines up with the commands we sent.
    pub async fn resolve(&self, pending: PendingReply) -> Result<String, InspectorError> {
        let raw = pending.recv().await?;
        let Some((_echo, rest)) = raw.split_once('\n') else {
            return Err(InspectorError::Desync(format!(
                "reply unit carries no payload: {raw:?}"
            )));
        };
        let body = rest.strip_suffix(PROMPT).unwrap_or(rest);
        if body.trim().is_empty() {
            return Err(InspectorError::Desync(
                "empty reply where output was expected".into(),
            ));
        }
        Ok(body.to_string())
    }

    /// Submits one command and awaits its stripped reply.
    pub async fn run(&self, command: &str) -> Result<String, InspectorError> {
        let pending = self.submit(command).await?;
        self.resolve(pending).await
    }

    /// Fails every outstanding and future request.
    pub fn dispose(&self) {
        self.mux.dispose();
    }

    /// Closes the command channel and reaps the subprocess. The inspector
    /// exits on input EOF; its exit status is not inspected because a
    /// signal/non-zero exit after stdin closes is how it terminates.
    pub async fn close(self) -> Result<(), InspectorError> {
        let Self { writer, mux, child } = self;
        drop(writer);
        if let Some(mut child) = child {
            let status = child.wait().await?;
            debug!(?status, "inspector exited");
        }
        drop(mux);
        Ok(())
    }
}
