//! Single-instance-per-role local sockets.
//!
//! Every role listens on a well-known Unix socket. A starting process first
//! tries to connect: a live peer gets the message and the caller exits,
//! otherwise the caller binds and becomes that role. Delivery is
//! fire-and-forget; there is no acknowledgement and no retry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{CoreError, CoreResult};
use crate::relay::message::RelayMessage;

/// Upper bound on a single message; longer messages are rejected unparsed.
pub const MAX_MESSAGE_BYTES: u64 = 256 * 1024;

/// A process role that listens on its own socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The long-lived IO worker that executes jobs.
    Worker,
    /// A browsing session that shows progress and opens paths.
    Session,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Session => "session",
        }
    }

    /// `$XDG_RUNTIME_DIR/fmio-<role>-<uid>.sock`, or the same name in the
    /// temp dir when no runtime dir is set.
    pub fn socket_path(self) -> PathBuf {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .unwrap_or_else(std::env::temp_dir);
        // SAFETY: getuid has no preconditions and cannot fail
        let uid = unsafe { libc::getuid() };
        dir.join(format!("fmio-{}-{uid}.sock", self.name()))
    }
}

/// Result of [`claim`].
#[derive(Debug)]
pub enum Claim {
    /// A peer already holds the role and was handed the message.
    Forwarded,
    /// The caller now holds the role.
    Listening(RelayListener),
}

/// Bound socket for one role. The socket file is removed on drop.
#[derive(Debug)]
pub struct RelayListener {
    listener: UnixListener,
    socket: SocketFile,
}

/// Unlinks the socket path when dropped.
#[derive(Debug)]
struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A listener running on its own task, see [`RelayListener::spawn`].
#[derive(Debug)]
pub struct RelayServer {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Takes the role served at `path`, or forwards `message` to the peer that
/// already holds it. With no message the connection only probes liveness.
///
/// A socket file nobody answers on is left over from a crash; it is
/// removed and re-bound.
pub async fn claim(path: &Path, message: Option<&RelayMessage>) -> CoreResult<Claim> {
    match UnixStream::connect(path).await {
        Ok(mut stream) => {
            let result = match message {
                Some(message) => write_message(stream, message).await,
                None => stream.shutdown().await,
            };
            if let Err(e) = result {
                tracing::debug!("Forwarding to {} failed: {e}", path.display());
            }
            return Ok(Claim::Forwarded);
        }
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            tracing::info!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(Claim::Listening(RelayListener::bind(path)?))
}

/// Delivers `message` to whoever listens at `path`.
///
/// Returns whether the bytes were written; callers log and move on.
pub async fn send(path: &Path, message: &RelayMessage) -> bool {
    let result = match UnixStream::connect(path).await {
        Ok(stream) => write_message(stream, message).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Relay send to {} failed: {e}", path.display());
            false
        }
    }
}

async fn write_message(mut stream: UnixStream, message: &RelayMessage) -> std::io::Result<()> {
    stream.write_all(message.encode().as_bytes()).await?;
    stream.shutdown().await
}

/// Reads one message; an empty connection is a liveness probe and yields `None`.
async fn read_message(stream: UnixStream) -> CoreResult<Option<RelayMessage>> {
    let mut bytes = Vec::new();
    stream.take(MAX_MESSAGE_BYTES + 1).read_to_end(&mut bytes).await?;
    if bytes.len() as u64 > MAX_MESSAGE_BYTES {
        return Err(CoreError::Protocol("message too long".to_string()));
    }
    let raw = String::from_utf8(bytes).map_err(|_| CoreError::Protocol("message is not UTF-8".to_string()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    RelayMessage::parse(&raw).map(Some)
}

impl RelayListener {
    /// Binds a fresh socket at `path`. Fails if the file already exists.
    pub fn bind(path: &Path) -> CoreResult<Self> {
        let listener = UnixListener::bind(path)?;
        tracing::debug!("Relay listening on {}", path.display());
        Ok(Self {
            listener,
            socket: SocketFile {
                path: path.to_path_buf(),
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket.path
    }

    /// Waits for the next connection that carries a message and reads it.
    pub async fn next_message(&self) -> CoreResult<RelayMessage> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            if let Some(message) = read_message(stream).await? {
                return Ok(message);
            }
        }
    }

    /// Forwards every well-formed message to `tx` until the server is
    /// closed or dropped. Each connection is read on its own task so a slow
    /// client cannot stall the others.
    pub fn spawn(self, tx: UnboundedSender<RelayMessage>) -> RelayServer {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.serve(tx, stop_rx));
        RelayServer {
            stop: Some(stop_tx),
            task,
        }
    }

    async fn serve(self, tx: UnboundedSender<RelayMessage>, mut stop: oneshot::Receiver<()>) {
        let Self { listener, socket } = self;
        let mut reads = JoinSet::new();
        loop {
            tokio::select! {
                _ = &mut stop => break,
                Some(_) = reads.join_next(), if !reads.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        reads.spawn(forward(stream, tx.clone()));
                    }
                    Err(e) => tracing::warn!("Relay accept failed: {e}"),
                },
            }
        }

        // New clients now fail to connect and take the role themselves;
        // connections already queued on the socket are still read.
        drop(socket);
        match listener.into_std() {
            Ok(listener) => loop {
                match listener.accept() {
                    Ok((stream, _)) => match stream.set_nonblocking(true).and_then(|()| UnixStream::from_std(stream)) {
                        Ok(stream) => {
                            reads.spawn(forward(stream, tx.clone()));
                        }
                        Err(e) => tracing::warn!("Dropping queued relay connection: {e}"),
                    },
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        tracing::warn!("Relay accept failed while closing: {e}");
                        break;
                    }
                }
            },
            Err(e) => tracing::warn!("Cannot drain relay backlog: {e}"),
        }
        while reads.join_next().await.is_some() {}
        tracing::debug!("Relay closed");
    }
}

async fn forward(stream: UnixStream, tx: UnboundedSender<RelayMessage>) {
    match read_message(stream).await {
        Ok(Some(message)) => {
            let _ = tx.send(message);
        }
        Ok(None) => tracing::debug!("Relay probed"),
        Err(e) => tracing::warn!("Dropping relay message: {e}"),
    }
}

impl RelayServer {
    /// Stops accepting and removes the socket file, then returns once every
    /// connection made before that point has been read and forwarded.
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Relay task ended abnormally: {e}");
        }
    }
}
