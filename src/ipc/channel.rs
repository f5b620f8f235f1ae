//! Duplex byte channel to the tool server.
//!
//! `DuplexChannel` owns one outbound stream (operator → server) and one
//! inbound stream (server → operator) and moves whole frames over them.
//!
//! # Transports
//!
//! - **Child pipes**: the server is spawned with piped stdin/stdout. Both
//!   directions exist the moment the process does, so there is no ordering
//!   to get wrong.
//! - **Named pipes**: two FIFOs, `mcp.stdin` and `mcp.stdout`. Opening one end
//!   of a FIFO blocks until the other end is opened, so the open order is
//!   part of the protocol:
//!
//!   1. we open the read end of `mcp.stdout` non-blocking (never waits);
//!   2. the peer opens `mcp.stdout` for writing, *then* `mcp.stdin` for reading;
//!   3. we open the write end of `mcp.stdin` non-blocking, retrying while the
//!      kernel reports `ENXIO` (no reader yet).
//!
//!   When we spawn the peer ourselves its shell redirects are ordered to match.
//! - **Streams**: any `AsyncRead`/`AsyncWrite` pair, for tests and embedding.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::framing::Framing;

/// Conventional name of the operator → server FIFO.
pub const FIFO_TO_SERVER: &str = "mcp.stdin";

/// Conventional name of the server → operator FIFO.
pub const FIFO_FROM_SERVER: &str = "mcp.stdout";

/// How long a peer gets to exit after its stdin closes before it is killed.
const PEER_EXIT_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on the delay between write-end open attempts.
#[cfg(unix)]
const MAX_OPEN_BACKOFF: Duration = Duration::from_millis(500);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel could not be established. Fatal to the session.
    #[error("failed to open {resource}: {source}")]
    Open {
        /// What was being opened (a path or a command line).
        resource: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// The peer closed its end of the channel.
    #[error("channel closed by peer")]
    Closed,

    /// No response arrived in time.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// A frame exceeded the size limit.
    #[error("frame of {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// The byte stream did not follow the framing rules.
    #[error("framing error: {0}")]
    Framing(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => {
                TransportError::Closed
            }
            _ => TransportError::Io(err),
        }
    }
}

impl TransportError {
    fn open(resource: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::Open {
            resource: resource.into(),
            source,
        }
    }
}

/// Which transport to establish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// Spawn `command` via `sh -c` and talk over its stdio.
    Child { command: String },
    /// Talk over `mcp.stdin` / `mcp.stdout` in `dir`, optionally spawning the
    /// peer with its stdio redirected to them.
    Fifo {
        dir: PathBuf,
        server_command: Option<String>,
        open_attempts: u32,
    },
}

/// Two-way frame channel to a tool server.
pub struct DuplexChannel {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    framing: Framing,
    peer: Option<Child>,
    label: String,
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("label", &self.label)
            .field("framing", &self.framing)
            .field("peer", &self.peer.as_ref().and_then(Child::id))
            .finish()
    }
}

impl DuplexChannel {
    /// Establish the channel described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Open` if any part of the channel cannot be
    /// created; nothing is left running in that case.
    pub async fn open(spec: &TransportSpec, framing: Framing) -> Result<Self, TransportError> {
        match spec {
            TransportSpec::Child { command } => Self::spawn_child(command, framing),
            #[cfg(unix)]
            TransportSpec::Fifo {
                dir,
                server_command,
                open_attempts,
            } => Self::open_fifos(dir, server_command.as_deref(), *open_attempts, framing).await,
            #[cfg(not(unix))]
            TransportSpec::Fifo { .. } => Err(TransportError::open(
                "named pipes",
                std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "named pipes require a unix platform",
                ),
            )),
        }
    }

    /// Wrap an existing stream pair.
    pub fn from_streams<R, W>(reader: R, writer: W, framing: Framing) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(reader) as BoxedReader),
            writer: Box::new(writer),
            framing,
            peer: None,
            label: "in-memory streams".to_string(),
        }
    }

    /// Spawn the server and connect to its stdin/stdout.
    pub fn spawn_child(command: &str, framing: Framing) -> Result<Self, TransportError> {
        info!("Starting MCP server: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::open(command, e))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::open(command, missing_handle("stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::open(command, missing_handle("stdout"))
        })?;

        Ok(Self {
            reader: BufReader::new(Box::new(stdout) as BoxedReader),
            writer: Box::new(stdin),
            framing,
            peer: Some(child),
            label: format!("`{}`", command),
        })
    }

    /// Create fresh FIFOs in `dir` and connect through them.
    ///
    /// If `server_command` is given the peer is spawned between opening the
    /// read end and the write end, with redirects in the required order.
    #[cfg(unix)]
    pub async fn open_fifos(
        dir: &Path,
        server_command: Option<&str>,
        open_attempts: u32,
        framing: Framing,
    ) -> Result<Self, TransportError> {
        use tokio::net::unix::pipe;

        let to_server = dir.join(FIFO_TO_SERVER);
        let from_server = dir.join(FIFO_FROM_SERVER);

        recreate_fifo(&to_server)?;
        recreate_fifo(&from_server)?;

        // Read end first: O_NONBLOCK makes this return immediately.
        let mut options = pipe::OpenOptions::new();
        // Holding the FIFO read-write keeps reads from seeing EOF before the
        // peer has attached its write end.
        #[cfg(target_os = "linux")]
        options.read_write(true);
        let receiver = options
            .open_receiver(&from_server)
            .map_err(|e| TransportError::open(from_server.display().to_string(), e))?;
        debug!("Opened read end {}", from_server.display());

        let mut peer = match server_command {
            Some(command) => Some(spawn_fifo_peer(command, &to_server, &from_server)?),
            None => {
                info!(
                    "Waiting for a peer to open {} (write) then {} (read)",
                    from_server.display(),
                    to_server.display()
                );
                None
            }
        };

        let sender = open_sender_with_retry(&to_server, open_attempts, peer.as_mut()).await?;
        debug!("Opened write end {}", to_server.display());

        Ok(Self {
            reader: BufReader::new(Box::new(receiver) as BoxedReader),
            writer: Box::new(sender),
            framing,
            peer,
            label: format!("{} / {}", to_server.display(), from_server.display()),
        })
    }

    /// Human-readable description of the peer endpoint.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write one frame.
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<(), TransportError> {
        debug!("→ {}", String::from_utf8_lossy(body));
        self.framing.write_frame(&mut self.writer, body).await
    }

    /// Read one frame. Blocks until a full frame arrives or the peer closes.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let frame = self.framing.read_frame(&mut self.reader).await?;
        debug!("← {}", String::from_utf8_lossy(&frame));
        Ok(frame)
    }

    /// Exit status of a spawned peer, if it has already exited.
    pub fn peer_exit_status(&mut self) -> Option<ExitStatus> {
        self.peer.as_mut()?.try_wait().ok().flatten()
    }

    /// Release both halves and reap the peer.
    ///
    /// Closing the writer gives the peer EOF on its stdin; a peer that is still
    /// running after a short grace period is killed.
    pub async fn close(self) {
        let DuplexChannel {
            reader,
            mut writer,
            peer,
            label,
            ..
        } = self;

        if let Err(e) = writer.shutdown().await {
            debug!("Error shutting down writer for {}: {}", label, e);
        }
        drop(writer);
        drop(reader);

        let Some(mut child) = peer else {
            return;
        };

        match timeout(PEER_EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("MCP server exited: {}", status),
            Ok(Err(e)) => warn!("Error waiting for MCP server: {}", e),
            Err(_) => {
                warn!("MCP server didn't exit gracefully, killing");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill MCP server: {}", e);
                }
            }
        }
    }
}

fn missing_handle(which: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("child {} handle unavailable", which),
    )
}

/// Remove whatever is at `path` and create a new FIFO there (mode 0600).
#[cfg(unix)]
fn recreate_fifo(path: &Path) -> Result<(), TransportError> {
    use nix::sys::stat::Mode;

    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(TransportError::open(path.display().to_string(), e)),
    }

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)
        .map_err(|errno| TransportError::open(path.display().to_string(), errno.into()))
}

/// Spawn the FIFO peer. Its shell opens `mcp.stdout` for writing before
/// `mcp.stdin` for reading.
#[cfg(unix)]
fn spawn_fifo_peer(command: &str, to_server: &Path, from_server: &Path) -> Result<Child, TransportError> {
    info!("Starting MCP server on named pipes: {}", command);

    // Redirects are applied left to right; "$1"/"$2" avoid quoting the paths.
    let script = format!("exec >\"$1\" <\"$2\"\n{}", command);
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .arg("mcp-server")
        .arg(from_server)
        .arg(to_server)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TransportError::open(command, e))
}

/// Open the FIFO write end, retrying with exponential backoff while no reader
/// is attached.
#[cfg(unix)]
async fn open_sender_with_retry(
    path: &Path,
    max_attempts: u32,
    mut peer: Option<&mut Child>,
) -> Result<tokio::net::unix::pipe::Sender, TransportError> {
    use nix::errno::Errno;
    use tokio::net::unix::pipe;

    let resource = path.display().to_string();
    let mut delay = Duration::from_millis(10);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(sender),
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                debug!("No reader on {} yet (attempt {}/{})", resource, attempt, max_attempts);
                last_error = Some(e);
            }
            Err(e) => return Err(TransportError::open(resource, e)),
        }

        if let Some(child) = peer.as_deref_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(TransportError::open(
                    resource,
                    std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        format!("MCP server exited before attaching: {}", status),
                    ),
                ));
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_OPEN_BACKOFF);
        }
    }

    Err(TransportError::open(
        resource,
        last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "no open attempts configured")
        }),
    ))
}
