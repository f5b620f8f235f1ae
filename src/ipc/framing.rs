//! Message framing for JSON-RPC over byte streams.
//!
//! Two framings are supported:
//!
//! - [`Framing::Lines`] (default): one compact JSON text per line, terminated
//!   by `\n`. This is what stdio MCP servers speak.
//! - [`Framing::ContentLength`]: HTTP-style headers, as used by LSP:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Header parsing is case-insensitive and handles both CRLF and LF line endings.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::channel::TransportError;

/// Maximum frame size (100MB) to prevent OOM from malicious/buggy servers.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Wire framing used on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Framing {
    /// Newline-delimited JSON.
    #[default]
    Lines,
    /// `Content-Length` header framing.
    ContentLength,
}

impl Framing {
    /// Read one frame body from the stream.
    ///
    /// Returns [`TransportError::Closed`] on EOF before a complete frame.
    pub async fn read_frame<R>(self, reader: &mut R) -> Result<Vec<u8>, TransportError>
    where
        R: AsyncBufRead + Unpin,
    {
        match self {
            Framing::Lines => read_line_frame(reader).await,
            Framing::ContentLength => read_content_length_frame(reader).await,
        }
    }

    /// Write one frame body to the stream and flush it.
    pub async fn write_frame<W>(self, writer: &mut W, body: &[u8]) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        if body.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        match self {
            Framing::Lines => {
                if body.contains(&b'\n') {
                    return Err(TransportError::Framing(
                        "line-delimited frame body contains a newline".to_string(),
                    ));
                }
                writer.write_all(body).await?;
                writer.write_all(b"\n").await?;
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                writer.write_all(header.as_bytes()).await?;
                writer.write_all(body).await?;
            }
        }

        writer.flush().await?;
        Ok(())
    }
}

/// Read the next non-blank line, without its terminator.
async fn read_line_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        let bytes_read = (&mut *reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;

        // EOF - peer closed its write end
        if bytes_read == 0 {
            return Err(TransportError::Closed);
        }

        if line.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: line.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // A final line without '\n' means the peer closed mid-frame
        if line.last() != Some(&b'\n') {
            return Err(TransportError::Closed);
        }

        let body = line.trim_ascii();
        if !body.is_empty() {
            return Ok(body.to_vec());
        }
    }
}

/// Read a `Content-Length` framed message body.
///
/// 1. Read headers until an empty line (handles both CRLF and LF)
/// 2. Extract Content-Length header (case-insensitive)
/// 3. Read exactly that many bytes for the body
async fn read_content_length_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Err(TransportError::Closed);
        }

        let trimmed = line.trim();

        // Empty line signals end of headers
        if trimmed.is_empty() {
            if !saw_header {
                // Tolerate stray blank lines between messages
                continue;
            }
            break;
        }
        saw_header = true;

        if let Some((key, value)) = trimmed.split_once(':') {
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                let parsed = value.parse().map_err(|_| {
                    TransportError::Framing(format!("invalid Content-Length value: {}", value))
                })?;
                content_length = Some(parsed);
            }
            // Ignore other headers (e.g., Content-Type)
        } else {
            return Err(TransportError::Framing(format!(
                "expected a header line, got: {}",
                trimmed
            )));
        }
    }

    let size = content_length
        .ok_or_else(|| TransportError::Framing("missing Content-Length header".to_string()))?;

    if size > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::Io(e)
        }
    })?;

    Ok(body)
}
