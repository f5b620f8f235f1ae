//! The interactive probe loop.
//!
//! A `Session` owns the channel and the tool registry. Each operator line is
//! interpreted, at most one request is sent, and exactly one response is
//! awaited before the prompt comes back. Notifications that arrive while
//! waiting are shown and skipped.
//!
//! Shutdown is observed only while waiting: for the next operator line, for a
//! guided-call answer, or for a response. A frame write that has started is
//! always completed.

use std::io::Write;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::interpreter::{Command, CommandError, CommandInterpreter, GuidedCall, Outbound};
use crate::ipc::codec::{self, CodecError, Incoming};
use crate::ipc::{DuplexChannel, TransportError};
use crate::models::{JsonRpcResponse, RequestId};
use crate::registry::{tools_from_discovery, ToolRegistry};

/// Operator prompt.
pub const PROMPT: &str = "mcp> ";

/// Errors for one operator command. None of these end the session except
/// `Interrupted` and `Console`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The outbound payload could not be encoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] CodecError),

    /// The server replied with something that is not a JSON-RPC response.
    #[error("malformed response: {0}")]
    MalformedResponse(#[source] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The spawned server is gone.
    #[error("MCP server exited ({0})")]
    PeerExited(ExitStatus),

    /// Operator input ended while answering a guided call.
    #[error("input ended before all arguments were entered")]
    PromptAborted,

    /// Shutdown was requested.
    #[error("interrupted")]
    Interrupted,

    /// Writing to or reading from the operator console failed.
    #[error("console I/O error: {0}")]
    Console(#[from] std::io::Error),
}

/// Line reader for operator input.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// stray byte costs one command instead of the session. Partial lines
/// survive a cancelled read.
#[derive(Debug)]
struct OperatorInput<I> {
    reader: I,
    pending: Vec<u8>,
}

impl<I: AsyncBufRead + Unpin> OperatorInput<I> {
    fn new(reader: I) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

/// Why the session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Operator input reached end of file.
    EndOfInput,
    /// Shutdown was requested.
    Interrupted,
}

/// Probe session over an established channel.
#[derive(Debug)]
pub struct Session {
    channel: DuplexChannel,
    registry: ToolRegistry,
    response_timeout: Option<Duration>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    /// Create a session. `response_timeout` of `None` waits forever.
    pub fn new(channel: DuplexChannel, response_timeout: Option<Duration>) -> Self {
        // The sender is dropped at once, so this receiver never fires
        let (_never, shutdown) = watch::channel(false);
        Self {
            channel,
            registry: ToolRegistry::new(),
            response_timeout,
            shutdown,
        }
    }

    /// End the session when `shutdown` becomes `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run until operator input ends or shutdown is requested, then close
    /// the channel.
    ///
    /// Only console failures are returned as errors; command failures are
    /// rendered to `output` and the loop continues.
    pub async fn run<I, O>(mut self, input: I, output: &mut O) -> std::io::Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
    {
        let result = self.run_loop(input, output).await;
        info!("Closing channel to {}", self.channel.label());
        self.channel.close().await;
        result
    }

    async fn run_loop<I, O>(&mut self, input: I, output: &mut O) -> std::io::Result<SessionEnd>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
    {
        let mut lines = OperatorInput::new(input);

        loop {
            write!(output, "{}", PROMPT)?;
            output.flush()?;

            let line = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return Ok(SessionEnd::Interrupted),
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    writeln!(output)?;
                    return Ok(SessionEnd::EndOfInput);
                }
                Err(e) => {
                    error!("Failed to read operator input: {}", e);
                    return Err(e);
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.handle_line(line, &mut lines, output).await {
                Ok(()) => {}
                Err(SessionError::Interrupted) => return Ok(SessionEnd::Interrupted),
                Err(SessionError::Console(e)) => return Err(e),
                Err(e) => {
                    warn!("Command failed: {}", e);
                    writeln!(output, "Error: {}", e)?;
                }
            }
        }
    }

    async fn handle_line<I, O>(
        &mut self,
        line: &str,
        lines: &mut OperatorInput<I>,
        output: &mut O,
    ) -> Result<(), SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
    {
        let command = CommandInterpreter::new(&self.registry).interpret(line)?;

        let outbound = match command {
            Command::Local(text) => {
                writeln!(output, "{}", text)?;
                return Ok(());
            }
            Command::Send(outbound) => outbound,
            Command::Prompt(guided) => {
                let answers = self.collect_answers(&guided, lines, output).await?;
                Outbound::Request(guided.into_request(answers))
            }
        };

        let frame = outbound.encode().map_err(SessionError::InvalidPayload)?;
        writeln!(output, "Sending: {}", String::from_utf8_lossy(&frame))?;
        output.flush()?;

        let response = self.round_trip(&frame, outbound.expected_id(), output).await?;
        self.render_response(&response, output)
    }

    async fn collect_answers<I, O>(
        &mut self,
        guided: &GuidedCall,
        lines: &mut OperatorInput<I>,
        output: &mut O,
    ) -> Result<Vec<String>, SessionError>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
    {
        for warning in &guided.warnings {
            writeln!(output, "warning: {}", warning)?;
        }

        let mut answers = Vec::with_capacity(guided.fields.len());
        for field in &guided.fields {
            write!(output, "Enter value for {}: ", field)?;
            output.flush()?;

            let answer = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return Err(SessionError::Interrupted),
                answer = lines.next_line() => answer?,
            };
            match answer {
                Some(answer) => answers.push(answer),
                None => return Err(SessionError::PromptAborted),
            }
        }
        Ok(answers)
    }

    /// Write one frame and wait for its response.
    async fn round_trip<O: Write>(
        &mut self,
        frame: &[u8],
        expected: Option<&RequestId>,
        output: &mut O,
    ) -> Result<JsonRpcResponse, SessionError> {
        let result = self.exchange(frame, output).await;

        let response = match result {
            Err(SessionError::Transport(TransportError::Closed)) => {
                return Err(match self.channel.peer_exit_status() {
                    Some(status) => SessionError::PeerExited(status),
                    None => TransportError::Closed.into(),
                });
            }
            other => other?,
        };

        if let Some(expected) = expected {
            if response.id.as_ref() != Some(expected) {
                warn!(
                    "Response id {} does not match request id {}",
                    response
                        .id
                        .as_ref()
                        .map_or_else(|| "null".to_string(), ToString::to_string),
                    expected
                );
            }
        }

        Ok(response)
    }

    async fn exchange<O: Write>(
        &mut self,
        frame: &[u8],
        output: &mut O,
    ) -> Result<JsonRpcResponse, SessionError> {
        self.channel.write_frame(frame).await?;

        let response_timeout = self.response_timeout;
        let reply = next_response(&mut self.channel, output);
        let bounded = async {
            match response_timeout {
                Some(limit) => match tokio::time::timeout(limit, reply).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(limit).into()),
                },
                None => reply.await,
            }
        };

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => Err(SessionError::Interrupted),
            result = bounded => result,
        }
    }

    fn render_response<O: Write>(
        &mut self,
        response: &JsonRpcResponse,
        output: &mut O,
    ) -> Result<(), SessionError> {
        let pretty = serde_json::to_string_pretty(response)
            .map_err(|e| SessionError::MalformedResponse(CodecError::Encode(e)))?;
        writeln!(output, "Response:\n{}", pretty)?;

        if let Some(err) = &response.error {
            writeln!(output, "Server error {}: {}", err.code, err.message)?;
        }

        if let Some(entries) = response.discovered_tools() {
            let tools = tools_from_discovery(entries);
            let skipped = entries.len() - tools.len();
            self.registry.replace_all(tools);
            info!("Cached {} tool schemas", self.registry.len());
            writeln!(output, "Cached {} tool schemas", self.registry.len())?;
            if skipped > 0 {
                writeln!(output, "Skipped {} malformed tool entries", skipped)?;
            }
        }

        Ok(())
    }
}

/// Read frames until a response arrives, rendering notifications on the way.
async fn next_response<O: Write>(
    channel: &mut DuplexChannel,
    output: &mut O,
) -> Result<JsonRpcResponse, SessionError> {
    loop {
        let frame = channel.read_frame().await?;
        match codec::decode_incoming(&frame).map_err(SessionError::MalformedResponse)? {
            Incoming::Response(response) => return Ok(response),
            Incoming::Notification(notification) => {
                debug!("Skipping notification {}", notification.method);
                let params = notification
                    .params
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                writeln!(output, "Notification: {} {}", notification.method, params)?;
            }
        }
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Framing;
    use pretty_assertions::assert_eq;
    use tokio::io::{duplex, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    struct FakeServer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        async fn expect(&mut self) -> String {
            timeout(TEST_TIMEOUT, self.lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }

        async fn reply(&mut self, frame: &str) {
            self.writer.write_all(frame.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }
    }

    fn session(response_timeout: Option<Duration>) -> (Session, FakeServer) {
        let (ours, theirs) = duplex(64 * 1024);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);
        let channel = DuplexChannel::from_streams(our_read, our_write, Framing::Lines);
        let server = FakeServer {
            lines: BufReader::new(their_read).lines(),
            writer: their_write,
        };
        (Session::new(channel, response_timeout), server)
    }

    #[tokio::test]
    async fn test_local_command_sends_nothing() {
        let (mut session, _server) = session(None);
        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();

        let err = session
            .handle_line("list --name-only", &mut lines, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Command(CommandError::EmptyCache)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_populates_registry() {
        let (mut session, mut server) = session(None);
        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();

        let handle = session.handle_line("list", &mut lines, &mut out);
        let serve = async {
            assert_eq!(
                server.expect().await,
                r#"{"jsonrpc":"2.0","method":"tools/list","id":"1"}"#
            );
            server
                .reply(r#"{"jsonrpc":"2.0","id":"1","result":{"tools":[{"name":"echo","description":"echoes input","inputSchema":{"type":"object","properties":{"text":{"type":"string"}}}}]}}"#)
                .await;
        };
        let (result, ()) = tokio::join!(handle, serve);
        result.unwrap();

        assert_eq!(session.registry().names(), vec!["echo"]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Cached 1 tool schemas"), "{}", text);
    }

    #[tokio::test]
    async fn test_notifications_are_skipped() {
        let (mut session, mut server) = session(None);
        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();

        let handle = session.handle_line(r#"{"jsonrpc":"2.0","method":"ping","id":7}"#, &mut lines, &mut out);
        let serve = async {
            server.expect().await;
            server
                .reply(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"pct":50}}"#)
                .await;
            server.reply(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).await;
        };
        let (result, ()) = tokio::join!(handle, serve);
        result.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"Notification: notifications/progress {"pct":50}"#), "{}", text);
        assert!(text.contains("Response:"));
    }

    #[tokio::test]
    async fn test_response_timeout() {
        let (mut session, mut server) = session(Some(Duration::from_millis(50)));
        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();

        let handle = session.handle_line("list", &mut lines, &mut out);
        let serve = async {
            server.expect().await;
        };
        let (result, ()) = tokio::join!(handle, serve);
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_malformed_response_is_reported() {
        let (mut session, mut server) = session(None);
        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();

        let handle = session.handle_line("list", &mut lines, &mut out);
        let serve = async {
            server.expect().await;
            server.reply("this is not json").await;
        };
        let (result, ()) = tokio::join!(handle, serve);
        let err = result.unwrap_err();
        assert!(matches!(err, SessionError::MalformedResponse(CodecError::MalformedJson(_))));
        assert!(err.to_string().starts_with("malformed response: malformed-json"));
    }

    #[tokio::test]
    async fn test_guided_call_reads_answers() {
        let (mut session, mut server) = session(None);
        session.registry.replace_all(tools_from_discovery(&[serde_json::json!({
            "name": "echo",
            "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}, "n": {"type": "integer"}}}
        })]));

        let mut lines = OperatorInput::new(&b"hello\n4\n"[..]);
        let mut out = Vec::new();

        let handle = session.handle_line("call-echo", &mut lines, &mut out);
        let serve = async {
            let sent = server.expect().await;
            server.reply(r#"{"jsonrpc":"2.0","id":"3","result":{}}"#).await;
            sent
        };
        let (result, sent) = tokio::join!(handle, serve);
        result.unwrap();

        assert_eq!(
            sent,
            r#"{"jsonrpc":"2.0","method":"tools/call","id":"3","params":{"name":"echo","arguments":{"text":"hello","n":4}}}"#
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Enter value for text: Enter value for n: "));
    }

    #[tokio::test]
    async fn test_guided_call_aborts_on_eof() {
        let (mut session, _server) = session(None);
        session.registry.replace_all(tools_from_discovery(&[serde_json::json!({
            "name": "echo",
            "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
        })]));

        let mut lines = OperatorInput::new(&b""[..]);
        let mut out = Vec::new();
        let err = session
            .handle_line("call-echo", &mut lines, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PromptAborted));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_response_wait() {
        let (tx, rx) = watch::channel(false);
        let (session, mut server) = session(None);
        let session = session.with_shutdown(rx);

        let mut out = Vec::new();
        let run = session.run(&b"list\n"[..], &mut out);
        let stop = async {
            server.expect().await;
            tx.send(true).unwrap();
        };
        let (result, ()) = timeout(TEST_TIMEOUT, async { tokio::join!(run, stop) })
            .await
            .unwrap();
        assert_eq!(result.unwrap(), SessionEnd::Interrupted);
    }

    #[tokio::test]
    async fn test_run_ends_on_eof() {
        let (session, _server) = session(None);
        let mut out = Vec::new();
        let end = timeout(TEST_TIMEOUT, session.run(&b"help\n"[..], &mut out))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(end, SessionEnd::EndOfInput);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(PROMPT));
        assert!(text.contains("Commands:"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_input_does_not_end_session() {
        let (session, _server) = session(None);
        let mut out = Vec::new();
        let end = timeout(TEST_TIMEOUT, session.run(&b"\xff\xfe\nhelp\n"[..], &mut out))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(end, SessionEnd::EndOfInput);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Error: invalid payload: malformed-json"), "{}", text);
        assert!(text.contains("Commands:"), "{}", text);
    }

    #[tokio::test]
    async fn test_operator_input_lines() {
        let mut input = OperatorInput::new(&b"one\r\n\xfftwo\nthree"[..]);
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("\u{FFFD}two"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("three"));
        assert_eq!(input.next_line().await.unwrap(), None);
    }
}
