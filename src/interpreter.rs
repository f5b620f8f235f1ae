//! Operator command interpretation.
//!
//! One trimmed line of operator input becomes a [`Command`]:
//!
//! | Input                  | Result                                      |
//! |------------------------|---------------------------------------------|
//! | `list`                 | `tools/list` request                        |
//! | `list --name-only`     | local listing of cached tool names          |
//! | `call <name> <json>`   | `tools/call` request with inline arguments  |
//! | `call-<name>`          | prompt for each top-level argument          |
//! | `describe <name>`      | local rendering of the tool's schema        |
//! | `help`                 | local command summary                       |
//! | anything else          | forwarded verbatim as raw JSON-RPC          |
//!
//! Local commands never touch the transport.

use serde_json::Value;
use thiserror::Error;

use crate::ipc::codec::{self, json_kind, CodecError};
use crate::models::{JsonRpcRequest, RequestId};
use crate::registry::ToolRegistry;
use crate::schema::{SchemaError, SchemaWalker};

const USAGE_CALL: &str = "call <toolName> <json input>";
const USAGE_DESCRIBE: &str = "describe <toolName>";
const USAGE_GUIDED: &str = "call-<toolName>";

/// Command summary shown by `help`.
pub const HELP_TEXT: &str = "\
Commands:
  list                      discover tools (tools/list) and cache their schemas
  list --name-only          show cached tool names without contacting the server
  call <name> <json>        invoke a tool with a JSON object of arguments
  call-<name>               invoke a cached tool, prompting for each argument
  describe <name>           show a cached tool's schema and example arguments
  help                      show this summary
  <json>                    send raw JSON-RPC text as-is";

/// Interpretation errors. Nothing is sent when one of these occurs.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command is missing required parts.
    #[error("usage: {0}")]
    UsageError(&'static str),

    /// Inline arguments are not a JSON object.
    #[error("invalid JSON input for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The named tool has not been discovered.
    #[error("tool '{0}' not found in cache; run 'list' first")]
    ToolNotCached(String),

    /// No discovery response has been received yet.
    #[error("tool cache is empty; run plain 'list' first")]
    EmptyCache,
}

/// A payload bound for the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A request built by the interpreter.
    Request(JsonRpcRequest),
    /// Hand-typed JSON-RPC text, validated only when encoded.
    Raw(String),
}

impl Outbound {
    /// Encode to a frame body.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Outbound::Request(request) => codec::encode(request),
            Outbound::Raw(text) => codec::encode_raw(text),
        }
    }

    /// The id the response should carry, when known.
    pub fn expected_id(&self) -> Option<&RequestId> {
        match self {
            Outbound::Request(request) => Some(&request.id),
            Outbound::Raw(_) => None,
        }
    }
}

/// A `call-<name>` invocation waiting for argument values.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidedCall {
    pub tool: String,
    /// Top-level argument names, in schema declaration order.
    pub fields: Vec<String>,
    /// Problems met while reading the schema.
    pub warnings: Vec<SchemaError>,
}

impl GuidedCall {
    /// Build the `tools/call` request from one answer per field.
    ///
    /// Each answer is parsed as JSON; anything that does not parse is taken
    /// as a plain string, so `hello` and `"hello"` mean the same thing.
    pub fn into_request(self, answers: Vec<String>) -> JsonRpcRequest {
        let arguments: serde_json::Map<String, Value> = self
            .fields
            .into_iter()
            .zip(answers)
            .map(|(field, answer)| (field, parse_answer(&answer)))
            .collect();

        JsonRpcRequest::tool_call(RequestId::guided_call(), &self.tool, Value::Object(arguments))
    }
}

fn parse_answer(answer: &str) -> Value {
    serde_json::from_str(answer.trim()).unwrap_or_else(|_| Value::String(answer.to_string()))
}

/// Result of interpreting one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Text to show the operator; nothing is sent.
    Local(String),
    /// A payload to send, expecting one response.
    Send(Outbound),
    /// Argument values must be collected before sending.
    Prompt(GuidedCall),
}

/// Translates operator input using the current tool cache.
#[derive(Debug, Clone, Copy)]
pub struct CommandInterpreter<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> CommandInterpreter<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Interpret one line of operator input.
    pub fn interpret(&self, line: &str) -> Result<Command, CommandError> {
        let line = line.trim();
        let (head, rest) = split_first_word(line);

        match head {
            "list" => {
                if rest.split_whitespace().next() == Some("--name-only") {
                    self.list_names()
                } else {
                    Ok(Command::Send(Outbound::Request(JsonRpcRequest::discovery())))
                }
            }
            "call" => self.inline_call(rest),
            "describe" if rest.is_empty() => Err(CommandError::UsageError(USAGE_DESCRIBE)),
            "describe" => self.describe(rest),
            "help" => Ok(Command::Local(HELP_TEXT.to_string())),
            _ => match line.strip_prefix("call-") {
                Some(name) => self.guided_call(name.trim()),
                None => Ok(Command::Send(Outbound::Raw(line.to_string()))),
            },
        }
    }

    fn list_names(&self) -> Result<Command, CommandError> {
        if !self.registry.is_populated() {
            return Err(CommandError::EmptyCache);
        }
        if self.registry.is_empty() {
            return Ok(Command::Local("No tools cached: the server advertised none".to_string()));
        }

        let mut lines = vec!["Available tools:".to_string()];
        lines.extend(self.registry.names().into_iter().map(|name| format!("- {}", name)));
        Ok(Command::Local(lines.join("\n")))
    }

    fn inline_call(&self, rest: &str) -> Result<Command, CommandError> {
        let (tool, raw_args) = split_first_word(rest);
        if tool.is_empty() || raw_args.is_empty() {
            return Err(CommandError::UsageError(USAGE_CALL));
        }

        let invalid = |reason: String| CommandError::InvalidArguments {
            tool: tool.to_string(),
            reason,
        };
        let arguments: Value = serde_json::from_str(raw_args).map_err(|e| invalid(e.to_string()))?;
        if !arguments.is_object() {
            return Err(invalid(format!("expected a JSON object, got {}", json_kind(&arguments))));
        }

        Ok(Command::Send(Outbound::Request(JsonRpcRequest::tool_call(
            RequestId::inline_call(),
            tool,
            arguments,
        ))))
    }

    fn guided_call(&self, name: &str) -> Result<Command, CommandError> {
        if name.is_empty() {
            return Err(CommandError::UsageError(USAGE_GUIDED));
        }
        let tool = self
            .registry
            .lookup(name)
            .ok_or_else(|| CommandError::ToolNotCached(name.to_string()))?;

        let mut walker = SchemaWalker::new(&tool.schema);
        let fields = walker.property_names(&tool.schema);

        Ok(Command::Prompt(GuidedCall {
            tool: tool.name.clone(),
            fields,
            warnings: walker.into_warnings(),
        }))
    }

    fn describe(&self, name: &str) -> Result<Command, CommandError> {
        let tool = self
            .registry
            .lookup(name)
            .ok_or_else(|| CommandError::ToolNotCached(name.to_string()))?;

        let mut walker = SchemaWalker::new(&tool.schema);
        let properties = walker.describe(&tool.schema, "", 1);
        let sketch = walker.type_sketch(&tool.schema);
        let example = walker.build_example(&tool.schema);
        let example_json =
            serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string());

        let mut lines = vec![
            format!("Tool: {}", tool.name),
            format!("Description: {}", tool.description),
            String::new(),
            "Input Schema:".to_string(),
        ];
        if properties.is_empty() {
            lines.push("  (no properties)".to_string());
        } else {
            lines.extend(properties);
        }
        lines.push(String::new());
        lines.push("Input Example:".to_string());
        lines.push(sketch.to_string());
        lines.push(String::new());
        lines.push("Example request arguments:".to_string());
        lines.push(example_json);

        for warning in walker.warnings() {
            lines.push(format!("warning: {}", warning));
        }

        Ok(Command::Local(lines.join("\n")))
    }
}

/// Split off the first whitespace-delimited word; the remainder is kept
/// verbatim apart from leading whitespace.
fn split_first_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(index) => {
            let (head, rest) = text.split_at(index);
            (head, rest.trim_start())
        }
        None => (text, ""),
    }
}
