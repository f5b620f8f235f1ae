//! mcp-probe library
//!
//! Building blocks for an interactive console that talks JSON-RPC 2.0 to an
//! MCP tool server:
//!
//! - `ipc` - duplex channel (child pipes or named pipes), framing and codec
//! - `models` - JSON-RPC message and tool descriptor types
//! - `schema` - `$ref` resolution, schema descriptions and example values
//! - `registry` - cache of discovered tools
//! - `interpreter` - operator command parsing
//! - `session` - the prompt / send / await loop
//! - `config` - command-line configuration
//!
//! # Example
//!
//! ```ignore
//! use mcp_probe::ipc::{DuplexChannel, Framing, TransportSpec};
//! use mcp_probe::session::Session;
//!
//! let spec = TransportSpec::Child { command: "python server.py".into() };
//! let channel = DuplexChannel::open(&spec, Framing::Lines).await?;
//! let session = Session::new(channel, Some(Duration::from_secs(30)));
//! let input = tokio::io::BufReader::new(tokio::io::stdin());
//! session.run(input, &mut std::io::stdout()).await?;
//! ```

pub mod config;
pub mod interpreter;
pub mod ipc;
pub mod models;
pub mod registry;
pub mod schema;
pub mod session;
