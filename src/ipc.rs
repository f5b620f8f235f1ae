//! Transport layer for talking to an MCP tool server.
//!
//! ```text
//! ┌─────────────────┐   mcp.stdin / child stdin    ┌─────────────────────┐
//! │   mcp-probe     │  ───────────────────────────►│    tool server      │
//! │ (DuplexChannel) │  ◄───────────────────────────│  (tools/list, ...)  │
//! └─────────────────┘   mcp.stdout / child stdout  └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! JSON-RPC 2.0, one compact JSON text per line by default:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"tools/list","id":"1"}\n
//! ```
//!
//! `Content-Length` framing (as in LSP) can be selected instead. The codec is
//! independent of the framing; the channel is independent of both message
//! content and schemas.

mod channel;
pub mod codec;
mod framing;

pub use channel::{
    DuplexChannel, TransportError, TransportSpec, FIFO_FROM_SERVER, FIFO_TO_SERVER,
};
pub use codec::{CodecError, Incoming};
pub use framing::{Framing, MAX_FRAME_SIZE};
