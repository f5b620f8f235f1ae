//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::ipc::{Framing, TransportSpec};

/// Default response timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts to open the FIFO write end.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 50;

/// Log filter used when neither `--log-level` nor `RUST_LOG` is set.
/// Kept quiet so log lines don't interleave with the prompt.
pub const DEFAULT_LOG_FILTER: &str = "mcp_probe=warn";

/// Interactive console for MCP tool servers.
#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-probe", version, about)]
pub struct Args {
    /// Command that starts the MCP server, run through `sh -c`
    #[arg(long, env = "MCP_PROBE_SERVER_CMD")]
    pub server_cmd: Option<String>,

    /// Talk over the named pipes mcp.stdin / mcp.stdout instead of child pipes
    #[arg(long, env = "MCP_PROBE_FIFO")]
    pub fifo: bool,

    /// Directory in which the named pipes are created
    #[arg(long, env = "MCP_PROBE_FIFO_DIR", default_value = ".")]
    pub fifo_dir: PathBuf,

    /// Message framing on the wire
    #[arg(long, value_enum, default_value_t = Framing::Lines)]
    pub framing: Framing,

    /// Seconds to wait for each response (0 waits forever)
    #[arg(long, env = "MCP_PROBE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Attempts to open the named pipe write end while waiting for a reader
    #[arg(long, default_value_t = DEFAULT_OPEN_ATTEMPTS)]
    pub open_attempts: u32,

    /// Log filter directive, e.g. `mcp_probe=debug` (overrides RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a server command is required (--server-cmd or MCP_PROBE_SERVER_CMD) unless --fifo is given")]
    MissingServerCommand,

    #[error("--open-attempts must be at least 1")]
    ZeroOpenAttempts,
}

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub transport: TransportSpec,
    pub framing: Framing,
    /// `None` waits forever.
    pub response_timeout: Option<Duration>,
}

impl Args {
    /// Log filter to install: `--log-level`, then `RUST_LOG`, then the default.
    pub fn log_filter(&self) -> String {
        self.log_level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }

    /// Validate the flags.
    pub fn into_config(self) -> Result<SessionConfig, ConfigError> {
        let server_command = self.server_cmd.filter(|cmd| !cmd.trim().is_empty());

        let transport = if self.fifo {
            if self.open_attempts == 0 {
                return Err(ConfigError::ZeroOpenAttempts);
            }
            TransportSpec::Fifo {
                dir: self.fifo_dir,
                server_command,
                open_attempts: self.open_attempts,
            }
        } else {
            TransportSpec::Child {
                command: server_command.ok_or(ConfigError::MissingServerCommand)?,
            }
        };

        let response_timeout = match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(SessionConfig {
            transport,
            framing: self.framing,
            response_timeout,
        })
    }
}
