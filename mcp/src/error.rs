//! MCP error types.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    /// Connection could not be established; maps to `mcp_unavailable`.
    #[error("MCP server unavailable: {0}")]
    Unavailable(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed; carries the server's error text verbatim.
    #[error("{0}")]
    Execution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Permanent errors should not be retried by the connect backoff.
    pub fn is_permanent(&self) -> bool {
        match self {
            McpError::Config(_) | McpError::InvalidArguments(_) | McpError::ToolNotFound(_) => true,
            McpError::Unavailable(msg) => {
                msg.contains("initialize")
                    || msg.contains("connection refused")
                    || msg.contains("invalid URL")
            }
            _ => false,
        }
    }
}
