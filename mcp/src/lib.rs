//! MCP (Model Context Protocol) client pool.
//!
//! Maintains one logical client per server identifier with single-flight
//! connection establishment, caches per-server tool listings, and executes
//! tools by raw name. Connections are created lazily on first encounter and
//! reused across requests; a bounded LRU evicts idle ones.

pub mod client;
pub mod config;
pub mod error;
pub mod pool;

pub use client::McpToolDef;
pub use config::{McpServerEntry, McpServersFile, ServerSpec};
pub use error::{McpError, McpResult};
pub use pool::{McpClientPool, PoolStats};
