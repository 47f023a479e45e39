//! Gateway configuration: CLI flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;
pub const DEFAULT_PER_TOOL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Parser)]
#[command(name = "toolgate", about = "OpenAI-protocol gateway with server-side tool execution")]
pub struct GatewayConfig {
    #[arg(long, env = "TOOLGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TOOLGATE_PORT", default_value_t = 6644)]
    pub port: u16,

    /// Cap on tool-loop iterations per request.
    #[arg(long, env = "TOOLGATE_MAX_ITERATIONS", default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: u32,

    /// Per-request wall-clock deadline in milliseconds.
    #[arg(long, env = "TOOLGATE_MAX_DURATION_MS", default_value_t = DEFAULT_MAX_DURATION_MS)]
    pub max_duration_ms: u64,

    /// Per-tool-call timeout in milliseconds.
    #[arg(long, env = "TOOLGATE_PER_TOOL_TIMEOUT_MS", default_value_t = DEFAULT_PER_TOOL_TIMEOUT_MS)]
    pub per_tool_timeout_ms: u64,

    /// Response persistence backend.
    #[arg(long, env = "TOOLGATE_STORE_TYPE", value_enum, default_value_t = StoreType::InMemory)]
    pub store_type: StoreType,

    /// Connection string for the mongodb store backend.
    #[arg(long, env = "TOOLGATE_MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Enable MCP tool loading at startup.
    #[arg(long, env = "TOOLGATE_MCP_ENABLED", default_value_t = false)]
    pub mcp_enabled: bool,

    /// Path to an MCP servers file: `{mcpServers: {name: {url, headers?}}}`.
    #[arg(long, env = "TOOLGATE_MCP_CONFIG_PATH")]
    pub mcp_config_path: Option<PathBuf>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "TOOLGATE_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum StoreType {
    InMemory,
    Mongodb,
}

impl GatewayConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn per_tool_timeout(&self) -> Duration {
        Duration::from_millis(self.per_tool_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6644,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            per_tool_timeout_ms: DEFAULT_PER_TOOL_TIMEOUT_MS,
            store_type: StoreType::InMemory,
            mongodb_uri: None,
            mcp_enabled: false,
            mcp_config_path: None,
            metrics_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.max_duration_ms, 60_000);
        assert_eq!(cfg.per_tool_timeout_ms, 30_000);
        assert_eq!(cfg.store_type, StoreType::InMemory);
        assert!(!cfg.mcp_enabled);
    }

    #[test]
    fn cli_overrides_parse() {
        let cfg = GatewayConfig::parse_from([
            "toolgate",
            "--max-iterations",
            "3",
            "--store-type",
            "mongodb",
            "--per-tool-timeout-ms",
            "1500",
        ]);
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.store_type, StoreType::Mongodb);
        assert_eq!(cfg.per_tool_timeout(), Duration::from_millis(1500));
    }
}
