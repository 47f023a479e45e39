//! MCP server configuration.
//!
//! Two sources feed the pool: a startup file of named servers
//! (`{mcpServers: {name: {url, headers?}}}`, YAML or JSON) and per-request
//! `mcp` tool entries carrying `server_label` + `server_url`.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

/// On-disk server file: `{mcpServers: {name: {url, headers?}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersFile {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpServerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl McpServersFile {
    /// Load from a YAML or JSON file (YAML parser accepts both).
    pub fn from_path(path: impl AsRef<Path>) -> McpResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&raw)
            .map_err(|e| McpError::Config(format!("parse {}: {}", path.as_ref().display(), e)))
    }

    pub fn specs(&self) -> Vec<ServerSpec> {
        self.mcp_servers
            .iter()
            .map(|(label, entry)| ServerSpec {
                label: label.clone(),
                url: entry.url.clone(),
                headers: entry.headers.clone(),
                authorization: None,
            })
            .collect()
    }
}

/// Resolved connection target for one MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub label: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Bearer token from the request tool's `authorization` field.
    pub authorization: Option<String>,
}

impl ServerSpec {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            headers: HashMap::new(),
            authorization: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, token: impl Into<String>) -> Self {
        self.authorization = Some(token.into());
        self
    }

    /// Stable server identifier: a hash of `label|url`.
    pub fn server_key(&self) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.label.hash(&mut hasher);
        b'|'.hash(&mut hasher);
        self.url.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// SSE transport is selected by the conventional `/sse` URL suffix.
    pub fn is_sse(&self) -> bool {
        self.url.trim_end_matches('/').ends_with("/sse")
    }

    /// Only http(s) URLs are accepted for remote servers.
    pub fn validate(&self) -> McpResult<()> {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            Ok(())
        } else {
            Err(McpError::Config(format!(
                "unsupported MCP server_url scheme: {}",
                self.url
            )))
        }
    }
}
