//! Tool registry, per-request session, and dispatch.
//!
//! The registry holds the process-wide native catalog plus the MCP backend.
//! Each request gets an immutable `ToolSession` snapshot: the alias map,
//! resolved definitions for every server-managed tool, the set of
//! client-executed function tools, and the MCP server bindings.

pub mod agentic;
pub mod filters;
pub mod native;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use openai_protocol::responses::ResponseTool;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolgate_mcp::{McpClientPool, McpError, McpToolDef, ServerSpec};
use tracing::{debug, warn};

use crate::{
    error::{GatewayError, GatewayResult},
    observability::{labels, Metrics},
    providers::{ProviderClient, ProviderTarget},
    services::{FileService, VectorStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProtocol {
    Native,
    Mcp,
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub id: String,
    /// Canonical wire name; for MCP tools this is `<label>_<tool>`.
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
    pub protocol: ToolProtocol,
    /// MCP only: the owning server.
    pub server: Option<ServerSpec>,
    /// MCP only: the unqualified tool name used against the server.
    pub raw_name: Option<String>,
    /// Native only: which built-in executor handles this tool.
    pub kind: Option<native::NativeKind>,
}

/// Seam between the registry and the MCP client pool. Tests drive the
/// dispatch path with a scripted backend.
#[async_trait]
pub trait McpBackend: Send + Sync {
    async fn list_tools(&self, spec: &ServerSpec) -> GatewayResult<Vec<McpToolDef>>;
    async fn execute(
        &self,
        spec: &ServerSpec,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError>;
}

#[async_trait]
impl McpBackend for McpClientPool {
    async fn list_tools(&self, spec: &ServerSpec) -> GatewayResult<Vec<McpToolDef>> {
        let tools = McpClientPool::list_tools(self, spec).await?;
        Ok(tools.as_ref().clone())
    }

    async fn execute(
        &self,
        spec: &ServerSpec,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError> {
        McpClientPool::execute(self, spec, tool, arguments).await
    }
}

pub struct ToolRegistry {
    native: Vec<ToolDefinition>,
    mcp: Arc<dyn McpBackend>,
    /// Servers from the startup config file; their tools resolve as aliases.
    static_servers: Vec<ServerSpec>,
}

impl ToolRegistry {
    pub fn new(mcp: Arc<dyn McpBackend>) -> Self {
        Self {
            native: native::catalog(),
            mcp,
            static_servers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_static_servers(mut self, servers: Vec<ServerSpec>) -> Self {
        self.static_servers = servers;
        self
    }

    pub fn list_available(&self) -> Vec<ToolDefinition> {
        self.native.clone()
    }

    pub fn native_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.native.iter().find(|t| t.name == name)
    }

    pub fn mcp(&self) -> &Arc<dyn McpBackend> {
        &self.mcp
    }

    pub fn static_servers(&self) -> &[ServerSpec] {
        &self.static_servers
    }

    /// Expand an MCP server's tools into qualified function-shape
    /// definitions, filtered by `allowed_tools` when given.
    pub async fn discover_mcp_tools(
        &self,
        spec: &ServerSpec,
        allowed: Option<&[String]>,
    ) -> GatewayResult<Vec<ToolDefinition>> {
        let listed = self.mcp.list_tools(spec).await?;
        let allowed_set: Option<HashSet<&str>> =
            allowed.map(|names| names.iter().map(String::as_str).collect());

        Ok(listed
            .into_iter()
            .filter(|t| {
                allowed_set
                    .as_ref()
                    .is_none_or(|set| set.contains(t.name.as_str()))
            })
            .map(|t| ToolDefinition {
                id: format!("{}:{}", spec.server_key(), t.name),
                name: format!("{}_{}", spec.label, t.name),
                description: t.description,
                parameters: t.input_schema,
                protocol: ToolProtocol::Mcp,
                server: Some(spec.clone()),
                raw_name: Some(t.name),
                kind: None,
            })
            .collect())
    }

    /// Resolve a `{type: X}` alias: first the native catalog, then the
    /// statically configured MCP servers (matching raw or qualified names).
    pub async fn resolve_alias(&self, alias: &str) -> GatewayResult<Option<ToolDefinition>> {
        if let Some(def) = self.native_tool(alias) {
            return Ok(Some(def.clone()));
        }

        for spec in &self.static_servers {
            let listed = match self.mcp.list_tools(spec).await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!("Skipping static server '{}' during alias resolution: {}", spec.label, e);
                    continue;
                }
            };
            for tool in listed {
                let qualified = format!("{}_{}", spec.label, tool.name);
                if tool.name == alias || qualified == alias {
                    return Ok(Some(ToolDefinition {
                        id: format!("{}:{}", spec.server_key(), tool.name),
                        name: qualified,
                        description: tool.description,
                        parameters: tool.input_schema,
                        protocol: ToolProtocol::Mcp,
                        server: Some(spec.clone()),
                        raw_name: Some(tool.name),
                        kind: None,
                    }));
                }
            }
        }

        Ok(None)
    }
}

/// `(label, spec)` binding for one MCP server referenced by a request.
#[derive(Debug, Clone)]
pub struct ServerBinding {
    pub label: String,
    pub spec: ServerSpec,
}

/// Immutable per-request snapshot of tool state.
#[derive(Default, Debug)]
pub struct ToolSession {
    /// Alias (`{type: X}`) to canonical wire name.
    alias_map: HashMap<String, String>,
    /// Canonical wire name to definition, server-managed tools only.
    definitions: HashMap<String, ToolDefinition>,
    /// Function tools supplied by the client; their calls end the loop.
    client_tools: HashSet<String>,
    mcp_servers: Vec<ServerBinding>,
}

impl ToolSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.alias_map.insert(alias.into(), canonical.into());
    }

    pub fn add_definition(&mut self, def: ToolDefinition) {
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn add_client_tool(&mut self, name: impl Into<String>) {
        self.client_tools.insert(name.into());
    }

    pub fn add_server(&mut self, binding: ServerBinding) {
        if !self
            .mcp_servers
            .iter()
            .any(|b| b.spec.server_key() == binding.spec.server_key())
        {
            self.mcp_servers.push(binding);
        }
    }

    /// Canonical name for a wire name, through the alias map.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.definitions.get_key_value(name) {
            return Some(key.as_str());
        }
        self.alias_map.get(name).map(String::as_str)
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        let canonical = self.resolve(name)?;
        self.definitions.get(canonical)
    }

    /// A managed tool is executed server-side inside the loop.
    pub fn is_managed(&self, name: &str) -> bool {
        self.definition(name).is_some()
    }

    pub fn is_client_tool(&self, name: &str) -> bool {
        self.client_tools.contains(name)
    }

    pub fn has_managed_tools(&self) -> bool {
        !self.definitions.is_empty()
    }

    /// Reverse alias lookup, used when rewriting outgoing payloads.
    pub fn alias_for(&self, canonical: &str) -> Option<&str> {
        self.alias_map
            .iter()
            .find(|(_, c)| c.as_str() == canonical)
            .map(|(a, _)| a.as_str())
    }

    pub fn managed_definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.definitions.values()
    }

    pub fn mcp_servers(&self) -> &[ServerBinding] {
        &self.mcp_servers
    }

    /// Uniqueness guard for function tool names after alias resolution.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
            || self.alias_map.contains_key(name)
            || self.client_tools.contains(name)
    }
}

/// Execution context threaded to every tool executor.
pub struct ToolContext<'a> {
    pub session: &'a ToolSession,
    pub registry: &'a ToolRegistry,
    pub vector_store: Arc<dyn VectorStore>,
    pub files: Arc<dyn FileService>,
    pub provider: Arc<dyn ProviderClient>,
    pub target: ProviderTarget,
    pub bearer: Option<String>,
    /// Original request tool entries by type (`file_search`,
    /// `agentic_search`, …) for per-tool configuration.
    pub tool_configs: HashMap<String, ResponseTool>,
    pub cancel: CancellationToken,
}

/// Result of one dispatch. Errors are carried in-band: the output string is
/// a structured error document the model can observe.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(kind: &str, detail: impl Into<String>) -> Self {
        Self {
            output: serde_json::json!({"error": kind, "detail": detail.into()}).to_string(),
            is_error: true,
        }
    }
}

/// Resolve, validate, and execute one tool call.
pub async fn dispatch(name: &str, arguments_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
    let Some(def) = ctx.session.definition(name) else {
        Metrics::record_tool_call(name, labels::RESULT_ERROR);
        return ToolOutcome::error("tool_not_found", format!("no tool named '{}'", name));
    };

    let arguments: Value = match serde_json::from_str(arguments_json) {
        Ok(v) => v,
        Err(e) => {
            Metrics::record_tool_call(&def.name, labels::RESULT_ERROR);
            return ToolOutcome::error("invalid_arguments", e.to_string());
        }
    };

    if let Err(detail) = validate_arguments(&def.parameters, &arguments) {
        Metrics::record_tool_call(&def.name, labels::RESULT_ERROR);
        return ToolOutcome::error("invalid_arguments", detail);
    }

    let started = Instant::now();
    let outcome = match def.protocol {
        ToolProtocol::Native => {
            let kind = def.kind.expect("native definitions carry a kind");
            match native::execute(kind, arguments, ctx).await {
                Ok(output) => ToolOutcome::ok(output),
                Err(e) => ToolOutcome::error(e.error_type(), e.to_string()),
            }
        }
        ToolProtocol::Mcp => {
            let spec = def.server.as_ref().expect("mcp definitions carry a server");
            let raw = def.raw_name.as_deref().unwrap_or(&def.name);
            debug!("Dispatching MCP tool '{}' to server '{}'", raw, spec.label);
            match ctx.registry.mcp().execute(spec, raw, arguments).await {
                Ok(output) => ToolOutcome::ok(output),
                Err(McpError::Execution(text)) => ToolOutcome {
                    output: text,
                    is_error: true,
                },
                Err(e) => ToolOutcome::error(GatewayError::from(e).error_type(), "MCP call failed"),
            }
        }
    };

    Metrics::record_tool_duration(&def.name, started.elapsed());
    Metrics::record_tool_call(
        &def.name,
        if outcome.is_error {
            labels::RESULT_ERROR
        } else {
            labels::RESULT_SUCCESS
        },
    );
    outcome
}

/// Shallow validation of arguments against a JSON-Schema object node:
/// required properties present, top-level property types consistent.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    let Some(args_obj) = arguments.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(key) {
                return Err(format!("missing required property '{}'", key));
            }
        }
    }

    if let Some(props) = schema_obj.get("properties").and_then(Value::as_object) {
        for (key, value) in args_obj {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!("property '{}' must be of type {}", key, expected));
            }
        }
    }

    Ok(())
}
