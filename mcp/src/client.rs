//! MCP server connection and invocation.
//!
//! Remote transports only: streamable-HTTP by default, SSE when the URL ends
//! in `/sse`. Connection attempts retry with exponential backoff for
//! transient failures.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::RunningService,
    transport::{
        sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig,
        SseClientTransport, StreamableHttpClientTransport,
    },
    RoleClient, ServiceExt,
};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    config::ServerSpec,
    error::{McpError, McpResult},
};

/// Type alias for a connected MCP client.
pub type McpClient = RunningService<RoleClient, ()>;

/// Tool definition discovered from an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct McpToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Connect to a server, retrying transient failures with backoff.
pub async fn connect(spec: &ServerSpec) -> McpResult<McpClient> {
    spec.validate()?;

    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(Duration::from_secs(15)))
        .build();

    backoff::future::retry(backoff, || async {
        match connect_impl(spec).await {
            Ok(client) => Ok(client),
            Err(e) => {
                if e.is_permanent() {
                    error!(
                        "Permanent error connecting to '{}': {} - not retrying",
                        spec.label, e
                    );
                    Err(backoff::Error::permanent(e))
                } else {
                    warn!("Failed to connect to '{}', retrying: {}", spec.label, e);
                    Err(backoff::Error::transient(e))
                }
            }
        }
    })
    .await
}

async fn connect_impl(spec: &ServerSpec) -> McpResult<McpClient> {
    if spec.is_sse() {
        let http_client = build_http_client(spec)?;
        let cfg = SseClientConfig {
            sse_endpoint: spec.url.clone().into(),
            ..Default::default()
        };
        let transport = SseClientTransport::start_with_client(http_client, cfg)
            .await
            .map_err(|e| McpError::Transport(format!("create SSE transport: {}", e)))?;
        let client = ().serve(transport).await.map_err(|e| {
            McpError::Unavailable(format!("initialize SSE client '{}': {}", spec.label, e))
        })?;
        info!("Connected to SSE server '{}' at {}", spec.label, spec.url);
        Ok(client)
    } else {
        if !spec.headers.is_empty() {
            warn!(
                "Custom headers are not supported for streamable transport on server '{}'",
                spec.label
            );
        }
        let transport = if let Some(token) = &spec.authorization {
            let mut cfg = StreamableHttpClientTransportConfig::with_uri(spec.url.as_str());
            cfg.auth_header = Some(token.clone());
            StreamableHttpClientTransport::from_config(cfg)
        } else {
            StreamableHttpClientTransport::from_uri(spec.url.as_str())
        };
        let client = ().serve(transport).await.map_err(|e| {
            McpError::Unavailable(format!(
                "initialize streamable client '{}': {}",
                spec.label, e
            ))
        })?;
        info!(
            "Connected to streamable HTTP server '{}' at {}",
            spec.label, spec.url
        );
        Ok(client)
    }
}

fn build_http_client(spec: &ServerSpec) -> McpResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));

    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = &spec.authorization {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .map_err(|e| McpError::Transport(format!("auth token: {}", e)))?,
        );
    }
    for (key, value) in &spec.headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::Transport(format!("header name '{}': {}", key, e)))?;
        let val = value
            .parse()
            .map_err(|e| McpError::Transport(format!("header value for '{}': {}", key, e)))?;
        headers.insert(name, val);
    }
    if !headers.is_empty() {
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| McpError::Transport(format!("build HTTP client: {}", e)))
}

/// List all tools advertised by a connected server.
pub async fn list_tools(client: &McpClient, label: &str) -> McpResult<Vec<McpToolDef>> {
    let tools = client
        .peer()
        .list_all_tools()
        .await
        .map_err(|e| McpError::Transport(format!("list tools on '{}': {}", label, e)))?;

    info!("Discovered {} tools from '{}'", tools.len(), label);
    Ok(tools
        .into_iter()
        .map(|t| McpToolDef {
            name: t.name.to_string(),
            description: t.description.as_ref().map(|d| d.to_string()),
            input_schema: Value::Object((*t.input_schema).clone()),
        })
        .collect())
}

/// Invoke a tool by raw name. A server-reported error is surfaced verbatim.
pub async fn call_tool(client: &McpClient, tool_name: &str, arguments: Value) -> McpResult<String> {
    let args_map = match arguments {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            return Err(McpError::InvalidArguments(format!(
                "arguments must be a JSON object, got {}",
                type_name(&other)
            )))
        }
    };

    let result = client
        .call_tool(CallToolRequestParam {
            name: std::borrow::Cow::Owned(tool_name.to_string()),
            arguments: args_map,
        })
        .await
        .map_err(|e| McpError::Execution(format!("MCP call failed: {}", e)))?;

    let text = result_text(&result);
    if result.is_error == Some(true) {
        Err(McpError::Execution(text))
    } else {
        Ok(text)
    }
}

/// Flatten a tool result to a string: structured content when present,
/// otherwise concatenated text blocks, otherwise the serialized content list.
fn result_text(result: &CallToolResult) -> String {
    if let Some(structured) = &result.structured_content {
        return structured.to_string();
    }

    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.as_str()))
        .collect();
    if !texts.is_empty() {
        return texts.join("\n");
    }

    serde_json::to_string(&result.content).unwrap_or_default()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;

    #[test]
    fn result_text_prefers_structured_content() {
        let mut result = CallToolResult::success(vec![Content::text("plain")]);
        result.structured_content = Some(serde_json::json!({"answer": 42}));
        assert_eq!(result_text(&result), r#"{"answer":42}"#);
    }

    #[test]
    fn result_text_joins_text_blocks() {
        let result = CallToolResult::success(vec![Content::text("one"), Content::text("two")]);
        assert_eq!(result_text(&result), "one\ntwo");
    }
}
