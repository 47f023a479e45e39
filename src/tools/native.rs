//! Built-in tool handlers: think, file_search, agentic_search,
//! image_generation.
//!
//! Each tool carries a fixed JSON-Schema for its arguments; dispatch
//! switches on `NativeKind` rather than trait objects.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{agentic, filters::Filter, ToolContext, ToolDefinition, ToolProtocol};
use crate::error::{GatewayError, GatewayResult};

pub const THINK_ACK: &str = "Your thought has been logged.";

const DEFAULT_FILE_SEARCH_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    Think,
    FileSearch,
    AgenticSearch,
    ImageGeneration,
}

/// The process-wide native catalog, loaded at startup.
pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        definition(
            "think",
            "Scratchpad for reasoning. Logs the thought without acting on it.",
            json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string", "description": "A thought to think about."}
                },
                "required": ["thought"],
                "additionalProperties": false
            }),
            NativeKind::Think,
        ),
        definition(
            "file_search",
            "Search the request's vector stores for relevant file chunks.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query."},
                    "filters": {"type": "object", "description": "Attribute filter tree."},
                    "max_num_results": {"type": "integer", "description": "Maximum results to return."},
                    "ranking_options": {"type": "object", "description": "Provider ranking options."}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            NativeKind::FileSearch,
        ),
        definition(
            "agentic_search",
            "Iterative search that refines its own queries until the question is answered.",
            json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "The question to answer."},
                    "max_iterations": {"type": "integer", "description": "Cap on refinement iterations."},
                    "max_results": {"type": "integer", "description": "Maximum results to return."}
                },
                "required": ["question"],
                "additionalProperties": false
            }),
            NativeKind::AgenticSearch,
        ),
        definition(
            "image_generation",
            "Generate an image via the upstream provider.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "Image description."},
                    "size": {"type": "string", "description": "Output size, e.g. 1024x1024."},
                    "n": {"type": "integer", "description": "Number of images."}
                },
                "required": ["prompt"],
                "additionalProperties": false
            }),
            NativeKind::ImageGeneration,
        ),
    ]
}

fn definition(name: &str, description: &str, parameters: Value, kind: NativeKind) -> ToolDefinition {
    ToolDefinition {
        id: format!("native:{}", name),
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters,
        protocol: ToolProtocol::Native,
        server: None,
        raw_name: None,
        kind: Some(kind),
    }
}

pub async fn execute(kind: NativeKind, args: Value, ctx: &ToolContext<'_>) -> GatewayResult<String> {
    match kind {
        NativeKind::Think => think(args),
        NativeKind::FileSearch => file_search(args, ctx).await,
        NativeKind::AgenticSearch => agentic::run(args, ctx).await,
        NativeKind::ImageGeneration => image_generation(args, ctx).await,
    }
}

fn think(args: Value) -> GatewayResult<String> {
    let thought = args
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or_default();
    debug!(length = thought.len(), "Logged model thought");
    Ok(THINK_ACK.to_string())
}

#[derive(Debug, Deserialize)]
struct FileSearchArgs {
    query: String,
    #[serde(default)]
    filters: Option<Filter>,
    #[serde(default)]
    max_num_results: Option<usize>,
    #[serde(default)]
    #[allow(dead_code)]
    ranking_options: Option<Value>,
}

async fn file_search(args: Value, ctx: &ToolContext<'_>) -> GatewayResult<String> {
    let args: FileSearchArgs = serde_json::from_value(args)
        .map_err(|e| GatewayError::invalid_request(format!("file_search arguments: {}", e)))?;

    let config = ctx.tool_configs.get("file_search");
    let store_ids: Vec<String> = config
        .and_then(|c| c.vector_store_ids.clone())
        .unwrap_or_default();
    let max_results = args
        .max_num_results
        .or_else(|| config.and_then(|c| c.max_num_results.map(|n| n as usize)))
        .unwrap_or(DEFAULT_FILE_SEARCH_RESULTS);

    let config_filter: Option<Filter> = config
        .and_then(|c| c.filters.clone())
        .and_then(|v| serde_json::from_value(v).ok());
    let filter = Filter::and_compose(args.filters, config_filter);

    let hits = ctx
        .vector_store
        .search(&args.query, &store_ids, max_results, filter.as_ref())
        .await?;

    let data: Vec<Value> = hits
        .into_iter()
        .map(|hit| {
            json!({
                "file_id": hit.file_id,
                "filename": hit.filename,
                "score": hit.score,
                "content": hit.content,
                "attributes": hit.attributes,
            })
        })
        .collect();

    Ok(json!({"query": args.query, "data": data}).to_string())
}

async fn image_generation(args: Value, ctx: &ToolContext<'_>) -> GatewayResult<String> {
    let config = ctx.tool_configs.get("image_generation");
    let mut payload = args;
    if payload.get("model").is_none() {
        if let Some(model) = config
            .and_then(|c| c.parameters.as_ref())
            .and_then(|p| p.get("model"))
        {
            payload["model"] = model.clone();
        }
    }

    let result = ctx
        .provider
        .generate_image(&ctx.target, payload, ctx.bearer.as_deref())
        .await?;
    Ok(result.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_the_four_builtins() {
        let names: Vec<String> = catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["think", "file_search", "agentic_search", "image_generation"]
        );
    }

    #[test]
    fn catalog_schemas_are_closed_objects() {
        for def in catalog() {
            assert_eq!(
                def.parameters["additionalProperties"],
                Value::Bool(false),
                "{} schema must be closed",
                def.name
            );
            assert_eq!(def.protocol, ToolProtocol::Native);
            assert!(def.kind.is_some());
        }
    }

    #[test]
    fn think_returns_the_acknowledgement() {
        let out = think(json!({"thought": "check the cache first"})).unwrap();
        assert_eq!(out, THINK_ACK);
    }
}
