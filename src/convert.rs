//! Responses-API → Chat Completions translation.
//!
//! Builds the provider-native request from a Responses request: messages
//! from the input items, tools from the request's tool list with alias and
//! MCP expansion, and the structured-output / reasoning passthroughs.
//! Translation is pure except for MCP tool discovery and file-text
//! extraction, both idempotent.

use std::{collections::HashMap, sync::Arc};

use base64::Engine;
use openai_protocol::{
    chat::{ChatCompletionRequest, ChatMessage, ContentPart, ImageUrl, ToolCall},
    common::{ChatTool, FunctionDef, JsonSchemaFormat, ResponseFormat, ToolChoice},
    responses::{
        InputContent, InputContentPart, InputItem, OutputContent, OutputItem, ResponseInput,
        ResponseTool, ResponsesRequest, TextFormat,
    },
};
use serde_json::Value;
use toolgate_mcp::ServerSpec;

use crate::{
    error::{GatewayError, GatewayResult},
    services::{FileService, StoredResponse},
    tools::{ServerBinding, ToolRegistry, ToolSession},
};

#[derive(Debug)]
pub struct ConversionOutcome {
    pub chat: ChatCompletionRequest,
    pub session: ToolSession,
    /// Original request tool entries keyed by type, for native tool config.
    pub tool_configs: HashMap<String, ResponseTool>,
}

pub async fn convert_request(
    req: &ResponsesRequest,
    registry: &ToolRegistry,
    files: &Arc<dyn FileService>,
    model: &str,
) -> GatewayResult<ConversionOutcome> {
    let messages = build_messages(&req.input, req.instructions.as_deref(), files).await?;

    let (tools, session, tool_configs) =
        translate_tools(req.tools.as_deref().unwrap_or(&[]), registry).await?;

    let mut chat = ChatCompletionRequest::new(model, messages);
    if !tools.is_empty() {
        chat.tools = Some(tools);
        if req.tool_choice.is_none() && session.has_managed_tools() {
            chat.tool_choice = Some(ToolChoice::Mode("auto".to_string()));
        }
    }
    if let Some(choice) = &req.tool_choice {
        chat.tool_choice = Some(map_tool_choice(choice, &session));
    }
    chat.temperature = req.temperature;
    chat.top_p = req.top_p;
    chat.max_completion_tokens = req.max_output_tokens;
    chat.response_format = req
        .text
        .as_ref()
        .and_then(|t| t.format.as_ref())
        .map(map_text_format);
    chat.reasoning_effort = req
        .reasoning
        .as_ref()
        .and_then(|r| r.effort.clone());

    Ok(ConversionOutcome {
        chat,
        session,
        tool_configs,
    })
}

fn map_text_format(format: &TextFormat) -> ResponseFormat {
    match format {
        TextFormat::Text => ResponseFormat::Text,
        TextFormat::JsonObject => ResponseFormat::JsonObject,
        TextFormat::JsonSchema {
            name,
            schema,
            strict,
        } => {
            let mut schema = schema.clone();
            normalize_schema(&mut schema);
            ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: name.clone(),
                    schema,
                    strict: *strict,
                },
            }
        }
    }
}

fn map_tool_choice(choice: &ToolChoice, session: &ToolSession) -> ToolChoice {
    match choice {
        ToolChoice::Named(named) => {
            let mut named = named.clone();
            if let Some(canonical) = session.resolve(&named.function.name) {
                named.function.name = canonical.to_string();
            }
            ToolChoice::Named(named)
        }
        other => other.clone(),
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

pub async fn build_messages(
    input: &ResponseInput,
    instructions: Option<&str>,
    files: &Arc<dyn FileService>,
) -> GatewayResult<Vec<ChatMessage>> {
    let mut messages = Vec::new();
    if let Some(instructions) = instructions {
        messages.push(ChatMessage::text("system", instructions));
    }

    match input {
        ResponseInput::Text(text) => {
            messages.push(ChatMessage::text("user", text.clone()));
        }
        ResponseInput::Items(items) => {
            for (idx, item) in items.iter().enumerate() {
                match item {
                    InputItem::Message {
                        role,
                        content,
                        status: _,
                    } => {
                        let is_instruction_role = role == "system" || role == "developer";
                        if is_instruction_role && idx != 0 {
                            return Err(GatewayError::invalid_request_at(
                                format!("{} message must be the first input item", role),
                                format!("input[{}].role", idx),
                            ));
                        }
                        let text_role = if role == "developer" { "system" } else { role };
                        let message = message_from_content(text_role, content, files).await?;
                        if is_instruction_role && instructions.is_some() {
                            // Instructions own slot 0; fold the item into it.
                            let system = messages
                                .first_mut()
                                .expect("instructions message was pushed first");
                            let merged =
                                format!("{}\n\n{}", system.content_text(), message.content_text());
                            *system = ChatMessage::text("system", merged);
                        } else {
                            messages.push(message);
                        }
                    }
                    InputItem::FunctionCall {
                        call_id,
                        name,
                        arguments,
                        ..
                    } => {
                        messages.push(ChatMessage::tool_calls(vec![ToolCall::function(
                            call_id.clone(),
                            name.clone(),
                            arguments.clone(),
                        )]));
                    }
                    InputItem::FunctionCallOutput { call_id, output } => {
                        messages.push(ChatMessage::tool_result(call_id.clone(), output.clone()));
                    }
                    // Reasoning items and provider-specific call records have
                    // no chat-completion equivalent.
                    InputItem::Reasoning { .. } | InputItem::Other(_) => {}
                }
            }
        }
    }

    Ok(messages)
}

async fn message_from_content(
    role: &str,
    content: &InputContent,
    files: &Arc<dyn FileService>,
) -> GatewayResult<ChatMessage> {
    match content {
        InputContent::Text(text) => Ok(ChatMessage::text(role, text.clone())),
        InputContent::Parts(parts) => {
            let mut converted = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    InputContentPart::InputText { text } => {
                        converted.push(ContentPart::Text { text: text.clone() });
                    }
                    InputContentPart::InputImage {
                        image_url,
                        file_id,
                        detail,
                    } => {
                        let url = match (image_url, file_id) {
                            (Some(url), _) => url.clone(),
                            (None, Some(file_id)) => {
                                let metadata = files.get_metadata(file_id).await?;
                                let bytes = files.get_content(file_id).await?;
                                format!(
                                    "data:{};base64,{}",
                                    metadata.mime,
                                    base64::engine::general_purpose::STANDARD.encode(bytes)
                                )
                            }
                            (None, None) => {
                                return Err(GatewayError::invalid_request(
                                    "input_image requires image_url or file_id",
                                ))
                            }
                        };
                        converted.push(ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url,
                                detail: detail.clone(),
                            },
                        });
                    }
                    InputContentPart::InputFile { file_id } => {
                        let bytes = files.get_content(file_id).await?;
                        converted.push(ContentPart::Text {
                            text: String::from_utf8_lossy(&bytes).into_owned(),
                        });
                    }
                }
            }
            Ok(ChatMessage::parts(role, converted))
        }
    }
}

// ----------------------------------------------------------------------------
// Tools
// ----------------------------------------------------------------------------

async fn translate_tools(
    tools: &[ResponseTool],
    registry: &ToolRegistry,
) -> GatewayResult<(Vec<ChatTool>, ToolSession, HashMap<String, ResponseTool>)> {
    let mut chat_tools = Vec::new();
    let mut session = ToolSession::new();
    let mut tool_configs = HashMap::new();

    for (idx, tool) in tools.iter().enumerate() {
        if tool.is_function() {
            let name = tool.name.clone().ok_or_else(|| {
                GatewayError::invalid_request_at(
                    "function tool requires a name",
                    format!("tools[{}].name", idx),
                )
            })?;
            if session.name_in_use(&name) {
                return Err(GatewayError::invalid_request_at(
                    format!("duplicate tool name '{}'", name),
                    format!("tools[{}].name", idx),
                ));
            }
            let mut parameters = tool.parameters.clone().unwrap_or_else(
                || serde_json::json!({"type": "object", "properties": {}}),
            );
            normalize_schema(&mut parameters);
            session.add_client_tool(&name);
            chat_tools.push(ChatTool::function(FunctionDef {
                name,
                description: tool.description.clone(),
                parameters,
                strict: tool.strict,
            }));
        } else if tool.is_mcp() {
            let server_url = tool.server_url.clone().ok_or_else(|| {
                GatewayError::invalid_request_at(
                    "mcp tool requires server_url",
                    format!("tools[{}].server_url", idx),
                )
            })?;
            let label = tool
                .server_label
                .clone()
                .unwrap_or_else(|| "mcp".to_string());
            let mut spec = ServerSpec::new(label.clone(), server_url)
                .with_headers(tool.headers.clone().unwrap_or_default());
            if let Some(token) = &tool.authorization {
                spec = spec.with_authorization(token.clone());
            }
            spec.validate().map_err(|e| {
                GatewayError::invalid_request_at(e.to_string(), format!("tools[{}].server_url", idx))
            })?;

            let defs = registry
                .discover_mcp_tools(&spec, tool.allowed_tools.as_deref())
                .await?;
            session.add_server(ServerBinding {
                label,
                spec: spec.clone(),
            });
            for def in defs {
                if session.name_in_use(&def.name) {
                    continue;
                }
                if let Some(raw) = &def.raw_name {
                    session.add_alias(raw.clone(), def.name.clone());
                }
                chat_tools.push(function_shape(&def));
                session.add_definition(def);
            }
            tool_configs.insert(tool.tool_type.clone(), tool.clone());
        } else {
            // Built-in alias form `{type: X}`.
            let def = registry.resolve_alias(&tool.tool_type).await?.ok_or_else(|| {
                GatewayError::invalid_request_at(
                    format!("unknown tool type '{}'", tool.tool_type),
                    format!("tools[{}].type", idx),
                )
            })?;
            if session.name_in_use(&def.name) {
                return Err(GatewayError::invalid_request_at(
                    format!("duplicate tool name '{}'", def.name),
                    format!("tools[{}].type", idx),
                ));
            }
            session.add_alias(tool.tool_type.clone(), def.name.clone());
            if let Some(server) = &def.server {
                session.add_server(ServerBinding {
                    label: server.label.clone(),
                    spec: server.clone(),
                });
            }
            chat_tools.push(function_shape(&def));
            session.add_definition(def);
            tool_configs.insert(tool.tool_type.clone(), tool.clone());
        }
    }

    Ok((chat_tools, session, tool_configs))
}

fn function_shape(def: &crate::tools::ToolDefinition) -> ChatTool {
    let mut parameters = def.parameters.clone();
    normalize_schema(&mut parameters);
    ChatTool::function(FunctionDef {
        name: def.name.clone(),
        description: def.description.clone(),
        parameters,
        strict: None,
    })
}

/// Prepare tools for a Chat Completions request: plain function tools pass
/// through (normalized), `mcp` and alias entries expand to managed function
/// tools exactly as in the Responses path.
pub async fn prepare_chat_tools(
    tools: Option<&[ChatTool]>,
    registry: &ToolRegistry,
) -> GatewayResult<(Option<Vec<ChatTool>>, ToolSession, HashMap<String, ResponseTool>)> {
    let Some(tools) = tools else {
        return Ok((None, ToolSession::new(), HashMap::new()));
    };

    let as_response_tools: Vec<ResponseTool> = tools
        .iter()
        .map(|t| {
            if t.is_function() {
                let function = t.function.clone();
                ResponseTool {
                    tool_type: "function".to_string(),
                    name: function.as_ref().map(|f| f.name.clone()),
                    description: function.as_ref().and_then(|f| f.description.clone()),
                    parameters: function.as_ref().map(|f| f.parameters.clone()),
                    strict: function.as_ref().and_then(|f| f.strict),
                    ..ResponseTool::default()
                }
            } else {
                ResponseTool {
                    tool_type: t.tool_type.clone(),
                    server_label: t.server_label.clone(),
                    server_url: t.server_url.clone(),
                    headers: t.headers.clone(),
                    authorization: t.authorization.clone(),
                    allowed_tools: t.allowed_tools.clone(),
                    ..ResponseTool::default()
                }
            }
        })
        .collect();

    let (chat_tools, session, tool_configs) =
        translate_tools(&as_response_tools, registry).await?;
    let chat_tools = if chat_tools.is_empty() {
        None
    } else {
        Some(chat_tools)
    };
    Ok((chat_tools, session, tool_configs))
}

/// Set `additionalProperties: false` on every object node of a JSON Schema.
pub fn normalize_schema(schema: &mut Value) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    let is_object_node = obj.get("type").and_then(Value::as_str) == Some("object")
        || obj.contains_key("properties");
    if is_object_node {
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for key in ["properties", "$defs", "definitions"] {
        if let Some(Value::Object(children)) = obj.get_mut(key) {
            for child in children.values_mut() {
                normalize_schema(child);
            }
        }
    }
    for key in ["items", "additionalItems"] {
        if let Some(child) = obj.get_mut(key) {
            normalize_schema(child);
        }
    }
    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(arms)) = obj.get_mut(key) {
            for arm in arms {
                normalize_schema(arm);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// previous_response_id reconstruction
// ----------------------------------------------------------------------------

/// Rebuild the conversation from a stored response: its input items, then
/// its output items, then the new input. Items the caller re-sent are
/// dropped: call-shaped items dedupe on `(type, call_id)`, messages on
/// exact equality.
pub fn merge_previous_items(stored: &StoredResponse, new_input: &ResponseInput) -> Vec<InputItem> {
    let mut merged: Vec<InputItem> = stored
        .input_items
        .iter()
        .map(|wrapped| wrapped.item.clone())
        .collect();
    merged.extend(
        stored
            .response
            .output
            .iter()
            .filter_map(output_item_to_input),
    );

    let new_items: Vec<InputItem> = match new_input {
        ResponseInput::Text(text) => vec![InputItem::user_text(text.clone())],
        ResponseInput::Items(items) => items.clone(),
    };

    for item in new_items {
        let duplicate = merged.iter().any(|existing| {
            match (existing.call_identity(), item.call_identity()) {
                (Some(a), Some(b)) => a == b,
                _ => existing == &item,
            }
        });
        if !duplicate {
            merged.push(item);
        }
    }

    merged
}

/// Convert a stored output item to its input-item form for the next turn.
pub fn output_item_to_input(item: &OutputItem) -> Option<InputItem> {
    match item {
        OutputItem::Message { role, content, .. } => {
            let text: String = content
                .iter()
                .filter_map(|c| match c {
                    OutputContent::OutputText { text, .. } => Some(text.as_str()),
                    OutputContent::Refusal { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("");
            Some(InputItem::Message {
                role: role.clone(),
                content: InputContent::Text(text),
                status: None,
            })
        }
        OutputItem::FunctionCall {
            call_id,
            name,
            arguments,
            ..
        } => Some(InputItem::FunctionCall {
            id: None,
            call_id: call_id.clone(),
            name: name.clone(),
            arguments: arguments.clone(),
            status: None,
        }),
        OutputItem::Reasoning { .. } => None,
        OutputItem::Other(value) => Some(InputItem::Other(value.clone())),
    }
}
