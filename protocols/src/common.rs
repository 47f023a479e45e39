//! Types shared between the Chat Completions and Responses protocols.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A function definition in the Chat Completions tool shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// A Chat Completions tool. The canonical shape is
/// `{"type":"function","function":{...}}`; the gateway additionally accepts
/// `{"type":"mcp", …}` entries and bare alias forms (`{"type":"think"}`)
/// whose extra fields live alongside the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDef>,
    // mcp fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
}

impl ChatTool {
    pub fn function(def: FunctionDef) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: Some(def),
            server_label: None,
            server_url: None,
            headers: None,
            authorization: None,
            allowed_tools: None,
        }
    }

    pub fn is_function(&self) -> bool {
        self.tool_type == "function"
    }

    pub fn is_mcp(&self) -> bool {
        self.tool_type == "mcp"
    }
}

/// Tool choice: a mode string (`auto`, `none`, `required`) or a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Named(NamedToolChoice),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedToolChoice {
    #[serde(rename = "type")]
    pub choice_type: String,
    pub function: ToolChoiceFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// Structured output configuration forwarded to providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}
