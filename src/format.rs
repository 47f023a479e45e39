//! Outgoing payload post-processing.
//!
//! Function tools that correspond to server-managed tools are rewritten
//! back to their alias form (`{type:"<alias>"}` or `{type:"mcp", …}`) so
//! clients see them as first-class types rather than raw functions, and
//! numeric `created_at` fields are kept in fixed-point decimal form.

use openai_protocol::responses::{Response, ResponseTool};
use serde_json::Value;

use crate::tools::{ToolProtocol, ToolSession};

/// Rewrite `response.tools[]` entries for server-managed tools to their
/// alias forms. Client-supplied function tools pass through untouched.
pub fn rewrite_tools_to_aliases(response: &mut Response, session: &ToolSession) {
    let mut rewritten: Vec<ResponseTool> = Vec::with_capacity(response.tools.len());
    let mut seen_managed: Vec<String> = Vec::new();

    for tool in response.tools.drain(..) {
        let name = match (&tool.name, tool.is_function()) {
            (Some(name), true) => name.clone(),
            _ => {
                rewritten.push(tool);
                continue;
            }
        };
        let Some(def) = session.definition(&name) else {
            rewritten.push(tool);
            continue;
        };

        match def.protocol {
            ToolProtocol::Native => {
                let alias = session
                    .alias_for(&def.name)
                    .unwrap_or(def.name.as_str())
                    .to_string();
                if !seen_managed.contains(&alias) {
                    rewritten.push(ResponseTool::alias(alias.clone()));
                    seen_managed.push(alias);
                }
            }
            ToolProtocol::Mcp => {
                let label = def
                    .server
                    .as_ref()
                    .map(|s| s.label.clone())
                    .unwrap_or_else(|| "mcp".to_string());
                if !seen_managed.contains(&label) {
                    let mut alias = ResponseTool::alias("mcp");
                    alias.server_label = Some(label.clone());
                    alias.server_url = def.server.as_ref().map(|s| s.url.clone());
                    rewritten.push(alias);
                    seen_managed.push(label);
                }
            }
        }
    }

    response.tools = rewritten;
}

/// Normalize a payload's top-level `created_at` to a fixed-point integer.
/// Floating timestamps from pass-through provider payloads would otherwise
/// render in scientific notation for large values.
pub fn normalize_created_at(payload: &mut Value) {
    normalize_timestamp(payload, "created_at");
}

/// Same normalization for an arbitrary top-level timestamp key (the chat
/// protocol uses `created`).
pub fn normalize_timestamp(payload: &mut Value, key: &str) {
    let Some(created) = payload.get_mut(key) else {
        return;
    };
    if let Some(float) = created.as_f64() {
        if created.as_i64().is_none() {
            *created = Value::from(float.trunc() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ServerBinding, ToolDefinition};
    use serde_json::json;
    use toolgate_mcp::ServerSpec;

    fn session_with_think_and_mcp() -> ToolSession {
        let mut session = ToolSession::new();
        session.add_alias("think", "think");
        session.add_definition(ToolDefinition {
            id: "native:think".to_string(),
            name: "think".to_string(),
            description: None,
            parameters: json!({"type": "object"}),
            protocol: ToolProtocol::Native,
            server: None,
            raw_name: None,
            kind: Some(crate::tools::native::NativeKind::Think),
        });

        let spec = ServerSpec::new("gh", "https://mcp.example/gh");
        session.add_server(ServerBinding {
            label: "gh".to_string(),
            spec: spec.clone(),
        });
        session.add_alias("search_repositories", "gh_search_repositories");
        session.add_definition(ToolDefinition {
            id: "srv:search_repositories".to_string(),
            name: "gh_search_repositories".to_string(),
            description: None,
            parameters: json!({"type": "object"}),
            protocol: ToolProtocol::Mcp,
            server: Some(spec),
            raw_name: Some("search_repositories".to_string()),
            kind: None,
        });
        session
    }

    fn function_tool(name: &str) -> ResponseTool {
        ResponseTool::function(name, json!({"type": "object"}))
    }

    #[test]
    fn managed_functions_are_rewritten_to_alias_forms() {
        let session = session_with_think_and_mcp();
        let mut response = Response::in_progress(
            "resp_1".to_string(),
            1_700_000_000,
            "gpt-4o".to_string(),
        );
        response.tools = vec![
            function_tool("think"),
            function_tool("gh_search_repositories"),
            function_tool("get_weather"),
        ];

        rewrite_tools_to_aliases(&mut response, &session);

        assert_eq!(response.tools.len(), 3);
        assert_eq!(response.tools[0].tool_type, "think");
        assert!(response.tools[0].name.is_none());
        assert_eq!(response.tools[1].tool_type, "mcp");
        assert_eq!(response.tools[1].server_label.as_deref(), Some("gh"));
        // client function tool untouched
        assert_eq!(response.tools[2].tool_type, "function");
        assert_eq!(response.tools[2].name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn multiple_tools_from_one_mcp_server_collapse_to_one_entry() {
        let mut session = session_with_think_and_mcp();
        let spec = ServerSpec::new("gh", "https://mcp.example/gh");
        session.add_alias("list_issues", "gh_list_issues");
        session.add_definition(ToolDefinition {
            id: "srv:list_issues".to_string(),
            name: "gh_list_issues".to_string(),
            description: None,
            parameters: json!({"type": "object"}),
            protocol: ToolProtocol::Mcp,
            server: Some(spec),
            raw_name: Some("list_issues".to_string()),
            kind: None,
        });

        let mut response = Response::in_progress(
            "resp_1".to_string(),
            1_700_000_000,
            "gpt-4o".to_string(),
        );
        response.tools = vec![
            function_tool("gh_search_repositories"),
            function_tool("gh_list_issues"),
        ];

        rewrite_tools_to_aliases(&mut response, &session);

        assert_eq!(response.tools.len(), 1);
        assert_eq!(response.tools[0].tool_type, "mcp");
    }

    #[test]
    fn created_at_floats_become_fixed_point_integers() {
        let mut payload = json!({"created_at": 1.7545e9, "nested": {"created_at": 2.0}});
        normalize_created_at(&mut payload);
        assert_eq!(payload["created_at"], json!(1_754_500_000_i64));
        // only the top-level field is rewritten
        assert_eq!(payload["nested"]["created_at"], json!(2.0));

        let rendered = serde_json::to_string(&payload).unwrap();
        assert!(rendered.contains("\"created_at\":1754500000"));
    }

    #[test]
    fn integer_created_at_is_left_alone() {
        let mut payload = json!({"created_at": 1_700_000_000_i64});
        normalize_created_at(&mut payload);
        assert_eq!(payload["created_at"], json!(1_700_000_000_i64));
    }
}
