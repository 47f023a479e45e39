//! MCP expansion and dispatch: alias expansion to qualified names,
//! prefix stripping, allowed_tools filtering, and the chat-protocol loop.

mod common;

use common::*;
use openai_protocol::chat::{ChatCompletionRequest, ChatMessage};
use openai_protocol::responses::{ResponseInput, ResponseTool};
use serde_json::json;
use toolgate::services::ResponseStore;

fn mcp_tool(label: &str, url: &str) -> ResponseTool {
    let mut tool = ResponseTool::alias("mcp");
    tool.server_label = Some(label.to_string());
    tool.server_url = Some(url.to_string());
    tool
}

#[tokio::test]
async fn mcp_tools_expand_to_qualified_function_names() {
    let mcp = MockMcp::with_tools(&["search_repositories"]);
    let h = harness_with(toolgate::config::GatewayConfig::default(), mcp);

    let mut req = responses_request(ResponseInput::Text("find rust gateways".to_string()));
    req.tools = Some(vec![mcp_tool("gh", "https://mcp.example/gh")]);
    let conversion = h.convert(&req).await;

    let tools = conversion.chat.tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(
        tools[0].function.as_ref().unwrap().name,
        "gh_search_repositories"
    );
    assert!(conversion.session.is_managed("gh_search_repositories"));
    // The raw name resolves through the alias map too.
    assert_eq!(
        conversion.session.resolve("search_repositories"),
        Some("gh_search_repositories")
    );
}

#[tokio::test]
async fn qualified_call_is_stripped_before_dispatch() {
    let mcp = MockMcp::with_tools(&["search_repositories"]);
    mcp.set_result("search_repositories", "{\"repos\":[\"toolgate\"]}");
    let h = harness_with(toolgate::config::GatewayConfig::default(), mcp);

    h.provider.push_completion(tool_call_completion(vec![(
        "c1",
        "gh_search_repositories",
        "{}",
    )]));
    h.provider.push_completion(text_completion("found it"));

    let mut req = responses_request(ResponseInput::Text("search".to_string()));
    req.tools = Some(vec![mcp_tool("gh", "https://mcp.example/gh")]);
    let conversion = h.convert(&req).await;
    let scope = h.scope();

    h.orchestrator
        .run_responses(&req, conversion, &scope)
        .await
        .unwrap();

    let executions = h.mcp.executions.lock();
    assert_eq!(executions.len(), 1);
    let (label, raw_name, _args) = &executions[0];
    assert_eq!(label, "gh");
    assert_eq!(raw_name, "search_repositories");
}

#[tokio::test]
async fn allowed_tools_filters_the_expansion() {
    let mcp = MockMcp::with_tools(&["search_repositories", "delete_repository"]);
    let h = harness_with(toolgate::config::GatewayConfig::default(), mcp);

    let mut tool = mcp_tool("gh", "https://mcp.example/gh");
    tool.allowed_tools = Some(vec!["search_repositories".to_string()]);
    let mut req = responses_request(ResponseInput::Text("search".to_string()));
    req.tools = Some(vec![tool]);

    let conversion = h.convert(&req).await;
    let tools = conversion.chat.tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(
        tools[0].function.as_ref().unwrap().name,
        "gh_search_repositories"
    );
    assert!(!conversion.session.is_managed("gh_delete_repository"));
}

#[tokio::test]
async fn invalid_mcp_server_scheme_is_rejected_with_path() {
    let h = harness();
    let mut req = responses_request(ResponseInput::Text("hi".to_string()));
    req.tools = Some(vec![mcp_tool("gh", "ftp://mcp.example/gh")]);

    let err = toolgate::convert::convert_request(
        &req,
        h.orchestrator.registry(),
        h.orchestrator.files(),
        "gpt-4o",
    )
    .await
    .unwrap_err();
    assert_eq!(err.error_type(), "invalid_request");
    assert_eq!(err.payload().param.as_deref(), Some("tools[0].server_url"));
}

#[tokio::test]
async fn chat_protocol_runs_the_same_loop() {
    let mcp = MockMcp::with_tools(&["lookup"]);
    mcp.set_result("lookup", "{\"answer\":42}");
    let h = harness_with(toolgate::config::GatewayConfig::default(), mcp);

    h.provider
        .push_completion(tool_call_completion(vec![("c1", "gh_lookup", "{}")]));
    h.provider.push_completion(text_completion("the answer is 42"));

    let mut chat = ChatCompletionRequest::new("gpt-4o", vec![ChatMessage::text("user", "?")]);
    let (tools, session, configs) = toolgate::convert::prepare_chat_tools(
        Some(&[openai_protocol::common::ChatTool {
            tool_type: "mcp".to_string(),
            function: None,
            server_label: Some("gh".to_string()),
            server_url: Some("https://mcp.example/gh".to_string()),
            headers: None,
            authorization: None,
            allowed_tools: None,
        }]),
        h.orchestrator.registry(),
    )
    .await
    .unwrap();
    chat.tools = tools;

    let scope = h.scope();
    let completion = h
        .orchestrator
        .run_chat(chat, session, configs, &scope, true)
        .await
        .unwrap();

    assert_eq!(h.provider.request_count(), 2);
    assert_eq!(
        completion.choices[0].message.content_text(),
        "the answer is 42"
    );

    // Stored under its completion id (store flag was set).
    let stored = h.store.get_chat(&completion.id).await.unwrap();
    assert!(stored.is_some());

    let executions = h.mcp.executions.lock();
    assert_eq!(executions[0].1, "lookup");
}

#[tokio::test]
async fn tool_timeout_returns_error_output_and_continues() {
    let mut config = toolgate::config::GatewayConfig::default();
    config.per_tool_timeout_ms = 20;
    let mcp = MockMcp::with_tools(&["slow_lookup"]);
    mcp.set_delay(std::time::Duration::from_millis(200));
    let h = harness_with(config, mcp);

    h.provider.push_completion(tool_call_completion(vec![(
        "c1",
        "gh_slow_lookup",
        "{}",
    )]));
    h.provider.push_completion(text_completion("carried on"));

    let mut req = responses_request(ResponseInput::Text("go".to_string()));
    req.tools = Some(vec![mcp_tool("gh", "https://mcp.example/gh")]);
    let conversion = h.convert(&req).await;
    let scope = h.scope();

    let response = h
        .orchestrator
        .run_responses(&req, conversion, &scope)
        .await
        .unwrap();

    assert_eq!(
        response.status,
        openai_protocol::responses::ResponseStatus::Completed
    );
    let second = h.provider.request(1);
    let tool_msg = second.messages.last().unwrap();
    let body: serde_json::Value = serde_json::from_str(&tool_msg.content_text()).unwrap();
    assert_eq!(body, json!({"error": "tool_timeout"}));
}
