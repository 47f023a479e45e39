//! Streaming scenarios: event ordering, parallel tool calls keyed by
//! index, client disconnect, the chat sentinel, and mid-stream failures.

mod common;

use std::time::Duration;

use common::*;
use openai_protocol::chat::{ChatCompletionRequest, ChatMessage, FinishReason};
use openai_protocol::responses::{ResponseInput, ResponseTool};
use serde_json::Value;
use tokio::sync::mpsc;

#[tokio::test]
async fn streaming_text_emits_the_documented_event_order() {
    let h = harness();
    h.provider.push_stream(vec![
        text_chunk("Hel", None),
        text_chunk("lo", None),
        finish_chunk(FinishReason::Stop),
    ]);

    let mut req = responses_request(ResponseInput::Text("Hi".to_string()));
    req.stream = Some(true);
    let conversion = h.convert(&req).await;
    let scope = h.scope();

    let (tx, rx) = mpsc::unbounded_channel();
    h.orchestrator
        .stream_responses(req, conversion, scope, tx)
        .await;

    let events = collect_frames(rx).await;
    assert_eq!(
        event_names(&events),
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.content_part.done",
            "response.output_item.done",
            "response.completed",
        ]
    );

    // No [DONE] sentinel on Responses streams.
    assert!(events.iter().all(|e| e.data.trim() != "[DONE]"));

    // The final event carries the assembled response.
    let last = events.last().unwrap().json();
    assert_eq!(last["response"]["status"], "completed");
    assert_eq!(
        last["response"]["output"][0]["content"][0]["text"],
        "Hello"
    );

    // Event-order invariant per output item: added, deltas, done.
    let item_events: Vec<&CapturedEvent> = events
        .iter()
        .filter(|e| e.json().get("output_index").is_some())
        .collect();
    assert!(item_events
        .first()
        .unwrap()
        .event
        .as_deref()
        .unwrap()
        .ends_with("output_item.added"));
    assert!(item_events
        .last()
        .unwrap()
        .event
        .as_deref()
        .unwrap()
        .ends_with("output_item.done"));
}

#[tokio::test]
async fn parallel_tool_calls_key_by_index_and_execute_in_order() {
    let mcp = MockMcp::with_tools(&["lookup_a", "lookup_b"]);
    mcp.set_result("lookup_a", "{\"a\":1}");
    mcp.set_result("lookup_b", "{\"b\":2}");
    let h = harness_with(toolgate::config::GatewayConfig::default(), mcp);

    // Turn 1: two tool calls with interleaved argument deltas.
    h.provider.push_stream(vec![
        tool_delta_chunk(vec![
            (0, Some("c0"), Some("gh_lookup_a"), "{\"x\":"),
            (1, Some("c1"), Some("gh_lookup_b"), "{\"y\":"),
        ]),
        // Later chunk lists index 1 before index 0.
        tool_delta_chunk(vec![(1, None, None, "2}"), (0, None, None, "1}")]),
        finish_chunk(FinishReason::ToolCalls),
    ]);
    // Turn 2: final text.
    h.provider
        .push_stream(vec![text_chunk("both done", None), finish_chunk(FinishReason::Stop)]);

    let mut req = responses_request(ResponseInput::Text("go".to_string()));
    req.tools = Some(vec![{
        let mut tool = ResponseTool::alias("mcp");
        tool.server_label = Some("gh".to_string());
        tool.server_url = Some("https://mcp.example/gh".to_string());
        tool
    }]);
    req.stream = Some(true);
    let conversion = h.convert(&req).await;
    let scope = h.scope();

    let (tx, rx) = mpsc::unbounded_channel();
    h.orchestrator
        .stream_responses(req, conversion, scope, tx)
        .await;
    let events = collect_frames(rx).await;

    // Arguments folded by index despite interleaving.
    let second = h.provider.request(1);
    let assistant = &second.messages[second.messages.len() - 3];
    let calls = assistant.tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].function.arguments, "{\"x\":1}");
    assert_eq!(calls[1].function.arguments, "{\"y\":2}");

    // Both outputs appended in first-seen order (index 0 before 1).
    let tool_messages: Vec<&ChatMessage> = second
        .messages
        .iter()
        .filter(|m| m.role == "tool")
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("c0"));
    assert_eq!(tool_messages[0].content_text(), "{\"a\":1}");
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("c1"));

    // Qualified names were stripped before hitting the server.
    let executions = h.mcp.executions.lock();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].1, "lookup_a");
    assert_eq!(executions[1].1, "lookup_b");
    drop(executions);

    // Exactly one terminal event, and it is last.
    let names = event_names(&events);
    let terminals: Vec<&String> = names
        .iter()
        .filter(|n| {
            n.as_str() == "response.completed"
                || n.as_str() == "response.failed"
                || n.as_str() == "response.incomplete"
        })
        .collect();
    assert_eq!(terminals.len(), 1);
    assert_eq!(names.last().unwrap().as_str(), "response.completed");
}

#[tokio::test]
async fn client_disconnect_cancels_the_run_and_skips_persistence() {
    let h = harness();
    // Upstream keeps the stream open forever after the first delta.
    h.provider
        .push_hanging_stream(vec![text_chunk("partial", None)]);

    let mut req = responses_request(ResponseInput::Text("Hi".to_string()));
    req.stream = Some(true);
    req.store = Some(true);
    let conversion = h.convert(&req).await;
    let scope = h.scope();
    let cancel = scope.cancel.clone();

    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = h.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator.stream_responses(req, conversion, scope, tx).await;
    });

    // Let the first frames flow, then hang up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(rx);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("stream task stops within a second")
        .unwrap();
    assert!(cancel.is_cancelled());

    // Nothing persisted for the aborted request.
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn mid_stream_provider_failure_emits_response_failed() {
    let h = harness();
    // First turn requests a managed tool, second turn's script is missing,
    // so the provider errors mid-loop, after SSE has started.
    h.provider.push_stream(vec![
        tool_delta_chunk(vec![(0, Some("c0"), Some("think"), "{\"thought\":\"x\"}")]),
        finish_chunk(FinishReason::ToolCalls),
    ]);

    let mut req = responses_request(ResponseInput::Text("go".to_string()));
    req.tools = Some(vec![ResponseTool::alias("think")]);
    req.stream = Some(true);
    let conversion = h.convert(&req).await;
    let scope = h.scope();

    let (tx, rx) = mpsc::unbounded_channel();
    h.orchestrator
        .stream_responses(req, conversion, scope, tx)
        .await;
    let events = collect_frames(rx).await;

    let names = event_names(&events);
    assert_eq!(names.last().unwrap().as_str(), "response.failed");
    let last = events.last().unwrap().json();
    assert_eq!(last["response"]["status"], "failed");
    assert!(last["response"]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("exhausted"));
}

#[tokio::test]
async fn chat_stream_emits_done_sentinel_and_forwards_text() {
    let h = harness();
    h.provider.push_stream(vec![
        text_chunk("Hel", None),
        text_chunk("lo", None),
        finish_chunk(FinishReason::Stop),
    ]);

    let chat = ChatCompletionRequest::new("gpt-4o", vec![ChatMessage::text("user", "Hi")]);
    let scope = h.scope();
    let (tx, rx) = mpsc::unbounded_channel();
    h.orchestrator
        .stream_chat(
            chat,
            Default::default(),
            Default::default(),
            scope,
            tx,
        )
        .await;

    let events = collect_frames(rx).await;
    // All frames are bare data lines; the last is the sentinel.
    assert!(events.iter().all(|e| e.event.is_none()));
    assert_eq!(events.last().unwrap().data.trim(), "[DONE]");

    let texts: Vec<String> = events
        .iter()
        .filter_map(|e| {
            e.json()["choices"][0]["delta"]["content"]
                .as_str()
                .map(str::to_string)
        })
        .collect();
    assert_eq!(texts, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn chat_stream_hides_managed_tool_calls_from_the_client() {
    let h = harness();
    // Turn 1: a managed think call; turn 2: text.
    h.provider.push_stream(vec![
        tool_delta_chunk(vec![(0, Some("c0"), Some("think"), "{\"thought\":\"x\"}")]),
        finish_chunk(FinishReason::ToolCalls),
    ]);
    h.provider
        .push_stream(vec![text_chunk("done", None), finish_chunk(FinishReason::Stop)]);

    let mut chat = ChatCompletionRequest::new("gpt-4o", vec![ChatMessage::text("user", "go")]);
    let (tools, session, configs) = toolgate::convert::prepare_chat_tools(
        Some(&[openai_protocol::common::ChatTool {
            tool_type: "think".to_string(),
            function: None,
            server_label: None,
            server_url: None,
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
    let (tx, rx) = mpsc::unbounded_channel();
    h.orchestrator
        .stream_chat(chat, session, configs, scope, tx)
        .await;

    let events = collect_frames(rx).await;
    // No tool_call deltas reached the client.
    for event in &events {
        let json = event.json();
        if json == Value::Null {
            continue;
        }
        assert!(json["choices"][0]["delta"]["tool_calls"].is_null());
    }
    // Both provider turns ran.
    assert_eq!(h.provider.request_count(), 2);
    assert_eq!(events.last().unwrap().data.trim(), "[DONE]");
}
