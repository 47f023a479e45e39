//! Shared test harness: a scripted provider, a scripted MCP backend, and
//! an orchestrator wired to in-memory services.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use openai_protocol::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChatUsage, ChunkChoice, ChunkDelta, FinishReason, FunctionCallDelta, ToolCall, ToolCallDelta,
};
use openai_protocol::responses::{ResponseInput, ResponsesRequest};
use toolgate::budget::RunBudget;
use toolgate::config::GatewayConfig;
use toolgate::error::{GatewayError, GatewayResult};
use toolgate::orchestrator::{Orchestrator, RequestScope};
use toolgate::providers::{ChunkStream, ProviderClient, ProviderTarget, SseFrameBuffer};
use toolgate::services::{
    FileService, InMemoryFileService, InMemoryResponseStore, InMemoryVectorStore, ResponseStore,
};
use toolgate::tools::{McpBackend, ToolRegistry};
use toolgate_mcp::{McpError, McpToolDef, ServerSpec};

// ----------------------------------------------------------------------------
// Scripted provider
// ----------------------------------------------------------------------------

pub struct ScriptedStream {
    pub chunks: Vec<ChatCompletionChunk>,
    /// Keep the stream open (pending) after the scripted chunks.
    pub hang_after: bool,
}

#[derive(Default)]
pub struct MockProvider {
    completions: Mutex<VecDeque<ChatCompletionResponse>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_completion(&self, completion: ChatCompletionResponse) {
        self.completions.lock().push_back(completion);
    }

    pub fn push_stream(&self, chunks: Vec<ChatCompletionChunk>) {
        self.streams.lock().push_back(ScriptedStream {
            chunks,
            hang_after: false,
        });
    }

    pub fn push_hanging_stream(&self, chunks: Vec<ChatCompletionChunk>) {
        self.streams.lock().push_back(ScriptedStream {
            chunks,
            hang_after: true,
        });
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn request(&self, index: usize) -> ChatCompletionRequest {
        self.requests.lock()[index].clone()
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn complete(
        &self,
        _target: &ProviderTarget,
        request: &ChatCompletionRequest,
        _bearer: Option<&str>,
    ) -> GatewayResult<ChatCompletionResponse> {
        self.requests.lock().push(request.clone());
        self.completions
            .lock()
            .pop_front()
            .ok_or_else(|| GatewayError::Processing("mock provider script exhausted".to_string()))
    }

    async fn stream(
        &self,
        _target: &ProviderTarget,
        request: &ChatCompletionRequest,
        _bearer: Option<&str>,
    ) -> GatewayResult<ChunkStream> {
        self.requests.lock().push(request.clone());
        let script = self
            .streams
            .lock()
            .pop_front()
            .ok_or_else(|| GatewayError::Processing("mock provider script exhausted".to_string()))?;
        let chunks = futures::stream::iter(script.chunks.into_iter().map(Ok));
        if script.hang_after {
            Ok(Box::pin(chunks.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }

    async fn generate_image(
        &self,
        _target: &ProviderTarget,
        _payload: Value,
        _bearer: Option<&str>,
    ) -> GatewayResult<Value> {
        Ok(json!({"data": [{"b64_json": "aW1n"}]}))
    }
}

// ----------------------------------------------------------------------------
// Scripted MCP backend
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MockMcp {
    pub tools: Vec<McpToolDef>,
    pub results: Mutex<HashMap<String, String>>,
    /// Recorded executions: (server label, raw tool name, arguments).
    pub executions: Mutex<Vec<(String, String, Value)>>,
    /// Artificial latency per execution.
    pub delay: Mutex<Option<std::time::Duration>>,
}

impl MockMcp {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|name| McpToolDef {
                    name: name.to_string(),
                    description: Some(format!("mock tool {}", name)),
                    input_schema: json!({"type": "object", "properties": {}}),
                })
                .collect(),
            results: Mutex::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn set_result(&self, tool: &str, result: &str) {
        self.results
            .lock()
            .insert(tool.to_string(), result.to_string());
    }

    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl McpBackend for MockMcp {
    async fn list_tools(&self, _spec: &ServerSpec) -> GatewayResult<Vec<McpToolDef>> {
        Ok(self.tools.clone())
    }

    async fn execute(
        &self,
        spec: &ServerSpec,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.executions
            .lock()
            .push((spec.label.clone(), tool.to_string(), arguments));
        match self.results.lock().get(tool) {
            Some(result) => Ok(result.clone()),
            None => Ok(format!("{{\"result\":\"{}\"}}", tool)),
        }
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub mcp: Arc<MockMcp>,
    pub store: Arc<InMemoryResponseStore>,
    pub files: Arc<InMemoryFileService>,
    pub orchestrator: Arc<Orchestrator>,
    pub config: GatewayConfig,
}

pub fn harness() -> Harness {
    harness_with(GatewayConfig::default(), MockMcp::default())
}

pub fn harness_with(config: GatewayConfig, mcp: MockMcp) -> Harness {
    let provider = Arc::new(MockProvider::new());
    let mcp = Arc::new(mcp);
    let store = Arc::new(InMemoryResponseStore::new());
    let files = Arc::new(InMemoryFileService::new());

    let registry = Arc::new(ToolRegistry::new(
        Arc::clone(&mcp) as Arc<dyn McpBackend>
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&provider) as Arc<dyn ProviderClient>,
        registry,
        Arc::clone(&store) as Arc<dyn ResponseStore>,
        Arc::new(InMemoryVectorStore::new()),
        Arc::clone(&files) as Arc<dyn FileService>,
        config.clone(),
    ));

    Harness {
        provider,
        mcp,
        store,
        files,
        orchestrator,
        config,
    }
}

impl Harness {
    pub fn scope(&self) -> RequestScope {
        RequestScope {
            target: ProviderTarget {
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
            },
            bearer: None,
            budget: RunBudget::from_config(&self.config, None),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn convert(
        &self,
        req: &ResponsesRequest,
    ) -> toolgate::convert::ConversionOutcome {
        toolgate::convert::convert_request(
            req,
            self.orchestrator.registry(),
            self.orchestrator.files(),
            "gpt-4o",
        )
        .await
        .expect("conversion succeeds")
    }
}

// ----------------------------------------------------------------------------
// Request / completion / chunk builders
// ----------------------------------------------------------------------------

pub fn responses_request(input: ResponseInput) -> ResponsesRequest {
    ResponsesRequest {
        model: "openai@gpt-4o".to_string(),
        input,
        instructions: None,
        tools: None,
        tool_choice: None,
        temperature: None,
        top_p: None,
        max_output_tokens: None,
        max_tool_calls: None,
        text: None,
        reasoning: None,
        previous_response_id: None,
        store: None,
        truncation: None,
        stream: None,
        metadata: None,
    }
}

pub fn text_completion(text: &str) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", rand_suffix()),
        object: "chat.completion".to_string(),
        created: 1_700_000_000,
        model: "gpt-4o".to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::text("assistant", text),
            finish_reason: Some(FinishReason::Stop),
        }],
        usage: Some(ChatUsage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 10,
        }),
    }
}

pub fn tool_call_completion(calls: Vec<(&str, &str, &str)>) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", rand_suffix()),
        object: "chat.completion".to_string(),
        created: 1_700_000_000,
        model: "gpt-4o".to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::tool_calls(
                calls
                    .into_iter()
                    .map(|(id, name, args)| ToolCall::function(id, name, args))
                    .collect(),
            ),
            finish_reason: Some(FinishReason::ToolCalls),
        }],
        usage: None,
    }
}

pub fn text_chunk(content: &str, finish: Option<FinishReason>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: Some("chatcmpl-stream".to_string()),
        object: Some("chat.completion.chunk".to_string()),
        created: Some(1_700_000_000),
        model: Some("gpt-4o".to_string()),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                content: Some(content.to_string()),
                ..ChunkDelta::default()
            },
            finish_reason: finish,
        }],
        usage: None,
    }
}

pub fn finish_chunk(finish: FinishReason) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: Some("chatcmpl-stream".to_string()),
        object: Some("chat.completion.chunk".to_string()),
        created: Some(1_700_000_000),
        model: Some("gpt-4o".to_string()),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(finish),
        }],
        usage: None,
    }
}

pub fn tool_delta_chunk(deltas: Vec<(u32, Option<&str>, Option<&str>, &str)>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: Some("chatcmpl-stream".to_string()),
        object: Some("chat.completion.chunk".to_string()),
        created: Some(1_700_000_000),
        model: Some("gpt-4o".to_string()),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                tool_calls: Some(
                    deltas
                        .into_iter()
                        .map(|(index, id, name, args)| ToolCallDelta {
                            index: Some(index),
                            id: id.map(str::to_string),
                            call_type: id.map(|_| "function".to_string()),
                            function: Some(FunctionCallDelta {
                                name: name.map(str::to_string),
                                arguments: Some(args.to_string()),
                            }),
                        })
                        .collect(),
                ),
                ..ChunkDelta::default()
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

fn rand_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ----------------------------------------------------------------------------
// SSE capture
// ----------------------------------------------------------------------------

/// Parsed SSE record from a captured stream.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub event: Option<String>,
    pub data: String,
}

impl CapturedEvent {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).unwrap_or(Value::Null)
    }
}

/// Drain a closed SSE channel into parsed records.
pub async fn collect_frames(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Result<bytes::Bytes, std::io::Error>>,
) -> Vec<CapturedEvent> {
    let mut buffer = SseFrameBuffer::new();
    let mut events = Vec::new();
    while let Some(item) = rx.recv().await {
        let bytes = item.expect("stream items are Ok");
        for frame in buffer.push(&bytes).expect("frames parse") {
            events.push(CapturedEvent {
                event: frame.event,
                data: frame.data,
            });
        }
    }
    events
}

/// Event names in order, for ordering assertions.
pub fn event_names(events: &[CapturedEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.event.clone())
        .collect()
}
