//! The streaming tool-loop orchestrator.
//!
//! One state machine per request: call the provider, fold the stream,
//! detect tool calls, execute server-managed tools, append the results to
//! the conversation, and re-enter until the model stops requesting tools,
//! a budget trips, or the caller disconnects. Calls to client-supplied
//! function tools end the loop; their outputs come back on the next turn.

use std::{collections::HashMap, io, sync::Arc};

use bytes::Bytes;
use openai_protocol::{
    chat::{
        ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatUsage, FinishReason,
        ToolCall,
    },
    responses::{
        generate_id, IncompleteDetails, InputContent, InputItem, OutputContent, OutputItem,
        Response, ResponseInput, ResponseStatus, ResponseTool, ResponsesRequest,
    },
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    accumulator::{ChunkAccumulator, CompletedToolCall, TurnSummary},
    budget::{BudgetBreach, RunBudget},
    config::GatewayConfig,
    convert::ConversionOutcome,
    error::{GatewayError, GatewayResult},
    events::{EventEmitter, SseEvent},
    format,
    observability::Metrics,
    providers::{ProviderClient, ProviderTarget},
    services::{FileService, ResponseStore, VectorStore},
    tools::{self, ToolContext, ToolOutcome, ToolRegistry, ToolSession},
};

/// Per-request scope: upstream target, forwarded credential, budget, and
/// the cancellation root.
pub struct RequestScope {
    pub target: ProviderTarget,
    pub bearer: Option<String>,
    pub budget: RunBudget,
    pub cancel: CancellationToken,
}

pub struct Orchestrator {
    provider: Arc<dyn ProviderClient>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ResponseStore>,
    vector_store: Arc<dyn VectorStore>,
    files: Arc<dyn FileService>,
    config: GatewayConfig,
}

/// A turn's managed tool executions, in first-seen call order.
struct ExecutedCall {
    call: CompletedToolCall,
    outcome: ToolOutcome,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ResponseStore>,
        vector_store: Arc<dyn VectorStore>,
        files: Arc<dyn FileService>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            store,
            vector_store,
            files,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn files(&self) -> &Arc<dyn FileService> {
        &self.files
    }

    fn tool_context<'a>(
        &'a self,
        session: &'a ToolSession,
        scope: &RequestScope,
        tool_configs: &HashMap<String, ResponseTool>,
    ) -> ToolContext<'a> {
        ToolContext {
            session,
            registry: &self.registry,
            vector_store: Arc::clone(&self.vector_store),
            files: Arc::clone(&self.files),
            provider: Arc::clone(&self.provider),
            target: scope.target.clone(),
            bearer: scope.bearer.clone(),
            tool_configs: tool_configs.clone(),
            cancel: scope.cancel.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Responses API, non-streaming
    // ------------------------------------------------------------------

    pub async fn run_responses(
        &self,
        req: &ResponsesRequest,
        conversion: ConversionOutcome,
        scope: &RequestScope,
    ) -> GatewayResult<Response> {
        let ConversionOutcome {
            mut chat,
            session,
            tool_configs,
        } = conversion;
        chat.stream = None;

        let response_id = generate_id("resp");
        let created_at = chrono::Utc::now().timestamp();
        let ctx = self.tool_context(&session, scope, &tool_configs);

        let mut output_items: Vec<OutputItem> = Vec::new();
        let mut appended_items: Vec<InputItem> = Vec::new();
        let mut usage = ChatUsage::default();
        let mut iterations: u32 = 0;
        let mut breach: Option<BudgetBreach> = None;

        loop {
            if let Err(b) = scope.budget.check(iterations) {
                Metrics::record_budget_breach(b.reason());
                breach = Some(b);
                break;
            }
            iterations += 1;
            Metrics::record_loop_iteration(&scope.target.model);

            let completion = match tokio::time::timeout_at(
                scope.budget.deadline,
                self.provider
                    .complete(&scope.target, &chat, scope.bearer.as_deref()),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    Metrics::record_budget_breach(BudgetBreach::Timeout.reason());
                    breach = Some(BudgetBreach::Timeout);
                    break;
                }
            };

            if let Some(u) = completion.usage {
                usage.accumulate(&u);
            }
            let turn = turn_from_completion(&completion)?;
            output_items.extend(turn_output_items(&turn));

            if !turn.requests_tools() {
                if !turn.text.is_empty() {
                    appended_items.push(assistant_text_item(&turn.text));
                }
                break;
            }

            let (managed, unmanaged) = partition_calls(&turn, &session);
            if managed.is_empty() {
                // All calls belong to the client; it drives the next turn.
                break;
            }

            let executed = self.execute_tool_calls(&managed, &ctx, &scope.budget).await;
            if scope.cancel.is_cancelled() {
                return Err(GatewayError::Processing("request cancelled".to_string()));
            }
            append_turn(&turn, &executed, &mut chat.messages, &mut appended_items);

            if !unmanaged.is_empty() {
                // Mixed turn: managed work is done and recorded, but the
                // model still waits on client outputs.
                break;
            }
        }

        let mut response = self.build_response(
            response_id,
            created_at,
            req,
            &chat,
            &session,
            output_items,
            usage,
            breach,
        );
        format::rewrite_tools_to_aliases(&mut response, &session);

        if req.wants_store() && !scope.cancel.is_cancelled() {
            let mut input_items = request_input_items(&req.input);
            input_items.extend(appended_items);
            self.store.save(&response, &input_items).await?;
        }

        Ok(response)
    }

    // ------------------------------------------------------------------
    // Responses API, streaming
    // ------------------------------------------------------------------

    /// Run the loop and write SSE frames into `tx`. A failed send means the
    /// client disconnected: the provider stream and in-flight tools are
    /// cancelled and nothing is persisted. Errors after the first event are
    /// emitted as `response.failed` in-stream.
    pub async fn stream_responses(
        &self,
        req: ResponsesRequest,
        conversion: ConversionOutcome,
        scope: RequestScope,
        tx: mpsc::UnboundedSender<Result<Bytes, io::Error>>,
    ) {
        let ConversionOutcome {
            mut chat,
            session,
            tool_configs,
        } = conversion;
        chat.stream = Some(true);

        let response_id = generate_id("resp");
        let created_at = chrono::Utc::now().timestamp();
        let ctx = self.tool_context(&session, &scope, &tool_configs);

        let mut emitter = EventEmitter::new();
        let mut appended_items: Vec<InputItem> = Vec::new();
        let mut usage = ChatUsage::default();
        let mut iterations: u32 = 0;
        let mut breach: Option<BudgetBreach> = None;
        let mut failure: Option<GatewayError> = None;
        let mut cancelled = false;

        let skeleton = Response::in_progress(
            response_id.clone(),
            created_at,
            scope.target.model.clone(),
        );
        let created_event = emitter.created(&skeleton);
        let progress_event = emitter.in_progress(&skeleton);
        if !send_event(&tx, created_event) || !send_event(&tx, progress_event) {
            scope.cancel.cancel();
            return;
        }

        'turns: loop {
            if let Err(b) = scope.budget.check(iterations) {
                Metrics::record_budget_breach(b.reason());
                breach = Some(b);
                break;
            }
            iterations += 1;
            Metrics::record_loop_iteration(&scope.target.model);

            let mut stream = match self
                .provider
                .stream(&scope.target, &chat, scope.bearer.as_deref())
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            let mut acc = ChunkAccumulator::new();
            loop {
                use futures::StreamExt;
                tokio::select! {
                    _ = scope.cancel.cancelled() => {
                        cancelled = true;
                        break 'turns;
                    }
                    // Receiver dropped: the HTTP client went away.
                    _ = tx.closed() => {
                        cancelled = true;
                        scope.cancel.cancel();
                        break 'turns;
                    }
                    _ = tokio::time::sleep_until(scope.budget.deadline) => {
                        Metrics::record_budget_breach(BudgetBreach::Timeout.reason());
                        breach = Some(BudgetBreach::Timeout);
                        break 'turns;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(chunk)) => {
                                let actions = match acc.fold(&chunk) {
                                    Ok(actions) => actions,
                                    Err(e) => {
                                        failure = Some(e);
                                        break 'turns;
                                    }
                                };
                                for action in &actions {
                                    for event in emitter.on_action(action) {
                                        if !send_event(&tx, event) {
                                            cancelled = true;
                                            scope.cancel.cancel();
                                            break 'turns;
                                        }
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                failure = Some(e);
                                break 'turns;
                            }
                            None => break,
                        }
                    }
                }
            }

            let turn = acc.turn();
            if let Some(u) = turn.usage {
                usage.accumulate(&u);
            }

            if !turn.requests_tools() {
                if !turn.text.is_empty() {
                    appended_items.push(assistant_text_item(&turn.text));
                }
                break;
            }

            let (managed, unmanaged) = partition_calls(&turn, &session);
            if managed.is_empty() {
                break;
            }

            let executed = tokio::select! {
                _ = scope.cancel.cancelled() => {
                    cancelled = true;
                    break 'turns;
                }
                _ = tx.closed() => {
                    cancelled = true;
                    scope.cancel.cancel();
                    break 'turns;
                }
                executed = self.execute_tool_calls(&managed, &ctx, &scope.budget) => executed,
            };
            append_turn(&turn, &executed, &mut chat.messages, &mut appended_items);

            if !unmanaged.is_empty() {
                break;
            }
        }

        if cancelled {
            debug!("Client disconnected; dropping stream without persisting");
            return;
        }

        let mut response = self.build_response(
            response_id,
            created_at,
            &req,
            &chat,
            &session,
            emitter.completed_items(),
            usage,
            breach,
        );
        format::rewrite_tools_to_aliases(&mut response, &session);

        let terminal = if let Some(error) = failure {
            warn!("Stream failed mid-flight: {}", error);
            response.status = ResponseStatus::Failed;
            response.error = Some(error.payload());
            emitter.failed(&response)
        } else if breach.is_some() {
            emitter.incomplete(&response)
        } else {
            emitter.completed(&response)
        };
        let stream_intact = match terminal {
            Some(event) => send_event(&tx, event),
            None => true,
        };

        if stream_intact
            && response.status == ResponseStatus::Completed
            && req.wants_store()
        {
            let mut input_items = request_input_items(&req.input);
            input_items.extend(appended_items);
            if let Err(e) = self.store.save(&response, &input_items).await {
                warn!("Failed to persist response: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Chat Completions, non-streaming
    // ------------------------------------------------------------------

    pub async fn run_chat(
        &self,
        mut chat: ChatCompletionRequest,
        session: ToolSession,
        tool_configs: HashMap<String, ResponseTool>,
        scope: &RequestScope,
        store_result: bool,
    ) -> GatewayResult<ChatCompletionResponse> {
        chat.stream = None;
        let ctx = self.tool_context(&session, scope, &tool_configs);
        let mut iterations: u32 = 0;

        loop {
            if let Err(breach) = scope.budget.check(iterations) {
                Metrics::record_budget_breach(breach.reason());
                return Err(match breach {
                    BudgetBreach::Timeout => {
                        GatewayError::Timeout("request duration exceeded".to_string())
                    }
                    BudgetBreach::MaxToolCalls => GatewayError::Processing(format!(
                        "tool loop reached max_iterations after {} provider calls",
                        iterations
                    )),
                });
            }
            iterations += 1;
            Metrics::record_loop_iteration(&scope.target.model);

            let completion = match tokio::time::timeout_at(
                scope.budget.deadline,
                self.provider
                    .complete(&scope.target, &chat, scope.bearer.as_deref()),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(GatewayError::Timeout(
                        "request duration exceeded".to_string(),
                    ))
                }
            };

            let turn = turn_from_completion(&completion)?;
            if !turn.requests_tools() {
                if store_result && !scope.cancel.is_cancelled() {
                    self.store.save_chat(&completion).await?;
                }
                return Ok(completion);
            }

            let (managed, unmanaged) = partition_calls(&turn, &session);
            if managed.is_empty() || !unmanaged.is_empty() {
                // Client tools end the loop in the chat protocol too.
                if !managed.is_empty() {
                    let executed =
                        self.execute_tool_calls(&managed, &ctx, &scope.budget).await;
                    let mut items = Vec::new();
                    append_turn(&turn, &executed, &mut chat.messages, &mut items);
                }
                if store_result && !scope.cancel.is_cancelled() {
                    self.store.save_chat(&completion).await?;
                }
                return Ok(completion);
            }

            let executed = self.execute_tool_calls(&managed, &ctx, &scope.budget).await;
            let mut items = Vec::new();
            append_turn(&turn, &executed, &mut chat.messages, &mut items);
        }
    }

    // ------------------------------------------------------------------
    // Chat Completions, streaming
    // ------------------------------------------------------------------

    /// Stream chat chunks through, intercepting managed tool calls. The
    /// final frame is the chat sentinel `data: [DONE]`.
    pub async fn stream_chat(
        &self,
        mut chat: ChatCompletionRequest,
        session: ToolSession,
        tool_configs: HashMap<String, ResponseTool>,
        scope: RequestScope,
        tx: mpsc::UnboundedSender<Result<Bytes, io::Error>>,
    ) {
        chat.stream = Some(true);
        let ctx = self.tool_context(&session, &scope, &tool_configs);
        let mut iterations: u32 = 0;

        'turns: loop {
            if scope.budget.check(iterations).is_err() {
                break;
            }
            iterations += 1;
            Metrics::record_loop_iteration(&scope.target.model);

            let mut stream = match self
                .provider
                .stream(&scope.target, &chat, scope.bearer.as_deref())
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    let payload = json!({"error": e.payload()});
                    let _ = tx.send(Ok(SseEvent::chat_data(&payload)));
                    break;
                }
            };

            let mut acc = ChunkAccumulator::new();
            // Indexes of managed calls in this turn; their deltas are not
            // forwarded to the client.
            let mut managed_indexes: Vec<u32> = Vec::new();
            let mut turn_failed = false;

            loop {
                use futures::StreamExt;
                tokio::select! {
                    _ = scope.cancel.cancelled() => return,
                    _ = tx.closed() => {
                        scope.cancel.cancel();
                        return;
                    }
                    _ = tokio::time::sleep_until(scope.budget.deadline) => break 'turns,
                    next = stream.next() => {
                        match next {
                            Some(Ok(chunk)) => {
                                if acc.fold(&chunk).is_err() {
                                    turn_failed = true;
                                    break;
                                }
                                for (index, call) in latest_calls(&acc) {
                                    if session.is_managed(&call)
                                        && !managed_indexes.contains(&index)
                                    {
                                        managed_indexes.push(index);
                                    }
                                }
                                let all_managed = {
                                    let turn = acc.turn();
                                    !turn.tool_calls.is_empty()
                                        && turn
                                            .tool_calls
                                            .iter()
                                            .all(|c| session.is_managed(&c.name))
                                };
                                if let Some(filtered) =
                                    filter_chunk(&chunk, &managed_indexes, all_managed)
                                {
                                    let data = match serde_json::to_value(&filtered) {
                                        Ok(v) => v,
                                        Err(_) => continue,
                                    };
                                    if tx.send(Ok(SseEvent::chat_data(&data))).is_err() {
                                        scope.cancel.cancel();
                                        return;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                warn!("Upstream chat stream error: {}", e);
                                turn_failed = true;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }

            if turn_failed {
                break;
            }

            let turn = acc.turn();
            if !turn.requests_tools() {
                break;
            }
            let (managed, unmanaged) = partition_calls(&turn, &session);
            if managed.is_empty() || !unmanaged.is_empty() {
                break;
            }

            let executed = tokio::select! {
                _ = scope.cancel.cancelled() => return,
                executed = self.execute_tool_calls(&managed, &ctx, &scope.budget) => executed,
            };
            let mut items = Vec::new();
            append_turn(&turn, &executed, &mut chat.messages, &mut items);
        }

        let _ = tx.send(Ok(SseEvent::done_sentinel()));
    }

    // ------------------------------------------------------------------
    // Tool execution
    // ------------------------------------------------------------------

    /// Execute a turn's managed calls concurrently under the per-tool
    /// timeout; results come back in the originating call order. Calls with
    /// unparseable arguments are never dispatched.
    async fn execute_tool_calls(
        &self,
        calls: &[CompletedToolCall],
        ctx: &ToolContext<'_>,
        budget: &RunBudget,
    ) -> Vec<ExecutedCall> {
        let futures = calls.iter().map(|call| {
            let call = call.clone();
            async move {
                let outcome = if !call.arguments_valid {
                    ToolOutcome::error("invalid_arguments", "arguments are not valid JSON")
                } else {
                    info!("Executing tool call {} ({})", call.name, call.id);
                    match tokio::time::timeout(
                        budget.per_tool_timeout,
                        tools::dispatch(&call.name, &call.arguments, ctx),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            Metrics::record_tool_timeout(&call.name);
                            ToolOutcome {
                                output: json!({"error": "tool_timeout"}).to_string(),
                                is_error: true,
                            }
                        }
                    }
                };
                ExecutedCall { call, outcome }
            }
        });

        futures::future::join_all(futures).await
    }

    // ------------------------------------------------------------------
    // Response assembly
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn build_response(
        &self,
        id: String,
        created_at: i64,
        req: &ResponsesRequest,
        chat: &ChatCompletionRequest,
        _session: &ToolSession,
        output: Vec<OutputItem>,
        usage: ChatUsage,
        breach: Option<BudgetBreach>,
    ) -> Response {
        let status = if breach.is_some() {
            ResponseStatus::Incomplete
        } else {
            ResponseStatus::Completed
        };

        Response {
            id,
            object: "response".to_string(),
            created_at,
            status,
            model: req.model.clone(),
            output,
            error: None,
            incomplete_details: breach.map(|b| IncompleteDetails {
                reason: b.reason().to_string(),
            }),
            instructions: req.instructions.clone(),
            max_output_tokens: req.max_output_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            tools: chat
                .tools
                .as_ref()
                .map(|tools| {
                    tools
                        .iter()
                        .filter_map(|t| {
                            t.function.as_ref().map(|f| {
                                let mut tool =
                                    ResponseTool::function(f.name.clone(), f.parameters.clone());
                                tool.description = f.description.clone();
                                tool.strict = f.strict;
                                tool
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            tool_choice: req.tool_choice.clone(),
            truncation: req.truncation.clone(),
            usage: Some(usage.into()),
            previous_response_id: req.previous_response_id.clone(),
            metadata: req.metadata.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Free helpers
// ----------------------------------------------------------------------------

fn send_event(tx: &mpsc::UnboundedSender<Result<Bytes, io::Error>>, event: SseEvent) -> bool {
    tx.send(Ok(event.to_bytes())).is_ok()
}

/// Fold a non-streaming completion into the same turn shape the
/// accumulator produces for streams.
fn turn_from_completion(completion: &ChatCompletionResponse) -> GatewayResult<TurnSummary> {
    let choice = completion
        .choices
        .first()
        .ok_or_else(|| GatewayError::Processing("provider returned no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(position, call)| {
            let arguments = if call.function.arguments.is_empty() {
                "{}".to_string()
            } else {
                call.function.arguments.clone()
            };
            let arguments_valid =
                serde_json::from_str::<serde_json::Value>(&arguments).is_ok();
            CompletedToolCall {
                choice: 0,
                index: position as u32,
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments,
                arguments_valid,
            }
        })
        .collect();

    Ok(TurnSummary {
        text: choice.message.content_text(),
        refusal: None,
        reasoning: choice.message.reasoning.clone(),
        tool_calls,
        finish_reason: choice.finish_reason,
        usage: completion.usage,
    })
}

/// Split a turn's calls into managed (server-executed) and client calls,
/// both preserving first-seen order.
fn partition_calls(
    turn: &TurnSummary,
    session: &ToolSession,
) -> (Vec<CompletedToolCall>, Vec<CompletedToolCall>) {
    turn.tool_calls
        .iter()
        .cloned()
        .partition(|call| session.is_managed(&call.name))
}

/// Output items for one turn: reasoning, message text, then every tool
/// call in first-seen order.
fn turn_output_items(turn: &TurnSummary) -> Vec<OutputItem> {
    let mut items = Vec::new();
    if let Some(reasoning) = &turn.reasoning {
        items.push(OutputItem::Reasoning {
            id: generate_id("rs"),
            summary: vec![json!({"type": "summary_text", "text": reasoning})],
            status: Some("completed".to_string()),
        });
    }
    if !turn.text.is_empty() || turn.refusal.is_some() {
        let mut content = Vec::new();
        if !turn.text.is_empty() {
            content.push(OutputContent::OutputText {
                text: turn.text.clone(),
                annotations: vec![],
            });
        }
        if let Some(refusal) = &turn.refusal {
            content.push(OutputContent::Refusal {
                refusal: refusal.clone(),
            });
        }
        items.push(OutputItem::Message {
            id: generate_id("msg"),
            role: "assistant".to_string(),
            status: "completed".to_string(),
            content,
        });
    }
    for call in &turn.tool_calls {
        items.push(OutputItem::FunctionCall {
            id: generate_id("fc"),
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            status: "completed".to_string(),
        });
    }
    items
}

/// Append a finished turn to the conversation: the assistant message (text
/// plus its tool calls), then a tool message per executed call, in call
/// order. Mirrors the same appends into the Responses-item form.
fn append_turn(
    turn: &TurnSummary,
    executed: &[ExecutedCall],
    messages: &mut Vec<ChatMessage>,
    appended_items: &mut Vec<InputItem>,
) {
    let mut assistant = if turn.text.is_empty() {
        ChatMessage::tool_calls(Vec::new())
    } else {
        ChatMessage::text("assistant", turn.text.clone())
    };
    assistant.tool_calls = Some(
        turn.tool_calls
            .iter()
            .map(|call| ToolCall::function(call.id.clone(), call.name.clone(), call.arguments.clone()))
            .collect(),
    );
    messages.push(assistant);

    if !turn.text.is_empty() {
        appended_items.push(assistant_text_item(&turn.text));
    }

    for ExecutedCall { call, outcome } in executed {
        messages.push(ChatMessage::tool_result(
            call.id.clone(),
            outcome.output.clone(),
        ));
        appended_items.push(InputItem::FunctionCall {
            id: None,
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            status: Some("completed".to_string()),
        });
        appended_items.push(InputItem::FunctionCallOutput {
            call_id: call.id.clone(),
            output: outcome.output.clone(),
        });
    }
}

fn assistant_text_item(text: &str) -> InputItem {
    InputItem::Message {
        role: "assistant".to_string(),
        content: InputContent::Text(text.to_string()),
        status: Some("completed".to_string()),
    }
}

/// The request input in item form, for persistence.
pub fn request_input_items(input: &ResponseInput) -> Vec<InputItem> {
    match input {
        ResponseInput::Text(text) => vec![InputItem::user_text(text.clone())],
        ResponseInput::Items(items) => items.clone(),
    }
}

/// Latest known `(index, name)` pairs for the accumulator's calls.
fn latest_calls(acc: &ChunkAccumulator) -> Vec<(u32, String)> {
    acc.turn()
        .tool_calls
        .into_iter()
        .map(|c| (c.index, c.name))
        .collect()
}

/// Drop managed tool-call deltas from a chunk before forwarding. Returns
/// `None` when nothing remains worth sending. The finish chunk is swallowed
/// when every call in the turn is managed (the loop continues).
fn filter_chunk(
    chunk: &openai_protocol::chat::ChatCompletionChunk,
    managed_indexes: &[u32],
    all_calls_managed: bool,
) -> Option<openai_protocol::chat::ChatCompletionChunk> {
    let mut filtered = chunk.clone();
    let mut keep = false;

    for choice in &mut filtered.choices {
        if let Some(tool_calls) = &mut choice.delta.tool_calls {
            tool_calls.retain(|delta| {
                let index = delta.index.unwrap_or(0);
                !managed_indexes.contains(&index)
            });
            if tool_calls.is_empty() {
                choice.delta.tool_calls = None;
            }
        }
        if choice.finish_reason.is_some_and(|r| r.requests_tools()) && all_calls_managed {
            choice.finish_reason = None;
        }
        let delta = &choice.delta;
        if delta.content.is_some()
            || delta.refusal.is_some()
            || delta.reasoning.is_some()
            || delta.tool_calls.is_some()
            || delta.function_call.is_some()
            || delta.role.is_some()
            || choice.finish_reason.is_some()
        {
            keep = true;
        }
    }

    if filtered.usage.is_some() {
        keep = true;
    }

    keep.then_some(filtered)
}
