//! `/v1/chat/completions` handlers.
//!
//! The same tool loop drives this protocol; alias and MCP entries in the
//! request `tools` list resolve through a chat-specific session. Streaming
//! responses end with the `data: [DONE]` sentinel.

use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response as AxumResponse},
    Json,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{extract_bearer, provider_header, sse_response};
use crate::{
    app::AppState,
    budget::RunBudget,
    convert,
    error::{GatewayError, GatewayResult},
    orchestrator::RequestScope,
    providers::resolve_target,
};
use openai_protocol::chat::ChatCompletionRequest;

pub async fn create_chat_completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut req): Json<ChatCompletionRequest>,
) -> AxumResponse {
    match create_chat_completion_inner(state, headers, &mut req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn create_chat_completion_inner(
    state: AppState,
    headers: HeaderMap,
    req: &mut ChatCompletionRequest,
) -> GatewayResult<AxumResponse> {
    let orchestrator = state.orchestrator.clone();
    let target = resolve_target(&req.model, provider_header(&headers).as_deref())?;
    let bearer = extract_bearer(&headers);

    // Gateway-only flag; not forwarded upstream.
    let store_result = req
        .extra
        .remove("store")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let (tools, session, tool_configs) =
        convert::prepare_chat_tools(req.tools.as_deref(), orchestrator.registry()).await?;

    let mut chat = req.clone();
    chat.model = target.model.clone();
    chat.tools = tools;

    let scope = RequestScope {
        target,
        bearer,
        budget: RunBudget::from_config(orchestrator.config(), req.max_completion_tokens),
        cancel: CancellationToken::new(),
    };

    if chat.stream.unwrap_or(false) {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            orchestrator
                .stream_chat(chat, session, tool_configs, scope, tx)
                .await;
        });
        Ok(sse_response(Body::from_stream(UnboundedReceiverStream::new(
            rx,
        ))))
    } else {
        let completion = orchestrator
            .run_chat(chat, session, tool_configs, &scope, store_result)
            .await?;
        let mut payload = serde_json::to_value(&completion)
            .map_err(|e| GatewayError::Processing(format!("serialize completion: {}", e)))?;
        // Chat payloads carry `created`; keep it fixed-point like `created_at`.
        crate::format::normalize_timestamp(&mut payload, "created");
        Ok(Json(payload).into_response())
    }
}

pub async fn get_chat_completion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AxumResponse {
    match state.orchestrator.store().get_chat(&id).await {
        Ok(Some(completion)) => Json(completion).into_response(),
        Ok(None) => {
            GatewayError::NotFound(format!("chat completion '{}' not found", id)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn delete_chat_completion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AxumResponse {
    match state.orchestrator.store().delete_chat(&id).await {
        Ok(true) => Json(json!({
            "id": id,
            "object": "chat.completion.deleted",
            "deleted": true
        }))
        .into_response(),
        Ok(false) => {
            GatewayError::NotFound(format!("chat completion '{}' not found", id)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
