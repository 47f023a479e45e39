//! `/v1/responses` handlers.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response as AxumResponse},
    Json,
};
use serde::Deserialize;
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
    services::Pagination,
};
use openai_protocol::responses::{ResponseInput, ResponsesRequest};

pub async fn create_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut req): Json<ResponsesRequest>,
) -> AxumResponse {
    match create_response_inner(state, headers, &mut req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn create_response_inner(
    state: AppState,
    headers: HeaderMap,
    req: &mut ResponsesRequest,
) -> GatewayResult<AxumResponse> {
    let orchestrator = state.orchestrator.clone();
    let target = resolve_target(&req.model, provider_header(&headers).as_deref())?;
    let bearer = extract_bearer(&headers);

    // Reconstruct the conversation from a stored prior response.
    if let Some(previous_id) = &req.previous_response_id {
        let stored = orchestrator
            .store()
            .get(previous_id)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!("response '{}' not found", previous_id))
            })?;
        req.input = ResponseInput::Items(convert::merge_previous_items(&stored, &req.input));
    }

    let conversion = convert::convert_request(
        req,
        orchestrator.registry(),
        orchestrator.files(),
        &target.model,
    )
    .await?;

    let scope = RequestScope {
        target,
        bearer,
        budget: RunBudget::from_config(orchestrator.config(), req.max_output_tokens),
        cancel: CancellationToken::new(),
    };

    if req.is_streaming() {
        let (tx, rx) = mpsc::unbounded_channel();
        let req = req.clone();
        tokio::spawn(async move {
            orchestrator
                .stream_responses(req, conversion, scope, tx)
                .await;
        });
        Ok(sse_response(Body::from_stream(UnboundedReceiverStream::new(
            rx,
        ))))
    } else {
        let response = orchestrator.run_responses(req, conversion, &scope).await?;
        Ok(Json(response).into_response())
    }
}

pub async fn get_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AxumResponse {
    match state.orchestrator.store().get(&id).await {
        Ok(Some(stored)) => Json(stored.response).into_response(),
        Ok(None) => {
            GatewayError::NotFound(format!("response '{}' not found", id)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn delete_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AxumResponse {
    match state.orchestrator.store().delete(&id).await {
        Ok(true) => Json(json!({
            "id": id,
            "object": "response.deleted",
            "deleted": true
        }))
        .into_response(),
        Ok(false) => {
            GatewayError::NotFound(format!("response '{}' not found", id)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

pub async fn list_input_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListItemsQuery>,
) -> AxumResponse {
    let page = Pagination {
        limit: query.limit.unwrap_or(0),
        after: query.after,
        descending: query.order.as_deref() == Some("desc"),
    };
    match state
        .orchestrator
        .store()
        .list_input_items(&id, page)
        .await
    {
        Ok(list) => Json(list).into_response(),
        Err(e) => e.into_response(),
    }
}
