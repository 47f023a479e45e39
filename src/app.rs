//! Application state and router assembly.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::{GatewayConfig, StoreType},
    error::GatewayError,
    orchestrator::Orchestrator,
    providers::HttpProviderClient,
    routes,
    services::{InMemoryFileService, InMemoryResponseStore, InMemoryVectorStore, ResponseStore},
    tools::{McpBackend, ToolRegistry},
};
use toolgate_mcp::{McpClientPool, McpServersFile};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub mcp_pool: Arc<McpClientPool>,
}

/// Assemble the process-wide state from configuration.
pub async fn build_state(config: GatewayConfig) -> Result<AppState, GatewayError> {
    let mcp_pool = Arc::new(McpClientPool::new());

    let static_servers = if config.mcp_enabled {
        match &config.mcp_config_path {
            Some(path) => {
                let file = McpServersFile::from_path(path)?;
                let specs = file.specs();
                info!("Loaded {} MCP server(s) from {}", specs.len(), path.display());
                specs
            }
            None => {
                warn!("mcp.enabled is set but no mcp.config_path was given");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let registry = Arc::new(
        ToolRegistry::new(Arc::clone(&mcp_pool) as Arc<dyn McpBackend>)
            .with_static_servers(static_servers),
    );

    let store: Arc<dyn ResponseStore> = match config.store_type {
        StoreType::InMemory => Arc::new(InMemoryResponseStore::new()),
        StoreType::Mongodb => build_mongo_store(&config).await?,
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(HttpProviderClient::new()),
        registry,
        store,
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(InMemoryFileService::new()),
        config,
    ));

    Ok(AppState {
        orchestrator,
        mcp_pool,
    })
}

#[cfg(feature = "mongodb-store")]
async fn build_mongo_store(
    config: &GatewayConfig,
) -> Result<Arc<dyn ResponseStore>, GatewayError> {
    let uri = config.mongodb_uri.clone().ok_or_else(|| {
        GatewayError::invalid_request("store.type mongodb requires --mongodb-uri")
    })?;
    Ok(Arc::new(
        crate::services::store::mongo::MongoResponseStore::connect(&uri).await?,
    ))
}

#[cfg(not(feature = "mongodb-store"))]
async fn build_mongo_store(
    _config: &GatewayConfig,
) -> Result<Arc<dyn ResponseStore>, GatewayError> {
    Err(GatewayError::invalid_request(
        "this build does not include the mongodb-store feature",
    ))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/responses", post(routes::responses::create_response))
        .route(
            "/v1/responses/{id}",
            get(routes::responses::get_response).delete(routes::responses::delete_response),
        )
        .route(
            "/v1/responses/{id}/input_items",
            get(routes::responses::list_input_items),
        )
        .route(
            "/v1/chat/completions",
            post(routes::chat::create_chat_completion),
        )
        .route(
            "/v1/chat/completions/{id}",
            get(routes::chat::get_chat_completion).delete(routes::chat::delete_chat_completion),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}
