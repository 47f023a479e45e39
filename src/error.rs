//! Gateway error taxonomy and its single mapping to HTTP responses.
//!
//! Errors raised anywhere in the request path converge here; the taxonomy
//! string and status code are decided once, at the axum boundary. Errors
//! raised after an SSE stream has started are not mapped here; they become
//! a `response.failed` event inside the stream (HTTP status stays 200).

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openai_protocol::error::{ErrorEnvelope, ErrorPayload};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

pub const HEADER_ERROR_CODE: &str = "X-Toolgate-Error-Code";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("request duration exceeded: {0}")]
    Timeout(String),

    /// Upstream provider error, keeping the provider's status and fields.
    #[error("{}", .payload.message)]
    Api {
        status: Option<u16>,
        payload: ErrorPayload,
    },

    #[error("stream failed: {0}")]
    Streaming(String),

    #[error("{0}")]
    Processing(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("MCP server unavailable: {0}")]
    McpUnavailable(String),
}

impl GatewayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }

    /// Validation error carrying the offending JSON path, e.g.
    /// `tools[1].parameters.properties.x`.
    pub fn invalid_request_at(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: Some(param.into()),
        }
    }

    /// Taxonomy identifier, stable across releases.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout_error",
            Self::Api { .. } => "api_error",
            Self::Streaming(_) => "streaming_error",
            Self::Processing(_) => "processing_error",
            Self::Storage(_) => "storage_error",
            Self::VectorStore(_) => "vector_store_error",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::McpUnavailable(_) => "mcp_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::ToolNotFound(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Api { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::McpUnavailable(_) => StatusCode::FAILED_DEPENDENCY,
            Self::Streaming(_)
            | Self::Processing(_)
            | Self::Storage(_)
            | Self::VectorStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire payload for both the JSON body and `response.failed` events.
    pub fn payload(&self) -> ErrorPayload {
        match self {
            Self::Api { payload, .. } => payload.clone(),
            Self::InvalidRequest { message, param } => {
                let mut p = ErrorPayload::new(self.error_type(), message.clone());
                p.param = param.clone();
                p
            }
            other => ErrorPayload::new(other.error_type(), other.to_string()),
        }
    }
}

impl From<toolgate_mcp::McpError> for GatewayError {
    fn from(err: toolgate_mcp::McpError) -> Self {
        use toolgate_mcp::McpError;
        match err {
            McpError::Unavailable(msg) | McpError::ServerNotFound(msg) => {
                GatewayError::McpUnavailable(msg)
            }
            McpError::ToolNotFound(name) => GatewayError::ToolNotFound(name),
            McpError::InvalidArguments(msg) => GatewayError::invalid_request(msg),
            McpError::Config(msg) => GatewayError::invalid_request(msg),
            McpError::Execution(msg) | McpError::Transport(msg) => GatewayError::Processing(msg),
            McpError::Io(e) => GatewayError::Processing(e.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = self.payload();

        let mut headers = HeaderMap::with_capacity(1);
        if let Ok(val) = HeaderValue::from_str(payload.error_type.as_str()) {
            headers.insert(HEADER_ERROR_CODE, val);
        }

        (status, headers, Json(ErrorEnvelope { error: payload })).into_response()
    }
}

/// Map an upstream provider failure body to a `GatewayError::Api`, keeping
/// the provider's own `message`/`type`/`param`/`code` when the body has the
/// conventional `{"error":{…}}` shape.
pub fn provider_error(status: u16, body: &str) -> GatewayError {
    let body = sanitize_error_body(body);
    let payload = openai_protocol::error::parse_provider_error(&body)
        .unwrap_or_else(|| ErrorPayload::new("api_error", truncate(&body, 512)));
    GatewayError::Api {
        status: Some(status),
        payload,
    }
}

static ORG_ID_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)\s*\borganization org-\S+").unwrap());
static PROJ_ID_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)\s*\bproject proj_\S+").unwrap());

/// Strip provider-account identifiers (`org-…`, `proj_…`) from upstream
/// error messages before they reach a caller. Non-JSON bodies pass through
/// unchanged.
pub fn sanitize_error_body(body: &str) -> String {
    let mut json: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };

    let mut modified = false;
    if let Some(error) = json.get_mut("error").and_then(serde_json::Value::as_object_mut) {
        if let Some(serde_json::Value::String(msg)) = error.get("message") {
            let sanitized = ORG_ID_RE.replace_all(msg, "");
            let sanitized = PROJ_ID_RE.replace_all(&sanitized, "");
            if sanitized.as_ref() != msg.as_str() {
                error.insert(
                    "message".into(),
                    serde_json::Value::String(sanitized.into_owned()),
                );
                modified = true;
            }
        }
    }

    if modified {
        serde_json::to_string(&json).unwrap_or_else(|_| body.to_string())
    } else {
        body.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(
            GatewayError::invalid_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound("resp_1".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Timeout("60s".into()).status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            GatewayError::Streaming("eof".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::McpUnavailable("gh".into()).status(),
            StatusCode::FAILED_DEPENDENCY
        );
    }

    #[test]
    fn provider_error_keeps_original_fields_and_status() {
        let err = provider_error(
            429,
            r#"{"error":{"message":"slow down","type":"rate_limit_error","code":"rate_limited"}}"#,
        );
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        let payload = err.payload();
        assert_eq!(payload.error_type, "rate_limit_error");
        assert_eq!(payload.message, "slow down");
        assert_eq!(payload.code.as_deref(), Some("rate_limited"));
    }

    #[test]
    fn provider_error_falls_back_for_opaque_bodies() {
        let err = provider_error(502, "Bad Gateway");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.payload().error_type, "api_error");
    }

    #[test]
    fn sanitize_strips_org_and_project_ids() {
        let body = r#"{"error":{"message":"Rate limit reached for organization org-abc123 project proj_xyz","type":"rate_limit_error"}}"#;
        let err = provider_error(429, body);
        let msg = err.payload().message;
        assert!(!msg.contains("org-"));
        assert!(!msg.contains("proj_"));
        assert!(msg.contains("Rate limit reached"));
    }

    #[test]
    fn sanitize_passes_non_json_through() {
        assert_eq!(sanitize_error_body("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn invalid_request_carries_json_path() {
        let err = GatewayError::invalid_request_at(
            "system message must be the first input item",
            "input[3].role",
        );
        let payload = err.payload();
        assert_eq!(payload.param.as_deref(), Some("input[3].role"));
        assert_eq!(payload.error_type, "invalid_request");
    }
}
