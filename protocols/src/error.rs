//! Wire-level error envelope shared by both protocols.

use serde::{Deserialize, Serialize};

/// Body of an error response or a `response.failed` event payload:
/// `{"error": {"type": …, "message": …, "param"?: …, "code"?: …}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ErrorPayload {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            param: None,
            code: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    #[must_use]
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Parse a provider error body of the shape `{"error":{…}}`, surfacing the
/// original fields. Returns `None` for non-JSON or differently shaped bodies.
pub fn parse_provider_error(body: &str) -> Option<ErrorPayload> {
    let envelope: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = envelope.get("error")?;
    Some(ErrorPayload {
        error_type: error
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("api_error")
            .to_string(),
        message: error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("upstream provider error")
            .to_string(),
        param: error
            .get("param")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        code: error
            .get("code")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        timestamp: Some(chrono::Utc::now().timestamp()),
    })
}
