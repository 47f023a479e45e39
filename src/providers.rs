//! Upstream provider registry and chat-completion client.
//!
//! Model naming is `<provider>@<model>`, or a bare model name when the
//! `x-model-provider` header selects the family. The caller's bearer token
//! is forwarded to the provider; per-provider env vars supply base-URL
//! overrides and fallback credentials.

use std::{collections::VecDeque, pin::Pin, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use openai_protocol::chat::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{provider_error, GatewayError, GatewayResult},
    observability::Metrics,
};

/// Maximum SSE buffer size (1 MB) to protect against upstream providers
/// that send data without frame delimiters.
const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;

/// Known provider families: `(name, default base URL)`.
const PROVIDERS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("claude", "https://api.anthropic.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("xai", "https://api.x.ai/v1"),
    ("togetherai", "https://api.together.xyz/v1"),
];

/// A resolved upstream target for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTarget {
    pub provider: String,
    pub model: String,
    pub base_url: String,
}

impl ProviderTarget {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn images_url(&self) -> String {
        format!("{}/images/generations", self.base_url.trim_end_matches('/'))
    }

    /// Fallback credential from `<PROVIDER>_API_KEY`.
    pub fn env_api_key(&self) -> Option<String> {
        std::env::var(format!("{}_API_KEY", self.provider.to_uppercase())).ok()
    }
}

/// Resolve `<provider>@<model>` (or bare model + `x-model-provider` header)
/// into an upstream target. Unknown providers are an `invalid_request`.
pub fn resolve_target(model: &str, header_provider: Option<&str>) -> GatewayResult<ProviderTarget> {
    let (provider, model_name) = match model.split_once('@') {
        Some((p, m)) if !p.is_empty() && !m.is_empty() => (p.to_string(), m.to_string()),
        Some(_) => {
            return Err(GatewayError::invalid_request_at(
                format!("malformed model name '{}'", model),
                "model",
            ))
        }
        None => match header_provider {
            Some(p) => (p.to_string(), model.to_string()),
            None => ("openai".to_string(), model.to_string()),
        },
    };

    let provider = provider.to_lowercase();
    let default_base = PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, base)| *base)
        .ok_or_else(|| {
            GatewayError::invalid_request_at(format!("unknown model provider '{}'", provider), "model")
        })?;

    let base_url = std::env::var(format!("{}_BASE_URL", provider.to_uppercase()))
        .unwrap_or_else(|_| default_base.to_string());

    Ok(ProviderTarget {
        provider,
        model: model_name,
        base_url,
    })
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = GatewayResult<ChatCompletionChunk>> + Send>>;

/// Upstream chat-completion transport. The orchestrator only sees this
/// trait; tests drive it with a scripted in-process implementation.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn complete(
        &self,
        target: &ProviderTarget,
        request: &ChatCompletionRequest,
        bearer: Option<&str>,
    ) -> GatewayResult<ChatCompletionResponse>;

    async fn stream(
        &self,
        target: &ProviderTarget,
        request: &ChatCompletionRequest,
        bearer: Option<&str>,
    ) -> GatewayResult<ChunkStream>;

    /// Provider-specific image generation; the payload is passed through.
    async fn generate_image(
        &self,
        target: &ProviderTarget,
        payload: Value,
        bearer: Option<&str>,
    ) -> GatewayResult<Value>;
}

// ----------------------------------------------------------------------------
// SSE frame parsing
// ----------------------------------------------------------------------------

/// One parsed SSE record: optional `event:` name plus joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE frame splitter over a byte stream.
#[derive(Default)]
pub struct SseFrameBuffer {
    buffer: String,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes, returning every complete frame they close.
    pub fn push(&mut self, bytes: &[u8]) -> GatewayResult<Vec<SseFrame>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        if self.buffer.len() > MAX_SSE_BUFFER_SIZE {
            return Err(GatewayError::Streaming(
                "SSE buffer overflow from upstream".to_string(),
            ));
        }

        let mut frames = Vec::new();
        loop {
            let Some(split_at) = find_frame_boundary(&self.buffer) else {
                break;
            };
            let rest = self.buffer.split_off(split_at.end);
            let raw = std::mem::replace(&mut self.buffer, rest);
            if let Some(frame) = parse_frame(&raw[..split_at.start]) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }
}

struct FrameBoundary {
    start: usize,
    end: usize,
}

fn find_frame_boundary(buffer: &str) -> Option<FrameBoundary> {
    let lf = buffer.find("\n\n").map(|i| FrameBoundary {
        start: i,
        end: i + 2,
    });
    let crlf = buffer.find("\r\n\r\n").map(|i| FrameBoundary {
        start: i,
        end: i + 4,
    });
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.start <= b.start { a } else { b }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

// ----------------------------------------------------------------------------
// HTTP implementation
// ----------------------------------------------------------------------------

pub struct HttpProviderClient {
    client: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        target: &ProviderTarget,
        bearer: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match bearer
            .map(str::to_string)
            .or_else(|| target.env_api_key())
        {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn complete(
        &self,
        target: &ProviderTarget,
        request: &ChatCompletionRequest,
        bearer: Option<&str>,
    ) -> GatewayResult<ChatCompletionResponse> {
        let started = Instant::now();
        let builder = self.client.post(target.chat_completions_url()).json(request);
        let response = self
            .authorize(builder, target, bearer)
            .send()
            .await
            .map_err(|e| GatewayError::Processing(format!("upstream request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status.as_u16(), &body));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| GatewayError::Processing(format!("parse upstream response: {}", e)))?;
        Metrics::record_provider_latency(&target.provider, started.elapsed());
        Ok(parsed)
    }

    async fn stream(
        &self,
        target: &ProviderTarget,
        request: &ChatCompletionRequest,
        bearer: Option<&str>,
    ) -> GatewayResult<ChunkStream> {
        let started = Instant::now();
        let builder = self.client.post(target.chat_completions_url()).json(request);
        let response = self
            .authorize(builder, target, bearer)
            .send()
            .await
            .map_err(|e| GatewayError::Processing(format!("upstream request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(status.as_u16(), &body));
        }
        Metrics::record_provider_latency(&target.provider, started.elapsed());

        struct StreamState {
            inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
            frames: SseFrameBuffer,
            pending: VecDeque<ChatCompletionChunk>,
            finished: bool,
        }

        let state = StreamState {
            inner: Box::pin(response.bytes_stream()),
            frames: SseFrameBuffer::new(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(chunk) = st.pending.pop_front() {
                    return Some((Ok(chunk), st));
                }
                if st.finished {
                    return None;
                }
                match st.inner.next().await {
                    Some(Ok(bytes)) => {
                        let frames = match st.frames.push(&bytes) {
                            Ok(frames) => frames,
                            Err(e) => {
                                st.finished = true;
                                return Some((Err(e), st));
                            }
                        };
                        for frame in frames {
                            if frame.data.trim() == "[DONE]" {
                                st.finished = true;
                                break;
                            }
                            match serde_json::from_str::<ChatCompletionChunk>(&frame.data) {
                                Ok(chunk) => st.pending.push_back(chunk),
                                Err(e) => {
                                    debug!("Skipping unparseable upstream frame: {}", e);
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((
                            Err(GatewayError::Streaming(format!(
                                "upstream stream error: {}",
                                e
                            ))),
                            st,
                        ));
                    }
                    None => {
                        st.finished = true;
                        return None;
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn generate_image(
        &self,
        target: &ProviderTarget,
        payload: Value,
        bearer: Option<&str>,
    ) -> GatewayResult<Value> {
        let builder = self.client.post(target.images_url()).json(&payload);
        let response = self
            .authorize(builder, target, bearer)
            .send()
            .await
            .map_err(|e| GatewayError::Processing(format!("image request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Image generation failed with status {}", status);
            return Err(provider_error(status.as_u16(), &body));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::Processing(format!("parse image response: {}", e)))
    }
}
