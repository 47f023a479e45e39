//! OpenAI-compatible protocol definitions.
//!
//! Wire types for the two protocols the gateway speaks: the Responses API
//! (typed per-item event streams) and the Chat Completions API
//! (message-shaped chunks with tool_calls), plus the SSE event-name
//! constants shared by both.

pub mod chat;
pub mod common;
pub mod error;
pub mod event_types;
pub mod responses;
