//! Chunk accumulator: folds streamed chat-completion chunks into stable
//! per-turn state.
//!
//! Tool calls are keyed by `delta.tool_calls[j].index`, not array position,
//! so interleaved deltas land on the right call. The legacy single
//! `function_call` delta form folds as index 0. Per-block accumulation is
//! size-capped against unbounded upstream growth.

use std::collections::BTreeMap;

use openai_protocol::chat::{ChatCompletionChunk, ChatUsage, FinishReason};
use openai_protocol::responses::generate_id;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// Maximum accumulated size for a single block's text or arguments (10 MB).
const MAX_BLOCK_ACCUMULATION_SIZE: usize = 10 * 1024 * 1024;

/// Maximum tool-call index accepted from upstream.
const MAX_TOOL_CALL_INDEX: u32 = 1024;

/// State change produced by folding one chunk, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamAction {
    TextDelta {
        choice: u32,
        delta: String,
    },
    RefusalDelta {
        choice: u32,
        delta: String,
    },
    ReasoningDelta {
        choice: u32,
        delta: String,
    },
    ToolCallStarted {
        choice: u32,
        index: u32,
        id: String,
        name: String,
    },
    ToolCallArgsDelta {
        choice: u32,
        index: u32,
        delta: String,
    },
    ChoiceFinished {
        choice: u32,
        reason: FinishReason,
    },
}

#[derive(Debug, Clone)]
pub struct ToolCallState {
    pub id: String,
    pub name: String,
    pub arguments: String,
    /// First-seen order across the whole turn.
    pub order: usize,
}

#[derive(Debug, Default)]
struct ChoiceState {
    text: String,
    refusal: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, ToolCallState>,
    finish: Option<FinishReason>,
}

/// A completed tool call at turn end, in first-seen order.
#[derive(Debug, Clone)]
pub struct CompletedToolCall {
    pub choice: u32,
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
    /// Whether `arguments` parses as JSON. Calls that fail this are never
    /// executed.
    pub arguments_valid: bool,
}

/// Snapshot of a finished turn.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub text: String,
    pub refusal: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<CompletedToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<ChatUsage>,
}

impl TurnSummary {
    /// True when the model stopped to request tool execution.
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
            && self
                .finish_reason
                .is_some_and(|reason| reason.requests_tools())
    }
}

#[derive(Default)]
pub struct ChunkAccumulator {
    choices: BTreeMap<u32, ChoiceState>,
    usage: Option<ChatUsage>,
    next_call_order: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk, returning the state changes it caused.
    pub fn fold(&mut self, chunk: &ChatCompletionChunk) -> GatewayResult<Vec<StreamAction>> {
        let mut actions = Vec::new();

        if let Some(usage) = &chunk.usage {
            self.usage = Some(*usage);
        }

        for choice in &chunk.choices {
            let choice_index = choice.index;
            let state = self.choices.entry(choice_index).or_default();

            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    guard_size(state.text.len(), content.len())?;
                    state.text.push_str(content);
                    actions.push(StreamAction::TextDelta {
                        choice: choice_index,
                        delta: content.clone(),
                    });
                }
            }

            if let Some(refusal) = &choice.delta.refusal {
                if !refusal.is_empty() {
                    guard_size(state.refusal.len(), refusal.len())?;
                    state.refusal.push_str(refusal);
                    actions.push(StreamAction::RefusalDelta {
                        choice: choice_index,
                        delta: refusal.clone(),
                    });
                }
            }

            if let Some(reasoning) = &choice.delta.reasoning {
                if !reasoning.is_empty() {
                    guard_size(state.reasoning.len(), reasoning.len())?;
                    state.reasoning.push_str(reasoning);
                    actions.push(StreamAction::ReasoningDelta {
                        choice: choice_index,
                        delta: reasoning.clone(),
                    });
                }
            }

            if let Some(tool_deltas) = &choice.delta.tool_calls {
                for (position, delta) in tool_deltas.iter().enumerate() {
                    let call_index = delta.index.unwrap_or(position as u32);
                    if call_index > MAX_TOOL_CALL_INDEX {
                        return Err(GatewayError::Streaming(format!(
                            "tool call index {} exceeds limit",
                            call_index
                        )));
                    }

                    let name = delta
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default();
                    let fragment = delta
                        .function
                        .as_ref()
                        .and_then(|f| f.arguments.clone())
                        .unwrap_or_default();

                    match state.tool_calls.get_mut(&call_index) {
                        Some(call) => {
                            if !fragment.is_empty() {
                                guard_size(call.arguments.len(), fragment.len())?;
                                call.arguments.push_str(&fragment);
                                actions.push(StreamAction::ToolCallArgsDelta {
                                    choice: choice_index,
                                    index: call_index,
                                    delta: fragment,
                                });
                            }
                        }
                        None => {
                            let id = delta
                                .id
                                .clone()
                                .unwrap_or_else(|| generate_id("call"));
                            let call = ToolCallState {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: fragment.clone(),
                                order: self.next_call_order,
                            };
                            self.next_call_order += 1;
                            state.tool_calls.insert(call_index, call);
                            actions.push(StreamAction::ToolCallStarted {
                                choice: choice_index,
                                index: call_index,
                                id,
                                name,
                            });
                            if !fragment.is_empty() {
                                actions.push(StreamAction::ToolCallArgsDelta {
                                    choice: choice_index,
                                    index: call_index,
                                    delta: fragment,
                                });
                            }
                        }
                    }
                }
            }

            // Legacy single-call form folds as index 0.
            if let Some(legacy) = &choice.delta.function_call {
                let call_index = 0u32;
                match state.tool_calls.get_mut(&call_index) {
                    Some(call) => {
                        if let Some(fragment) = &legacy.arguments {
                            if !fragment.is_empty() {
                                guard_size(call.arguments.len(), fragment.len())?;
                                call.arguments.push_str(fragment);
                                actions.push(StreamAction::ToolCallArgsDelta {
                                    choice: choice_index,
                                    index: call_index,
                                    delta: fragment.clone(),
                                });
                            }
                        }
                    }
                    None => {
                        let id = generate_id("call");
                        let name = legacy.name.clone().unwrap_or_default();
                        let arguments = legacy.arguments.clone().unwrap_or_default();
                        state.tool_calls.insert(
                            call_index,
                            ToolCallState {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: arguments.clone(),
                                order: self.next_call_order,
                            },
                        );
                        self.next_call_order += 1;
                        actions.push(StreamAction::ToolCallStarted {
                            choice: choice_index,
                            index: call_index,
                            id,
                            name,
                        });
                        if !arguments.is_empty() {
                            actions.push(StreamAction::ToolCallArgsDelta {
                                choice: choice_index,
                                index: call_index,
                                delta: arguments,
                            });
                        }
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                state.finish = Some(reason);
                actions.push(StreamAction::ChoiceFinished {
                    choice: choice_index,
                    reason,
                });
            }
        }

        Ok(actions)
    }

    /// All seen choices reached a terminal finish reason.
    pub fn is_terminal(&self) -> bool {
        !self.choices.is_empty() && self.choices.values().all(|c| c.finish.is_some())
    }

    /// Assemble the turn snapshot. Tool calls come out in first-seen order;
    /// calls whose arguments fail to parse are flagged, not dropped.
    pub fn turn(&self) -> TurnSummary {
        let primary = self.choices.get(&0);

        let mut ordered: Vec<(usize, CompletedToolCall)> = self
            .choices
            .iter()
            .flat_map(|(choice_index, state)| {
                state.tool_calls.iter().map(|(call_index, call)| {
                    let arguments = if call.arguments.is_empty() {
                        "{}".to_string()
                    } else {
                        call.arguments.clone()
                    };
                    let arguments_valid = serde_json::from_str::<Value>(&arguments).is_ok();
                    (
                        call.order,
                        CompletedToolCall {
                            choice: *choice_index,
                            index: *call_index,
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments,
                            arguments_valid,
                        },
                    )
                })
            })
            .collect();
        // First-seen order, end to end.
        ordered.sort_by_key(|(order, _)| *order);
        let tool_calls: Vec<CompletedToolCall> =
            ordered.into_iter().map(|(_, call)| call).collect();

        TurnSummary {
            text: primary.map(|c| c.text.clone()).unwrap_or_default(),
            refusal: primary
                .map(|c| c.refusal.clone())
                .filter(|r| !r.is_empty()),
            reasoning: primary
                .map(|c| c.reasoning.clone())
                .filter(|r| !r.is_empty()),
            tool_calls,
            finish_reason: primary.and_then(|c| c.finish),
            usage: self.usage,
        }
    }
}

fn guard_size(current: usize, addition: usize) -> GatewayResult<()> {
    if current + addition > MAX_BLOCK_ACCUMULATION_SIZE {
        Err(GatewayError::Streaming(
            "accumulated block exceeds size limit".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openai_protocol::chat::{ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta};

    fn text_chunk(choice: u32, content: &str, finish: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: None,
            object: None,
            created: None,
            model: None,
            choices: vec![ChunkChoice {
                index: choice,
                delta: ChunkDelta {
                    content: Some(content.to_string()),
                    ..ChunkDelta::default()
                },
                finish_reason: finish,
            }],
            usage: None,
        }
    }

    fn tool_chunk(deltas: Vec<ToolCallDelta>, finish: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: None,
            object: None,
            created: None,
            model: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    tool_calls: Some(deltas),
                    ..ChunkDelta::default()
                },
                finish_reason: finish,
            }],
            usage: None,
        }
    }

    fn call_delta(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index: Some(index),
            id: id.map(str::to_string),
            call_type: id.map(|_| "function".to_string()),
            function: Some(FunctionCallDelta {
                name: name.map(str::to_string),
                arguments: Some(args.to_string()),
            }),
        }
    }

    #[test]
    fn text_deltas_extend_the_buffer() {
        let mut acc = ChunkAccumulator::new();
        acc.fold(&text_chunk(0, "Hel", None)).unwrap();
        acc.fold(&text_chunk(0, "lo", Some(FinishReason::Stop)))
            .unwrap();

        assert!(acc.is_terminal());
        let turn = acc.turn();
        assert_eq!(turn.text, "Hello");
        assert_eq!(turn.finish_reason, Some(FinishReason::Stop));
        assert!(turn.tool_calls.is_empty());
        assert!(!turn.requests_tools());
    }

    #[test]
    fn interleaved_tool_deltas_key_by_index_not_position() {
        let mut acc = ChunkAccumulator::new();
        acc.fold(&tool_chunk(
            vec![
                call_delta(0, Some("c0"), Some("get_weather"), "{\"city\":"),
                call_delta(1, Some("c1"), Some("get_time"), "{\"zone\":"),
            ],
            None,
        ))
        .unwrap();
        // Later chunk lists index 1 first; fragments must still land right.
        acc.fold(&tool_chunk(
            vec![
                call_delta(1, None, None, "\"UTC\"}"),
                call_delta(0, None, None, "\"Paris\"}"),
            ],
            Some(FinishReason::ToolCalls),
        ))
        .unwrap();

        let turn = acc.turn();
        assert!(turn.requests_tools());
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].id, "c0");
        assert_eq!(turn.tool_calls[0].arguments, "{\"city\":\"Paris\"}");
        assert!(turn.tool_calls[0].arguments_valid);
        assert_eq!(turn.tool_calls[1].id, "c1");
        assert_eq!(turn.tool_calls[1].arguments, "{\"zone\":\"UTC\"}");
    }

    #[test]
    fn invalid_arguments_are_flagged_not_dropped() {
        let mut acc = ChunkAccumulator::new();
        acc.fold(&tool_chunk(
            vec![call_delta(0, Some("c0"), Some("broken"), "{not json")],
            Some(FinishReason::ToolCalls),
        ))
        .unwrap();

        let turn = acc.turn();
        assert_eq!(turn.tool_calls.len(), 1);
        assert!(!turn.tool_calls[0].arguments_valid);
    }

    #[test]
    fn legacy_function_call_form_folds_as_index_zero() {
        let mut acc = ChunkAccumulator::new();
        let chunk = ChatCompletionChunk {
            id: None,
            object: None,
            created: None,
            model: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    function_call: Some(FunctionCallDelta {
                        name: Some("lookup".to_string()),
                        arguments: Some("{\"q\":1}".to_string()),
                    }),
                    ..ChunkDelta::default()
                },
                finish_reason: Some(FinishReason::FunctionCall),
            }],
            usage: None,
        };
        acc.fold(&chunk).unwrap();

        let turn = acc.turn();
        assert!(turn.requests_tools());
        assert_eq!(turn.tool_calls[0].index, 0);
        assert_eq!(turn.tool_calls[0].name, "lookup");
        assert!(turn.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn empty_arguments_default_to_empty_object() {
        let mut acc = ChunkAccumulator::new();
        acc.fold(&tool_chunk(
            vec![call_delta(0, Some("c0"), Some("noop"), "")],
            Some(FinishReason::ToolCalls),
        ))
        .unwrap();

        let turn = acc.turn();
        assert_eq!(turn.tool_calls[0].arguments, "{}");
        assert!(turn.tool_calls[0].arguments_valid);
    }

    #[test]
    fn usage_from_final_chunk_is_kept() {
        let mut acc = ChunkAccumulator::new();
        acc.fold(&text_chunk(0, "hi", Some(FinishReason::Stop)))
            .unwrap();
        let mut final_chunk = text_chunk(0, "", None);
        final_chunk.choices.clear();
        final_chunk.usage = Some(ChatUsage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        });
        acc.fold(&final_chunk).unwrap();

        assert_eq!(acc.turn().usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn actions_preserve_arrival_order() {
        let mut acc = ChunkAccumulator::new();
        let actions = acc
            .fold(&tool_chunk(
                vec![call_delta(0, Some("c0"), Some("t"), "{")],
                None,
            ))
            .unwrap();
        assert!(matches!(actions[0], StreamAction::ToolCallStarted { .. }));
        assert!(matches!(
            actions[1],
            StreamAction::ToolCallArgsDelta { .. }
        ));
    }
}
