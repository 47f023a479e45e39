//! Responses-API SSE event emission.
//!
//! Translates accumulator actions into the ordered event sequence. Every
//! event carries a monotonically increasing `sequence_number`; output
//! indexes are allocated in first-seen order; for any item the subsequence
//! of its events is `added (delta)* done`; exactly one terminal event ends
//! the stream and nothing follows it.

use std::collections::HashMap;

use bytes::Bytes;
use openai_protocol::{
    event_types::{
        ContentPartEvent, FunctionCallEvent, OutputItemEvent, OutputTextEvent, RefusalEvent,
        ResponseEvent,
    },
    responses::{generate_id, OutputContent, OutputItem, Response},
};
use serde_json::{json, Value};

/// One SSE record ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

impl SseEvent {
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }

    /// The `[DONE]` sentinel written after chat-completion streams only.
    pub fn done_sentinel() -> Bytes {
        Bytes::from_static(b"data: [DONE]\n\n")
    }

    /// A chat-completion chunk line (`data: {json}`), no event name.
    pub fn chat_data(data: &Value) -> Bytes {
        Bytes::from(format!("data: {}\n\n", data))
    }
}

#[derive(Debug)]
struct OpenMessageItem {
    id: String,
    output_index: usize,
    text: String,
    refusal: String,
    part_added: bool,
    refusal_part_added: bool,
}

#[derive(Debug)]
struct OpenToolItem {
    id: String,
    output_index: usize,
    call_id: String,
    name: String,
    arguments: String,
}

pub struct EventEmitter {
    sequence: u64,
    next_output_index: usize,
    message_items: HashMap<u32, OpenMessageItem>,
    tool_items: HashMap<(u32, u32), OpenToolItem>,
    completed_items: Vec<(usize, OutputItem)>,
    terminal_sent: bool,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            next_output_index: 0,
            message_items: HashMap::new(),
            tool_items: HashMap::new(),
            completed_items: Vec::new(),
            terminal_sent: false,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    fn event(&mut self, event_type: &str, mut data: Value) -> SseEvent {
        let seq = self.next_seq();
        if let Some(obj) = data.as_object_mut() {
            obj.insert("type".to_string(), json!(event_type));
            obj.insert("sequence_number".to_string(), json!(seq));
        }
        SseEvent {
            event: event_type.to_string(),
            data,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn created(&mut self, response: &Response) -> SseEvent {
        self.event(ResponseEvent::CREATED, json!({ "response": response }))
    }

    pub fn in_progress(&mut self, response: &Response) -> SseEvent {
        self.event(ResponseEvent::IN_PROGRESS, json!({ "response": response }))
    }

    pub fn completed(&mut self, response: &Response) -> Option<SseEvent> {
        self.terminal(ResponseEvent::COMPLETED, response)
    }

    pub fn failed(&mut self, response: &Response) -> Option<SseEvent> {
        self.terminal(ResponseEvent::FAILED, response)
    }

    pub fn incomplete(&mut self, response: &Response) -> Option<SseEvent> {
        self.terminal(ResponseEvent::INCOMPLETE, response)
    }

    fn terminal(&mut self, event_type: &str, response: &Response) -> Option<SseEvent> {
        if self.terminal_sent {
            return None;
        }
        self.terminal_sent = true;
        Some(self.event(event_type, json!({ "response": response })))
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_sent
    }

    // ------------------------------------------------------------------
    // Streaming item events
    // ------------------------------------------------------------------

    pub fn on_action(&mut self, action: &crate::accumulator::StreamAction) -> Vec<SseEvent> {
        use crate::accumulator::StreamAction;

        if self.terminal_sent {
            return Vec::new();
        }

        match action {
            StreamAction::TextDelta { choice, delta } => self.text_delta(*choice, delta),
            StreamAction::RefusalDelta { choice, delta } => self.refusal_delta(*choice, delta),
            // Reasoning deltas fold into the final reasoning item only.
            StreamAction::ReasoningDelta { .. } => Vec::new(),
            StreamAction::ToolCallStarted {
                choice,
                index,
                id,
                name,
            } => self.tool_call_started(*choice, *index, id, name),
            StreamAction::ToolCallArgsDelta {
                choice,
                index,
                delta,
            } => self.tool_args_delta(*choice, *index, delta),
            StreamAction::ChoiceFinished { choice, .. } => self.finish_choice(*choice),
        }
    }

    fn text_delta(&mut self, choice: u32, delta: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.message_items.contains_key(&choice) {
            events.extend(self.open_message_item(choice));
        }
        let item = self.message_items.get_mut(&choice).expect("item opened");
        item.text.push_str(delta);
        let (item_id, output_index) = (item.id.clone(), item.output_index);
        if !self.message_items[&choice].part_added {
            let part_event = self.event(
                ContentPartEvent::ADDED,
                json!({
                    "item_id": item_id,
                    "output_index": output_index,
                    "content_index": 0,
                    "part": {"type": "output_text", "text": "", "annotations": []}
                }),
            );
            events.push(part_event);
            self.message_items
                .get_mut(&choice)
                .expect("item opened")
                .part_added = true;
        }
        events.push(self.event(
            OutputTextEvent::DELTA,
            json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": 0,
                "delta": delta
            }),
        ));
        events
    }

    fn refusal_delta(&mut self, choice: u32, delta: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.message_items.contains_key(&choice) {
            events.extend(self.open_message_item(choice));
        }
        let item = self.message_items.get_mut(&choice).expect("item opened");
        item.refusal.push_str(delta);
        let (item_id, output_index) = (item.id.clone(), item.output_index);
        if !self.message_items[&choice].refusal_part_added {
            let part_event = self.event(
                ContentPartEvent::ADDED,
                json!({
                    "item_id": item_id,
                    "output_index": output_index,
                    "content_index": 0,
                    "part": {"type": "refusal", "refusal": ""}
                }),
            );
            events.push(part_event);
            self.message_items
                .get_mut(&choice)
                .expect("item opened")
                .refusal_part_added = true;
        }
        events.push(self.event(
            RefusalEvent::DELTA,
            json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": 0,
                "delta": delta
            }),
        ));
        events
    }

    fn open_message_item(&mut self, choice: u32) -> Vec<SseEvent> {
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        let id = generate_id("msg");
        let added = self.event(
            OutputItemEvent::ADDED,
            json!({
                "output_index": output_index,
                "item": {
                    "type": "message",
                    "id": id,
                    "role": "assistant",
                    "status": "in_progress",
                    "content": []
                }
            }),
        );
        self.message_items.insert(
            choice,
            OpenMessageItem {
                id,
                output_index,
                text: String::new(),
                refusal: String::new(),
                part_added: false,
                refusal_part_added: false,
            },
        );
        vec![added]
    }

    fn tool_call_started(&mut self, choice: u32, index: u32, call_id: &str, name: &str) -> Vec<SseEvent> {
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        let id = generate_id("fc");
        let added = self.event(
            OutputItemEvent::ADDED,
            json!({
                "output_index": output_index,
                "item": {
                    "type": "function_call",
                    "id": id,
                    "call_id": call_id,
                    "name": name,
                    "arguments": "",
                    "status": "in_progress"
                }
            }),
        );
        self.tool_items.insert(
            (choice, index),
            OpenToolItem {
                id,
                output_index,
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: String::new(),
            },
        );
        vec![added]
    }

    fn tool_args_delta(&mut self, choice: u32, index: u32, delta: &str) -> Vec<SseEvent> {
        let Some(item) = self.tool_items.get_mut(&(choice, index)) else {
            return Vec::new();
        };
        item.arguments.push_str(delta);
        let (item_id, output_index) = (item.id.clone(), item.output_index);
        vec![self.event(
            FunctionCallEvent::ARGUMENTS_DELTA,
            json!({
                "item_id": item_id,
                "output_index": output_index,
                "delta": delta
            }),
        )]
    }

    /// Close every open item for the choice: text parts first, then tool
    /// calls in call-index order.
    fn finish_choice(&mut self, choice: u32) -> Vec<SseEvent> {
        let mut events = Vec::new();

        if let Some(item) = self.message_items.remove(&choice) {
            let mut content = Vec::new();
            if item.part_added {
                events.push(self.event(
                    OutputTextEvent::DONE,
                    json!({
                        "item_id": item.id,
                        "output_index": item.output_index,
                        "content_index": 0,
                        "text": item.text
                    }),
                ));
                events.push(self.event(
                    ContentPartEvent::DONE,
                    json!({
                        "item_id": item.id,
                        "output_index": item.output_index,
                        "content_index": 0,
                        "part": {"type": "output_text", "text": item.text, "annotations": []}
                    }),
                ));
                content.push(OutputContent::OutputText {
                    text: item.text.clone(),
                    annotations: vec![],
                });
            }
            if item.refusal_part_added {
                events.push(self.event(
                    RefusalEvent::DONE,
                    json!({
                        "item_id": item.id,
                        "output_index": item.output_index,
                        "content_index": 0,
                        "refusal": item.refusal
                    }),
                ));
                content.push(OutputContent::Refusal {
                    refusal: item.refusal.clone(),
                });
            }
            let done_item = OutputItem::Message {
                id: item.id.clone(),
                role: "assistant".to_string(),
                status: "completed".to_string(),
                content,
            };
            events.push(self.event(
                OutputItemEvent::DONE,
                json!({
                    "output_index": item.output_index,
                    "item": done_item
                }),
            ));
            self.completed_items.push((item.output_index, done_item));
        }

        let mut tool_keys: Vec<(u32, u32)> = self
            .tool_items
            .keys()
            .filter(|(c, _)| *c == choice)
            .copied()
            .collect();
        tool_keys.sort();
        for key in tool_keys {
            let item = self.tool_items.remove(&key).expect("key exists");
            events.push(self.event(
                FunctionCallEvent::ARGUMENTS_DONE,
                json!({
                    "item_id": item.id,
                    "output_index": item.output_index,
                    "arguments": item.arguments
                }),
            ));
            let done_item = OutputItem::FunctionCall {
                id: item.id.clone(),
                call_id: item.call_id.clone(),
                name: item.name.clone(),
                arguments: item.arguments.clone(),
                status: "completed".to_string(),
            };
            events.push(self.event(
                OutputItemEvent::DONE,
                json!({
                    "output_index": item.output_index,
                    "item": done_item
                }),
            ));
            self.completed_items.push((item.output_index, done_item));
        }

        events
    }

    /// Items completed so far, in output-index order. The final Response
    /// carries exactly these.
    pub fn completed_items(&self) -> Vec<OutputItem> {
        let mut items = self.completed_items.clone();
        items.sort_by_key(|(index, _)| *index);
        items.into_iter().map(|(_, item)| item).collect()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
