use std::collections::BTreeMap;

use omnigate_protocol::openai_chat::{ChatChunk, ChatUsage};
use omnigate_protocol::openai_responses::{
    OutputItem, ResponseObject, ResponsesPart, ResponsesStreamEvent,
};

use super::response::{
    function_call_item, message_item, reasoning_item, response_id, response_object,
};
use crate::generate_content::{new_id, now_unix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Reasoning,
    Message,
}

#[derive(Debug)]
struct OpenText {
    kind: TextKind,
    output_index: u32,
    item_id: String,
    text: String,
}

#[derive(Debug)]
struct OpenCall {
    output_index: u32,
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Re-encodes hub chunks as Responses API stream events.
///
/// Every emitted event carries a strictly increasing `sequence_number`.
#[derive(Debug, Default)]
pub struct ChatToResponsesStream {
    id: String,
    model: String,
    created_at: i64,
    sequence: u64,
    started: bool,
    finished: bool,
    next_output: u32,
    text: Option<OpenText>,
    calls: BTreeMap<u32, OpenCall>,
    done: Vec<(u32, OutputItem)>,
    finish_reason: Option<String>,
    usage: Option<ChatUsage>,
}

impl ChatToResponsesStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: ChatChunk) -> Vec<ResponsesStreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if !self.started {
            self.id = response_id(&chunk.id);
            self.model = chunk.model.clone();
            self.created_at = if chunk.created > 0 { chunk.created } else { now_unix() };
            self.started = true;
            let snapshot = self.snapshot("in_progress");
            self.emit(&mut out, ResponsesStreamEvent::Created {
                response: snapshot.clone(),
                sequence_number: None,
            });
            self.emit(&mut out, ResponsesStreamEvent::InProgress {
                response: snapshot,
                sequence_number: None,
            });
        }

        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                self.text_delta(&mut out, TextKind::Reasoning, reasoning);
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                self.text_delta(&mut out, TextKind::Message, text);
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let function = call.function.unwrap_or_default();
                if !self.calls.contains_key(&call.index) {
                    self.close_text(&mut out);
                    let open = OpenCall {
                        output_index: self.next_output,
                        item_id: new_id("fc_"),
                        call_id: call.id.unwrap_or_else(|| new_id("call_")),
                        name: function.name.clone().unwrap_or_default(),
                        arguments: String::new(),
                    };
                    self.next_output += 1;
                    let item = function_call_item(
                        open.item_id.clone(),
                        open.call_id.clone(),
                        open.name.clone(),
                        String::new(),
                        "in_progress",
                    );
                    self.emit(&mut out, ResponsesStreamEvent::OutputItemAdded {
                        output_index: open.output_index,
                        item,
                        sequence_number: None,
                    });
                    self.calls.insert(call.index, open);
                }
                if let Some(arguments) = function.arguments.filter(|a| !a.is_empty())
                    && let Some(open) = self.calls.get_mut(&call.index)
                {
                    open.arguments.push_str(&arguments);
                    let event = ResponsesStreamEvent::FunctionCallArgumentsDelta {
                        item_id: open.item_id.clone(),
                        output_index: open.output_index,
                        delta: arguments,
                        sequence_number: None,
                    };
                    self.emit(&mut out, event);
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<ResponsesStreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if !self.started {
            out.extend(self.push(ChatChunk::default()));
        }
        self.close_text(&mut out);
        for (_, call) in std::mem::take(&mut self.calls) {
            self.emit(&mut out, ResponsesStreamEvent::FunctionCallArgumentsDone {
                item_id: call.item_id.clone(),
                output_index: call.output_index,
                arguments: call.arguments.clone(),
                sequence_number: None,
            });
            let item = function_call_item(call.item_id, call.call_id, call.name, call.arguments, "completed");
            self.emit(&mut out, ResponsesStreamEvent::OutputItemDone {
                output_index: call.output_index,
                item: item.clone(),
                sequence_number: None,
            });
            self.done.push((call.output_index, item));
        }

        self.done.sort_by_key(|(index, _)| *index);
        let output = self.done.iter().map(|(_, item)| item.clone()).collect();
        let response = response_object(
            self.id.clone(),
            self.model.clone(),
            self.created_at,
            self.finish_reason.as_deref(),
            output,
            self.usage,
        );
        let event = if response.status == "incomplete" {
            ResponsesStreamEvent::Incomplete {
                response,
                sequence_number: None,
            }
        } else {
            ResponsesStreamEvent::Completed {
                response,
                sequence_number: None,
            }
        };
        self.emit(&mut out, event);
        self.finished = true;
        out
    }

    fn text_delta(&mut self, out: &mut Vec<ResponsesStreamEvent>, kind: TextKind, delta: String) {
        if self.text.as_ref().is_none_or(|open| open.kind != kind) {
            self.close_text(out);
            self.open_text(out, kind);
        }
        let Some(open) = self.text.as_mut() else {
            return;
        };
        open.text.push_str(&delta);
        let event = match kind {
            TextKind::Reasoning => ResponsesStreamEvent::ReasoningSummaryTextDelta {
                item_id: open.item_id.clone(),
                output_index: open.output_index,
                summary_index: 0,
                delta,
                sequence_number: None,
            },
            TextKind::Message => ResponsesStreamEvent::OutputTextDelta {
                item_id: open.item_id.clone(),
                output_index: open.output_index,
                content_index: 0,
                delta,
                sequence_number: None,
            },
        };
        self.emit(out, event);
    }

    fn open_text(&mut self, out: &mut Vec<ResponsesStreamEvent>, kind: TextKind) {
        let output_index = self.next_output;
        self.next_output += 1;
        let (item_id, item) = match kind {
            TextKind::Reasoning => {
                let id = new_id("rs_");
                (id.clone(), reasoning_item(id, String::new()))
            }
            TextKind::Message => {
                let id = new_id("msg_");
                (id.clone(), message_item(id, String::new(), "in_progress"))
            }
        };
        self.emit(out, ResponsesStreamEvent::OutputItemAdded {
            output_index,
            item,
            sequence_number: None,
        });
        if kind == TextKind::Message {
            self.emit(out, ResponsesStreamEvent::ContentPartAdded {
                item_id: item_id.clone(),
                output_index,
                content_index: 0,
                part: ResponsesPart::output_text(""),
                sequence_number: None,
            });
        }
        self.text = Some(OpenText {
            kind,
            output_index,
            item_id,
            text: String::new(),
        });
    }

    fn close_text(&mut self, out: &mut Vec<ResponsesStreamEvent>) {
        let Some(open) = self.text.take() else {
            return;
        };
        let item = match open.kind {
            TextKind::Reasoning => reasoning_item(open.item_id.clone(), open.text),
            TextKind::Message => {
                self.emit(out, ResponsesStreamEvent::OutputTextDone {
                    item_id: open.item_id.clone(),
                    output_index: open.output_index,
                    content_index: 0,
                    text: open.text.clone(),
                    sequence_number: None,
                });
                self.emit(out, ResponsesStreamEvent::ContentPartDone {
                    item_id: open.item_id.clone(),
                    output_index: open.output_index,
                    content_index: 0,
                    part: ResponsesPart::output_text(open.text.clone()),
                    sequence_number: None,
                });
                message_item(open.item_id.clone(), open.text, "completed")
            }
        };
        self.emit(out, ResponsesStreamEvent::OutputItemDone {
            output_index: open.output_index,
            item: item.clone(),
            sequence_number: None,
        });
        self.done.push((open.output_index, item));
    }

    fn snapshot(&self, status: &str) -> ResponseObject {
        let mut response = response_object(
            self.id.clone(),
            self.model.clone(),
            self.created_at,
            None,
            Vec::new(),
            None,
        );
        response.status = status.to_string();
        response
    }

    fn emit(&mut self, out: &mut Vec<ResponsesStreamEvent>, mut event: ResponsesStreamEvent) {
        event.set_sequence_number(self.sequence);
        self.sequence += 1;
        out.push(event);
    }
}
