use std::collections::HashMap;

use omnigate_protocol::openai_chat::{
    ChatChunk, ChatRole, ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta,
};
use omnigate_protocol::openai_responses::{ResponseObject, ResponsesStreamEvent};

use super::response::{chat_usage, finish_reason};
use crate::error::{TransformError, TransformResult};
use crate::generate_content::{new_id, now_unix};

/// Turns Responses API stream events into hub chunks.
#[derive(Debug, Default)]
pub struct ResponsesToChatStream {
    id: String,
    model: String,
    created: i64,
    started: bool,
    finished: bool,
    /// output_index -> tool call index
    tools: HashMap<u32, u32>,
}

impl ResponsesToChatStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ResponsesStreamEvent) -> TransformResult<Vec<ChatChunk>> {
        let mut out = Vec::new();
        if self.finished {
            return Ok(out);
        }
        match event {
            ResponsesStreamEvent::Created { response, .. }
            | ResponsesStreamEvent::InProgress { response, .. } => {
                if !response.id.is_empty() {
                    self.id = response.id;
                }
                if !response.model.is_empty() {
                    self.model = response.model;
                }
                if response.created_at > 0 {
                    self.created = response.created_at;
                }
                self.ensure_started(&mut out);
            }
            ResponsesStreamEvent::OutputItemAdded {
                output_index, item, ..
            } if item.kind == "function_call" => {
                self.ensure_started(&mut out);
                let index = self.tools.len() as u32;
                self.tools.insert(output_index, index);
                out.push(self.chunk(ChunkDelta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: Some(item.call_id.or(item.id).unwrap_or_else(|| new_id("call_"))),
                        kind: Some("function".to_string()),
                        function: Some(FunctionCallDelta {
                            name: item.name,
                            arguments: Some(item.arguments.unwrap_or_default()),
                        }),
                    }]),
                    ..ChunkDelta::default()
                }));
            }
            ResponsesStreamEvent::OutputTextDelta { delta, .. } => {
                self.ensure_started(&mut out);
                out.push(self.chunk(ChunkDelta {
                    content: Some(delta),
                    ..ChunkDelta::default()
                }));
            }
            ResponsesStreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
                self.ensure_started(&mut out);
                out.push(self.chunk(ChunkDelta {
                    reasoning_content: Some(delta),
                    ..ChunkDelta::default()
                }));
            }
            ResponsesStreamEvent::FunctionCallArgumentsDelta {
                output_index, delta, ..
            } => {
                if let Some(index) = self.tools.get(&output_index).copied() {
                    out.push(self.chunk(ChunkDelta {
                        tool_calls: Some(vec![ToolCallDelta {
                            index,
                            id: None,
                            kind: None,
                            function: Some(FunctionCallDelta {
                                name: None,
                                arguments: Some(delta),
                            }),
                        }]),
                        ..ChunkDelta::default()
                    }));
                }
            }
            ResponsesStreamEvent::Completed { response, .. }
            | ResponsesStreamEvent::Incomplete { response, .. } => {
                self.ensure_started(&mut out);
                out.push(self.final_chunk(&response));
                self.finished = true;
            }
            ResponsesStreamEvent::Failed { response, .. } => {
                let message = response
                    .error
                    .as_ref()
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("response failed")
                    .to_string();
                return Err(TransformError::UpstreamStream(message));
            }
            ResponsesStreamEvent::Error { message, .. } => {
                return Err(TransformError::UpstreamStream(message));
            }
            _ => {}
        }
        Ok(out)
    }

    pub fn finish(&mut self) -> Vec<ChatChunk> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;
        let mut last = self.chunk(ChunkDelta::default());
        last.choices[0].finish_reason =
            Some(if self.tools.is_empty() { "stop" } else { "tool_calls" }.to_string());
        vec![last]
    }

    fn final_chunk(&self, response: &ResponseObject) -> ChatChunk {
        let mut last = self.chunk(ChunkDelta::default());
        let reason = finish_reason(
            &response.status,
            response.incomplete_details.as_ref(),
            !self.tools.is_empty(),
        );
        last.choices[0].finish_reason = Some(reason.to_string());
        last.usage = response.usage.map(chat_usage);
        last
    }

    fn ensure_started(&mut self, out: &mut Vec<ChatChunk>) {
        if self.started {
            return;
        }
        self.started = true;
        if self.id.is_empty() {
            self.id = new_id("chatcmpl-");
        }
        if self.created == 0 {
            self.created = now_unix();
        }
        out.push(self.chunk(ChunkDelta {
            role: Some(ChatRole::Assistant),
            content: Some(String::new()),
            ..ChunkDelta::default()
        }));
    }

    fn chunk(&self, delta: ChunkDelta) -> ChatChunk {
        ChatChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }
}
