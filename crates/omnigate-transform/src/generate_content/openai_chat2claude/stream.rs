use std::collections::HashMap;

use omnigate_protocol::claude::{BlockDelta, ClaudeStreamEvent, ContentBlock};
use omnigate_protocol::openai_chat::{
    ChatChunk, ChatRole, ChatUsage, ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta,
};

use crate::error::{TransformError, TransformResult};
use crate::generate_content::{finish, new_id, now_unix};

/// Turns Anthropic stream events into hub chunks.
#[derive(Debug, Default)]
pub struct ClaudeToChatStream {
    id: String,
    model: String,
    created: i64,
    started: bool,
    finished: bool,
    prompt_tokens: u64,
    /// content block index -> tool call index
    tools: HashMap<u32, u32>,
}

impl ClaudeToChatStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ClaudeStreamEvent) -> TransformResult<Vec<ChatChunk>> {
        let mut out = Vec::new();
        if self.finished {
            return Ok(out);
        }
        match event {
            ClaudeStreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.prompt_tokens = message.usage.input_tokens
                    + message.usage.cache_read_input_tokens.unwrap_or(0)
                    + message.usage.cache_creation_input_tokens.unwrap_or(0);
                self.ensure_started(&mut out);
            }
            ClaudeStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.ensure_started(&mut out);
                match content_block {
                    ContentBlock::ToolUse { id, name, .. } => {
                        let tool_index = self.tools.len() as u32;
                        self.tools.insert(index, tool_index);
                        out.push(self.chunk(ChunkDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: tool_index,
                                id: Some(id),
                                kind: Some("function".to_string()),
                                function: Some(FunctionCallDelta {
                                    name: Some(name),
                                    arguments: Some(String::new()),
                                }),
                            }]),
                            ..ChunkDelta::default()
                        }));
                    }
                    ContentBlock::Text { text, .. } if !text.is_empty() => {
                        out.push(self.chunk(ChunkDelta {
                            content: Some(text),
                            ..ChunkDelta::default()
                        }));
                    }
                    _ => {}
                }
            }
            ClaudeStreamEvent::ContentBlockDelta { index, delta } => {
                self.ensure_started(&mut out);
                let delta = match delta {
                    BlockDelta::TextDelta { text } => Some(ChunkDelta {
                        content: Some(text),
                        ..ChunkDelta::default()
                    }),
                    BlockDelta::ThinkingDelta { thinking } => Some(ChunkDelta {
                        reasoning_content: Some(thinking),
                        ..ChunkDelta::default()
                    }),
                    BlockDelta::InputJsonDelta { partial_json } => {
                        self.tools.get(&index).map(|tool_index| ChunkDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index: *tool_index,
                                id: None,
                                kind: None,
                                function: Some(FunctionCallDelta {
                                    name: None,
                                    arguments: Some(partial_json),
                                }),
                            }]),
                            ..ChunkDelta::default()
                        })
                    }
                    BlockDelta::SignatureDelta { .. } | BlockDelta::Other => None,
                };
                if let Some(delta) = delta {
                    out.push(self.chunk(delta));
                }
            }
            ClaudeStreamEvent::MessageDelta { delta, usage } => {
                self.ensure_started(&mut out);
                let reason = finish::from_claude(delta.stop_reason.as_deref().unwrap_or("end_turn"));
                let completion = usage.map(|u| u.output_tokens).unwrap_or(0);
                let mut chunk = self.chunk(ChunkDelta::default());
                chunk.choices[0].finish_reason = Some(reason.to_string());
                chunk.usage = Some(ChatUsage::new(self.prompt_tokens, completion));
                out.push(chunk);
                self.finished = true;
            }
            ClaudeStreamEvent::Error { error } => {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(TransformError::UpstreamStream(message));
            }
            ClaudeStreamEvent::ContentBlockStop { .. }
            | ClaudeStreamEvent::MessageStop
            | ClaudeStreamEvent::Ping => {}
        }
        Ok(out)
    }

    /// Emit a closing chunk when the upstream ended without `message_delta`.
    pub fn finish(&mut self) -> Vec<ChatChunk> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;
        let mut chunk = self.chunk(ChunkDelta::default());
        chunk.choices[0].finish_reason = Some("stop".to_string());
        vec![chunk]
    }

    fn ensure_started(&mut self, out: &mut Vec<ChatChunk>) {
        if self.started {
            return;
        }
        self.started = true;
        if self.id.is_empty() {
            self.id = new_id("chatcmpl-");
        }
        self.created = now_unix();
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn event(value: Value) -> ClaudeStreamEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn tool_use_stream_maps_to_tool_call_deltas() {
        let mut stream = ClaudeToChatStream::new();
        let mut chunks = Vec::new();
        for value in [
            json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude", "usage": {"input_tokens": 7}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "ok"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "f", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"a\":"}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "1}"}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 3}}),
            json!({"type": "message_stop"}),
        ] {
            chunks.extend(stream.push(event(value)).unwrap());
        }
        assert!(stream.finish().is_empty());

        assert_eq!(chunks[0].choices[0].delta.role, Some(ChatRole::Assistant));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("ok"));
        let start = &chunks[2].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(start.id.as_deref(), Some("toolu_1"));
        let args: String = chunks[3..5]
            .iter()
            .map(|c| {
                c.choices[0].delta.tool_calls.as_ref().unwrap()[0]
                    .function
                    .as_ref()
                    .unwrap()
                    .arguments
                    .clone()
                    .unwrap()
            })
            .collect();
        assert_eq!(args, "{\"a\":1}");
        let last = chunks.last().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(last.usage.unwrap().total_tokens, 10);
    }

    #[test]
    fn error_event_fails_the_stream() {
        let mut stream = ClaudeToChatStream::new();
        let err = stream
            .push(event(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})))
            .unwrap_err();
        assert_eq!(err, TransformError::UpstreamStream("Overloaded".to_string()));
    }

    #[test]
    fn truncated_stream_gets_a_finish_chunk() {
        let mut stream = ClaudeToChatStream::new();
        stream
            .push(event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "par"}})))
            .unwrap();
        let tail = stream.finish();
        assert_eq!(tail[0].choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(stream.finish().is_empty());
    }
}
