use std::collections::HashMap;

use serde_json::{Map, Value};

use omnigate_protocol::claude::{
    BlockDelta, ClaudeRole, ClaudeStreamEvent, ClaudeUsage, ContentBlock, MessageDeltaBody,
    MessagesResponse,
};
use omnigate_protocol::openai_chat::{ChatChunk, ChatUsage};

use crate::generate_content::{finish, new_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    Tool(u32),
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: u32,
    kind: BlockKind,
}

/// Re-encodes hub chunks as Anthropic stream events.
///
/// `message_delta` and `message_stop` are held until [`finish`](Self::finish)
/// because the hub reports usage after the finish reason.
#[derive(Debug, Default)]
pub struct ChatToClaudeStream {
    started: bool,
    finished: bool,
    block: Option<OpenBlock>,
    next_block: u32,
    tool_blocks: HashMap<u32, u32>,
    finish_reason: Option<String>,
    usage: Option<ChatUsage>,
}

impl ChatToClaudeStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: ChatChunk) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if !self.started {
            self.start(&mut out, chunk.id.clone(), chunk.model.clone());
        }

        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            let delta = choice.delta;
            if let Some(thinking) = delta.reasoning_content.filter(|t| !t.is_empty()) {
                let index = self.ensure_block(&mut out, BlockKind::Thinking, None);
                out.push(ClaudeStreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::ThinkingDelta { thinking },
                });
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                let index = self.ensure_block(&mut out, BlockKind::Text, None);
                out.push(ClaudeStreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::TextDelta { text },
                });
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let function = call.function.unwrap_or_default();
                let index = match self.tool_blocks.get(&call.index) {
                    Some(index) => *index,
                    None => {
                        let start = ContentBlock::ToolUse {
                            id: call.id.clone().unwrap_or_else(|| new_id("toolu_")),
                            name: function.name.clone().unwrap_or_default(),
                            input: Value::Object(Map::new()),
                        };
                        let index =
                            self.ensure_block(&mut out, BlockKind::Tool(call.index), Some(start));
                        self.tool_blocks.insert(call.index, index);
                        index
                    }
                };
                if let Some(partial_json) = function.arguments.filter(|a| !a.is_empty()) {
                    out.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: BlockDelta::InputJsonDelta { partial_json },
                    });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<ClaudeStreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if !self.started {
            self.start(&mut out, String::new(), String::new());
        }
        self.close_block(&mut out);
        let usage = self.usage.unwrap_or_default();
        out.push(ClaudeStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(
                    finish::to_claude(self.finish_reason.as_deref().unwrap_or("stop")).to_string(),
                ),
                stop_sequence: None,
            },
            usage: Some(ClaudeUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                ..ClaudeUsage::default()
            }),
        });
        out.push(ClaudeStreamEvent::MessageStop);
        self.finished = true;
        out
    }

    fn start(&mut self, out: &mut Vec<ClaudeStreamEvent>, id: String, model: String) {
        self.started = true;
        let input_tokens = self.usage.map(|u| u.prompt_tokens).unwrap_or(0);
        out.push(ClaudeStreamEvent::MessageStart {
            message: MessagesResponse {
                id: if id.is_empty() { new_id("msg_") } else { id },
                kind: "message".to_string(),
                role: ClaudeRole::Assistant,
                model,
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: ClaudeUsage {
                    input_tokens,
                    ..ClaudeUsage::default()
                },
            },
        });
    }

    /// Return the index of an open block of `kind`, opening one if needed.
    fn ensure_block(
        &mut self,
        out: &mut Vec<ClaudeStreamEvent>,
        kind: BlockKind,
        start: Option<ContentBlock>,
    ) -> u32 {
        if let Some(block) = self.block
            && block.kind == kind
        {
            return block.index;
        }
        self.close_block(out);
        let index = self.next_block;
        self.next_block += 1;
        let content_block = start.unwrap_or_else(|| match kind {
            BlockKind::Thinking => ContentBlock::Thinking {
                thinking: String::new(),
                signature: None,
            },
            _ => ContentBlock::text(String::new()),
        });
        out.push(ClaudeStreamEvent::ContentBlockStart {
            index,
            content_block,
        });
        self.block = Some(OpenBlock { index, kind });
        index
    }

    fn close_block(&mut self, out: &mut Vec<ClaudeStreamEvent>) {
        if let Some(block) = self.block.take() {
            out.push(ClaudeStreamEvent::ContentBlockStop { index: block.index });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: Value) -> ChatChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_then_tool_call_produces_ordered_blocks() {
        let mut stream = ChatToClaudeStream::new();
        let mut events = Vec::new();
        events.extend(stream.push(chunk(json!({
            "id": "c1", "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hi"}}]
        }))));
        events.extend(stream.push(chunk(json!({
            "id": "c1", "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function", "function": {"name": "f", "arguments": ""}}
            ]}}]
        }))));
        events.extend(stream.push(chunk(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":1}"}}
            ]}, "finish_reason": "tool_calls"}]
        }))));
        events.extend(stream.push(chunk(json!({
            "choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))));
        events.extend(stream.finish());

        let names: Vec<_> = events.iter().map(|e| e.event_name()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        let ClaudeStreamEvent::MessageDelta { delta, usage } = &events[7] else {
            panic!("unexpected event");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(usage.unwrap().output_tokens, 4);
        assert!(stream.finish().is_empty());
    }

    #[test]
    fn empty_stream_still_closes_the_message() {
        let mut stream = ChatToClaudeStream::new();
        let names: Vec<_> = stream.finish().iter().map(|e| e.event_name()).collect();
        assert_eq!(names, vec!["message_start", "message_delta", "message_stop"]);
    }
}
