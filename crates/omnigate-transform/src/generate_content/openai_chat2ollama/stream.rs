use omnigate_protocol::ollama::OllamaChatResponse;
use omnigate_protocol::openai_chat::{
    ChatChunk, ChatRole, ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta,
};

use super::response::{to_tool_calls, usage};
use crate::generate_content::{finish, new_id, now_unix};

/// Turns Ollama NDJSON lines into hub chunks.
#[derive(Debug, Default)]
pub struct OllamaToChatStream {
    id: String,
    model: String,
    created: i64,
    started: bool,
    finished: bool,
    tool_calls: u32,
}

impl OllamaToChatStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: OllamaChatResponse) -> Vec<ChatChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if !line.model.is_empty() {
            self.model.clone_from(&line.model);
        }
        if !self.started {
            self.started = true;
            self.id = new_id("chatcmpl-");
            self.created = now_unix();
            out.push(self.chunk(ChunkDelta {
                role: Some(ChatRole::Assistant),
                content: Some(String::new()),
                ..ChunkDelta::default()
            }));
        }

        let message = line.message;
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            out.push(self.chunk(ChunkDelta {
                reasoning_content: Some(thinking),
                ..ChunkDelta::default()
            }));
        }
        if !message.content.is_empty() {
            out.push(self.chunk(ChunkDelta {
                content: Some(message.content),
                ..ChunkDelta::default()
            }));
        }
        for call in to_tool_calls(message.tool_calls.unwrap_or_default()) {
            let index = self.tool_calls;
            self.tool_calls += 1;
            out.push(self.chunk(ChunkDelta {
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: Some(call.id),
                    kind: Some(call.kind),
                    function: Some(FunctionCallDelta {
                        name: Some(call.function.name),
                        arguments: Some(call.function.arguments),
                    }),
                }]),
                ..ChunkDelta::default()
            }));
        }

        if line.done {
            let mut last = self.chunk(ChunkDelta::default());
            last.choices[0].finish_reason = Some(
                finish::from_ollama(line.done_reason.as_deref(), self.tool_calls > 0).to_string(),
            );
            last.usage = usage(line.prompt_eval_count, line.eval_count);
            out.push(last);
            self.finished = true;
        }
        out
    }

    /// Close a stream that ended before a `done: true` line.
    pub fn finish(&mut self) -> Vec<ChatChunk> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;
        let mut last = self.chunk(ChunkDelta::default());
        last.choices[0].finish_reason =
            Some(finish::from_ollama(None, self.tool_calls > 0).to_string());
        vec![last]
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
