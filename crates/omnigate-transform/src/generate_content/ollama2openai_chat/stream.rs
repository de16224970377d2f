use std::collections::BTreeMap;

use omnigate_protocol::ollama::{OllamaChatResponse, OllamaMessage};
use omnigate_protocol::openai_chat::{ChatChunk, ChatUsage, ToolCall};

use super::response::tool_call;
use crate::generate_content::{finish, new_id, now_rfc3339};

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Re-encodes hub chunks as Ollama NDJSON lines; the last line has `done: true`.
#[derive(Debug, Default)]
pub struct ChatToOllamaStream {
    model: String,
    calls: BTreeMap<u32, PendingCall>,
    finish_reason: Option<String>,
    usage: Option<ChatUsage>,
    finished: bool,
}

impl ChatToOllamaStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: ChatChunk) -> Vec<OllamaChatResponse> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if self.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            let delta = choice.delta;
            let content = delta.content.unwrap_or_default();
            let thinking = delta.reasoning_content.filter(|t| !t.is_empty());
            if !content.is_empty() || thinking.is_some() {
                out.push(self.line(
                    OllamaMessage {
                        role: "assistant".to_string(),
                        content,
                        thinking,
                        ..OllamaMessage::default()
                    },
                    false,
                ));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let pending = self.calls.entry(call.index).or_default();
                if call.id.is_some() {
                    pending.id = call.id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        pending.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        pending.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<OllamaChatResponse> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let calls: Vec<_> = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| {
                tool_call(ToolCall::function(
                    call.id.unwrap_or_else(|| new_id("call_")),
                    call.name,
                    call.arguments,
                ))
            })
            .collect();
        let message = OllamaMessage {
            role: "assistant".to_string(),
            tool_calls: (!calls.is_empty()).then_some(calls),
            ..OllamaMessage::default()
        };
        let mut last = self.line(message, true);
        last.done_reason =
            Some(finish::to_ollama(self.finish_reason.as_deref().unwrap_or("stop")).to_string());
        last.prompt_eval_count = self.usage.map(|u| u.prompt_tokens);
        last.eval_count = self.usage.map(|u| u.completion_tokens);
        vec![last]
    }

    fn line(&self, message: OllamaMessage, done: bool) -> OllamaChatResponse {
        OllamaChatResponse {
            model: self.model.clone(),
            created_at: now_rfc3339(),
            message,
            done,
            ..OllamaChatResponse::default()
        }
    }
}
