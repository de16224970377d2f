use std::collections::BTreeMap;

use omnigate_protocol::gemini::{Candidate, Content, GenerateContentResponse, Part};
use omnigate_protocol::openai_chat::{ChatChunk, ChatUsage, ToolCall};

use super::response::{function_call, thought, usage_metadata};
use crate::generate_content::{finish, new_id};

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Re-encodes hub chunks as streamed `GenerateContentResponse`s.
///
/// Gemini carries whole function calls, so tool-call fragments are buffered
/// and flushed in the final chunk together with the finish reason.
#[derive(Debug, Default)]
pub struct ChatToGeminiStream {
    model: Option<String>,
    id: Option<String>,
    calls: BTreeMap<u32, PendingCall>,
    finish_reason: Option<String>,
    usage: Option<ChatUsage>,
    finished: bool,
}

impl ChatToGeminiStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: ChatChunk) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }
        if self.model.is_none() && !chunk.model.is_empty() {
            self.model = Some(chunk.model.clone());
        }
        if self.id.is_none() && !chunk.id.is_empty() {
            self.id = Some(chunk.id.clone());
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let mut parts = Vec::new();
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                parts.push(thought(reasoning));
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                parts.push(Part::text(text));
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

        if parts.is_empty() {
            return Vec::new();
        }
        vec![self.response(parts, None)]
    }

    pub fn finish(&mut self) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let parts = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| {
                function_call(ToolCall::function(
                    call.id.unwrap_or_else(|| new_id("call_")),
                    call.name,
                    call.arguments,
                ))
            })
            .collect();
        let reason = finish::to_gemini(self.finish_reason.as_deref().unwrap_or("stop"));
        let mut last = self.response(parts, Some(reason.to_string()));
        last.usage_metadata = self.usage.map(usage_metadata);
        vec![last]
    }

    fn response(&self, parts: Vec<Part>, finish_reason: Option<String>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts,
                }),
                finish_reason,
                index: Some(0),
            }],
            usage_metadata: None,
            model_version: self.model.clone(),
            response_id: self.id.clone(),
        }
    }
}
