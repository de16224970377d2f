use omnigate_protocol::gemini::GenerateContentResponse;
use omnigate_protocol::openai_chat::{
    ChatChunk, ChatRole, ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta,
};

use super::response::{chat_usage, function_call};
use crate::generate_content::{finish, new_id, now_unix};

/// Turns streamed Gemini chunks into hub chunks.
#[derive(Debug, Default)]
pub struct GeminiToChatStream {
    id: String,
    model: String,
    created: i64,
    started: bool,
    finished: bool,
    tool_calls: u32,
}

impl GeminiToChatStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: GenerateContentResponse) -> Vec<ChatChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(model) = &chunk.model_version {
            self.model.clone_from(model);
        }
        if !self.started {
            self.started = true;
            self.id = chunk.response_id.clone().unwrap_or_else(|| new_id("chatcmpl-"));
            self.created = now_unix();
            out.push(self.chunk(ChunkDelta {
                role: Some(ChatRole::Assistant),
                content: Some(String::new()),
                ..ChunkDelta::default()
            }));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return out;
        };
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            let mut text = String::new();
            let mut reasoning = String::new();
            if let Some(call) = function_call(part, &mut text, &mut reasoning) {
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
            if !reasoning.is_empty() {
                out.push(self.chunk(ChunkDelta {
                    reasoning_content: Some(reasoning),
                    ..ChunkDelta::default()
                }));
            }
            if !text.is_empty() {
                out.push(self.chunk(ChunkDelta {
                    content: Some(text),
                    ..ChunkDelta::default()
                }));
            }
        }

        if let Some(reason) = candidate.finish_reason {
            let mut last = self.chunk(ChunkDelta::default());
            last.choices[0].finish_reason =
                Some(finish::from_gemini(&reason, self.tool_calls > 0).to_string());
            last.usage = chunk.usage_metadata.map(chat_usage);
            out.push(last);
            self.finished = true;
        }
        out
    }

    /// Close a stream that ended without a `finishReason`.
    pub fn finish(&mut self) -> Vec<ChatChunk> {
        if self.finished || !self.started {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;
        let mut last = self.chunk(ChunkDelta::default());
        last.choices[0].finish_reason = Some(finish::from_gemini("STOP", self.tool_calls > 0).to_string());
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn chunk(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_chunks_then_finish_with_usage() {
        let mut stream = GeminiToChatStream::new();
        let mut out = stream.push(chunk(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}}],
            "modelVersion": "gemini-2.5-flash"
        })));
        out.extend(stream.push(chunk(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "lo"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 2, "totalTokenCount": 4}
        }))));
        let text: String = out
            .iter()
            .filter_map(|c| c.choices[0].delta.content.clone())
            .collect();
        assert_eq!(text, "Hello");
        let last = out.last().unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.unwrap().total_tokens, 4);
        assert_eq!(last.model, "gemini-2.5-flash");
        assert!(stream.finish().is_empty());
    }

    #[test]
    fn function_calls_arrive_whole() {
        let mut stream = GeminiToChatStream::new();
        let out = stream.push(chunk(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "a", "args": {}}},
                {"functionCall": {"name": "b", "args": {"x": 1}}}
            ]}, "finishReason": "STOP"}]
        })));
        let calls: Vec<_> = out
            .iter()
            .filter_map(|c| c.choices[0].delta.tool_calls.as_ref())
            .map(|calls| calls[0].index)
            .collect();
        assert_eq!(calls, vec![0, 1]);
        assert_eq!(out.last().unwrap().choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }
}
