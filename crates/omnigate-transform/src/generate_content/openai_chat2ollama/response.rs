use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::ollama::{OllamaChatResponse, OllamaToolCall};
use omnigate_protocol::openai_chat::{
    ChatChoice, ChatContent, ChatMessage, ChatResponse, ChatRole, ChatUsage, ToolCall,
};

use crate::error::TransformResult;
use crate::generate_content::{arguments_string, finish, new_id, now_unix, parse};

pub fn transform_response(body: Value) -> TransformResult<ChatResponse> {
    let resp: OllamaChatResponse = parse(WireFormat::Ollama, body)?;
    let calls = to_tool_calls(resp.message.tool_calls.unwrap_or_default());
    let reason = finish::from_ollama(resp.done_reason.as_deref(), !calls.is_empty());
    let content = resp.message.content;

    Ok(ChatResponse {
        id: new_id("chatcmpl-"),
        object: "chat.completion".to_string(),
        created: now_unix(),
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: (!content.is_empty() || calls.is_empty()).then_some(ChatContent::Text(content)),
                tool_calls: (!calls.is_empty()).then_some(calls),
                reasoning_content: resp.message.thinking.filter(|t| !t.is_empty()),
                ..ChatMessage::default()
            },
            finish_reason: Some(reason.to_string()),
        }],
        usage: usage(resp.prompt_eval_count, resp.eval_count),
    })
}

pub(crate) fn to_tool_calls(calls: Vec<OllamaToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|call| {
            ToolCall::function(
                new_id("call_"),
                call.function.name,
                arguments_string(&call.function.arguments),
            )
        })
        .collect()
}

pub(crate) fn usage(prompt: Option<u64>, completion: Option<u64>) -> Option<ChatUsage> {
    if prompt.is_none() && completion.is_none() {
        return None;
    }
    Some(ChatUsage::new(prompt.unwrap_or(0), completion.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_calls_get_ids_and_string_arguments() {
        let resp = transform_response(json!({
            "model": "llama3.2", "created_at": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "", "thinking": "hmm",
                        "tool_calls": [{"function": {"name": "f", "arguments": {"a": 1}}}]},
            "done": true, "done_reason": "stop", "prompt_eval_count": 8, "eval_count": 3
        }))
        .unwrap();
        let message = &resp.choices[0].message;
        let call = &message.tool_calls.as_ref().unwrap()[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.function.arguments, "{\"a\":1}");
        assert!(message.content.is_none());
        assert_eq!(message.reasoning_content.as_deref(), Some("hmm"));
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.unwrap().total_tokens, 11);
    }
}
