use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::gemini::{GenerateContentResponse, Part, UsageMetadata};
use omnigate_protocol::openai_chat::{
    ChatChoice, ChatContent, ChatMessage, ChatResponse, ChatRole, ChatUsage, ToolCall,
};

use crate::error::TransformResult;
use crate::generate_content::{arguments_string, finish, new_id, now_unix, parse};

pub fn transform_response(body: Value) -> TransformResult<ChatResponse> {
    let resp: GenerateContentResponse = parse(WireFormat::Gemini, body)?;

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;
    if let Some(candidate) = resp.candidates.into_iter().next() {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = function_call(part, &mut text, &mut reasoning) {
                tool_calls.push(call);
            }
        }
        finish_reason = candidate.finish_reason;
    }
    let reason = finish::from_gemini(finish_reason.as_deref().unwrap_or("STOP"), !tool_calls.is_empty());

    Ok(ChatResponse {
        id: resp.response_id.unwrap_or_else(|| new_id("chatcmpl-")),
        object: "chat.completion".to_string(),
        created: now_unix(),
        model: resp.model_version.unwrap_or_default(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(ChatContent::Text(text)),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                ..ChatMessage::default()
            },
            finish_reason: Some(reason.to_string()),
        }],
        usage: resp.usage_metadata.map(chat_usage),
    })
}

/// Route one part into text, reasoning, or a returned tool call.
pub(crate) fn function_call(part: Part, text: &mut String, reasoning: &mut String) -> Option<ToolCall> {
    if let Some(call) = part.function_call {
        return Some(ToolCall::function(
            call.id.unwrap_or_else(|| new_id("call_")),
            call.name,
            arguments_string(&call.args),
        ));
    }
    if let Some(t) = part.text {
        if part.thought == Some(true) {
            reasoning.push_str(&t);
        } else {
            text.push_str(&t);
        }
    }
    None
}

pub(crate) fn chat_usage(usage: UsageMetadata) -> ChatUsage {
    let completion = usage.candidates_token_count + usage.thoughts_token_count.unwrap_or(0);
    ChatUsage::new(usage.prompt_token_count, completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_call_sets_tool_calls_finish() {
        let resp = transform_response(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "plan", "thought": true},
                {"functionCall": {"name": "weather", "args": {"city": "Oslo"}}}
            ]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3, "thoughtsTokenCount": 2, "totalTokenCount": 9},
            "modelVersion": "gemini-2.5-pro"
        }))
        .unwrap();
        let choice = &resp.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(choice.message.reasoning_content.as_deref(), Some("plan"));
        let call = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.function.arguments, "{\"city\":\"Oslo\"}");
        assert_eq!(resp.usage.unwrap().completion_tokens, 5);
        assert_eq!(resp.model, "gemini-2.5-pro");
    }

    #[test]
    fn max_tokens_maps_to_length() {
        let resp = transform_response(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "trunc"}]}, "finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(resp.choices[0].message.text_content(), "trunc");
    }
}
