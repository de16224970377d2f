use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{
    ChatChoice, ChatContent, ChatMessage, ChatResponse, ChatRole, ChatUsage, ToolCall,
};
use omnigate_protocol::openai_responses::{ResponseObject, ResponsesPart, ResponsesUsage};

use crate::error::TransformResult;
use crate::generate_content::{new_id, now_unix, parse};

pub fn transform_response(body: Value) -> TransformResult<ChatResponse> {
    let resp: ResponseObject = parse(WireFormat::OpenAIResponses, body)?;

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    for item in resp.output {
        match item.kind.as_str() {
            "message" => {
                for part in item.content.unwrap_or_default() {
                    match part {
                        ResponsesPart::OutputText { text: t, .. } => text.push_str(&t),
                        ResponsesPart::Refusal { refusal } => text.push_str(&refusal),
                        _ => {}
                    }
                }
            }
            "reasoning" => {
                for summary in item.summary.unwrap_or_default() {
                    if let Some(t) = summary.get("text").and_then(Value::as_str) {
                        reasoning.push_str(t);
                    }
                }
            }
            "function_call" => tool_calls.push(ToolCall::function(
                item.call_id.or(item.id).unwrap_or_else(|| new_id("call_")),
                item.name.unwrap_or_default(),
                item.arguments.unwrap_or_default(),
            )),
            _ => {}
        }
    }

    let finish_reason = finish_reason(&resp.status, resp.incomplete_details.as_ref(), !tool_calls.is_empty());
    Ok(ChatResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created: if resp.created_at > 0 { resp.created_at } else { now_unix() },
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(ChatContent::Text(text)),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                ..ChatMessage::default()
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: resp.usage.map(chat_usage),
    })
}

pub(crate) fn finish_reason(status: &str, incomplete: Option<&Value>, saw_tool: bool) -> &'static str {
    let reason = incomplete
        .and_then(|d| d.get("reason"))
        .and_then(Value::as_str);
    match (status, reason) {
        ("incomplete", Some("content_filter")) => "content_filter",
        ("incomplete", _) => "length",
        _ if saw_tool => "tool_calls",
        _ => "stop",
    }
}

pub(crate) fn chat_usage(usage: ResponsesUsage) -> ChatUsage {
    ChatUsage::new(usage.input_tokens, usage.output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_items_collapse_into_one_message() {
        let resp = transform_response(json!({
            "id": "resp_1", "object": "response", "created_at": 3, "model": "gpt-5", "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": [{"type": "summary_text", "text": "why"}]},
                {"type": "message", "id": "msg_1", "role": "assistant",
                 "content": [{"type": "output_text", "text": "hi", "annotations": []}]},
                {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "f", "arguments": "{}"}
            ],
            "usage": {"input_tokens": 4, "output_tokens": 6, "total_tokens": 10}
        }))
        .unwrap();
        let message = &resp.choices[0].message;
        assert_eq!(message.text_content(), "hi");
        assert_eq!(message.reasoning_content.as_deref(), Some("why"));
        assert_eq!(message.tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.unwrap().total_tokens, 10);
    }

    #[test]
    fn incomplete_maps_to_length() {
        assert_eq!(finish_reason("incomplete", Some(&json!({"reason": "max_output_tokens"})), false), "length");
        assert_eq!(finish_reason("completed", None, false), "stop");
    }
}
