use serde_json::{Value, json};
use tracing::debug;

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{
    ChatContent, ChatContentPart, ChatMessage, ChatRequest, ChatRole, ChatTool,
    FunctionDefinition, ImageUrl, ToolCall,
};
use omnigate_protocol::openai_responses::{
    InputItem, ResponsesInput, ResponsesPart, ResponsesRequest,
};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{arguments_string, new_id, parse};

pub fn transform_request(body: Value, ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    let req: ResponsesRequest = parse(WireFormat::OpenAIResponses, body)?;

    let mut messages = Vec::new();
    if let Some(instructions) = req.instructions.filter(|i| !i.is_empty()) {
        messages.push(ChatMessage::text(ChatRole::System, instructions));
    }
    match req.input {
        Some(ResponsesInput::Text(text)) => messages.push(ChatMessage::text(ChatRole::User, text)),
        Some(ResponsesInput::Items(items)) => {
            for item in items {
                push_item(&mut messages, item, ctx)?;
            }
        }
        None => {}
    }

    let mut tools = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        match (tool.kind.as_str(), tool.name) {
            ("function", Some(name)) => tools.push(ChatTool::function(FunctionDefinition {
                name,
                description: tool.description,
                parameters: tool.parameters,
            })),
            (kind, _) => ctx.unsupported_part(ctx.target, &format!("tool:{kind}"))?,
        }
    }

    Ok(ChatRequest {
        model: req.model,
        messages,
        stream: Some(ctx.stream),
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_output_tokens,
        tool_choice: req.tool_choice.map(tool_choice_to_chat),
        tools: (!tools.is_empty()).then_some(tools),
        reasoning_effort: req
            .reasoning
            .as_ref()
            .and_then(|r| r.get("effort"))
            .and_then(Value::as_str)
            .map(str::to_string),
        ..ChatRequest::default()
    })
}

fn push_item(
    messages: &mut Vec<ChatMessage>,
    item: InputItem,
    ctx: &TranslateCtx<'_>,
) -> TransformResult<()> {
    let kind = item.item_type().to_string();
    match kind.as_str() {
        "message" => {
            let role = match item.role.as_deref() {
                Some("system") => ChatRole::System,
                Some("developer") => ChatRole::Developer,
                Some("assistant") => ChatRole::Assistant,
                _ => ChatRole::User,
            };
            let mut parts = Vec::new();
            for part in item.content.map(|c| c.into_parts()).unwrap_or_default() {
                match part {
                    ResponsesPart::InputText { text } | ResponsesPart::OutputText { text, .. } => {
                        parts.push(ChatContentPart::Text { text });
                    }
                    ResponsesPart::Refusal { refusal } if role == ChatRole::Assistant => {
                        parts.push(ChatContentPart::Text { text: refusal });
                    }
                    ResponsesPart::InputImage {
                        image_url: Some(url),
                        detail,
                    } => parts.push(ChatContentPart::ImageUrl {
                        image_url: ImageUrl { url, detail },
                    }),
                    other => ctx.unsupported_part(ctx.target, other.kind())?,
                }
            }
            let text_only = parts.iter().all(|p| matches!(p, ChatContentPart::Text { .. }));
            let content = if text_only || role != ChatRole::User {
                ChatContent::Text(ChatContent::Parts(parts).text())
            } else {
                ChatContent::Parts(parts)
            };
            messages.push(ChatMessage {
                role,
                content: Some(content),
                ..ChatMessage::default()
            });
        }
        "function_call" => {
            let call = ToolCall::function(
                item.call_id.or(item.id).unwrap_or_else(|| new_id("call_")),
                item.name.unwrap_or_default(),
                item.arguments.unwrap_or_default(),
            );
            // Consecutive calls belong to the same assistant turn.
            match messages.last_mut() {
                Some(last) if last.role == ChatRole::Assistant => {
                    last.tool_calls.get_or_insert_with(Vec::new).push(call);
                }
                _ => messages.push(ChatMessage {
                    role: ChatRole::Assistant,
                    tool_calls: Some(vec![call]),
                    ..ChatMessage::default()
                }),
            }
        }
        "function_call_output" => {
            let output = match item.output {
                Some(Value::String(text)) => text,
                Some(other) => arguments_string(&other),
                None => String::new(),
            };
            messages.push(ChatMessage {
                role: ChatRole::Tool,
                content: Some(ChatContent::Text(output)),
                tool_call_id: item.call_id,
                ..ChatMessage::default()
            });
        }
        "reasoning" => debug!(event = "reasoning_item_skipped", "reasoning input item skipped"),
        other => ctx.unsupported_part(ctx.target, other)?,
    }
    Ok(())
}

/// `{"type":"function","name":..}` becomes the chat `{"function":{"name":..}}` shape.
fn tool_choice_to_chat(choice: Value) -> Value {
    match choice.get("name").and_then(Value::as_str) {
        Some(name) if choice.get("type").and_then(Value::as_str) == Some("function") => {
            json!({"type": "function", "function": {"name": name}})
        }
        _ => choice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(body: Value) -> ChatRequest {
        let ctx = TranslateCtx::new(WireFormat::OpenAIResponses, WireFormat::OpenAIChat, "gpt-5", true);
        transform_request(body, &ctx).unwrap()
    }

    #[test]
    fn string_input_and_instructions() {
        let req = translate(json!({
            "model": "gpt-5", "instructions": "be nice", "input": "hello",
            "max_output_tokens": 99, "reasoning": {"effort": "high"}
        }));
        assert_eq!(req.messages[0].role, ChatRole::System);
        assert_eq!(req.messages[1].text_content(), "hello");
        assert_eq!(req.max_tokens, Some(99));
        assert_eq!(req.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn function_call_items_join_assistant_turn() {
        let req = translate(json!({
            "model": "gpt-5",
            "input": [
                {"role": "user", "content": [{"type": "input_text", "text": "go"}]},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "calling"}]},
                {"type": "function_call", "call_id": "call_1", "name": "a", "arguments": "{}"},
                {"type": "function_call", "call_id": "call_2", "name": "b", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "ok"},
                {"type": "function_call_output", "call_id": "call_2", "output": {"n": 1}}
            ],
            "tools": [{"type": "function", "name": "a", "parameters": {"type": "object"}},
                      {"type": "web_search_preview"}],
            "tool_choice": {"type": "function", "name": "a"}
        }));
        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[1].text_content(), "calling");
        assert_eq!(req.messages[1].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(req.messages[3].text_content(), "{\"n\":1}");
        assert_eq!(req.tools.as_ref().unwrap().len(), 1);
        assert_eq!(req.tool_choice.unwrap()["function"]["name"], "a");
    }
}
