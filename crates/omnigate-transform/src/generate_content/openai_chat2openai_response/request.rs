use serde_json::{Map, Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{ChatContentPart, ChatRequest, ChatRole};
use omnigate_protocol::openai_responses::{
    InputItem, ResponsesInput, ResponsesPart, ResponsesRequest, ResponsesTool,
};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::to_value;

pub fn transform_request(req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let output_limit = req.output_limit();
    let mut instructions = Vec::new();
    let mut items = Vec::new();

    for message in req.messages {
        match message.role {
            ChatRole::System | ChatRole::Developer => {
                let text = message.text_content();
                if !text.is_empty() {
                    instructions.push(text);
                }
            }
            ChatRole::User => {
                let mut parts = Vec::new();
                for part in message.content.map(|c| c.into_parts()).unwrap_or_default() {
                    match part {
                        ChatContentPart::Text { text } => parts.push(ResponsesPart::InputText { text }),
                        ChatContentPart::ImageUrl { image_url } => parts.push(ResponsesPart::InputImage {
                            image_url: Some(image_url.url),
                            detail: Some(image_url.detail.unwrap_or_else(|| "auto".to_string())),
                        }),
                        other => ctx.unsupported_part(ctx.target, other.kind())?,
                    }
                }
                if !parts.is_empty() {
                    items.push(InputItem::message("user", parts));
                }
            }
            ChatRole::Assistant => {
                let text = message.content.map(|c| c.text()).unwrap_or_default();
                if !text.is_empty() {
                    items.push(InputItem::message("assistant", vec![ResponsesPart::output_text(text)]));
                }
                for call in message.tool_calls.unwrap_or_default() {
                    items.push(InputItem {
                        kind: Some("function_call".to_string()),
                        call_id: Some(call.id),
                        name: Some(call.function.name),
                        arguments: Some(call.function.arguments),
                        ..InputItem::default()
                    });
                }
            }
            ChatRole::Tool => {
                items.push(InputItem {
                    kind: Some("function_call_output".to_string()),
                    call_id: message.tool_call_id,
                    output: Some(Value::String(message.content.map(|c| c.text()).unwrap_or_default())),
                    ..InputItem::default()
                });
            }
        }
    }

    let mut tools = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        match tool.function {
            Some(function) => tools.push(ResponsesTool {
                kind: "function".to_string(),
                name: Some(function.name),
                description: function.description,
                parameters: function.parameters,
                strict: None,
            }),
            None => ctx.unsupported_part(ctx.target, &format!("tool:{}", tool.kind))?,
        }
    }

    let out = ResponsesRequest {
        model: ctx.model.to_string(),
        input: Some(ResponsesInput::Items(items)),
        instructions: (!instructions.is_empty()).then(|| instructions.join("\n\n")),
        stream: Some(ctx.stream),
        temperature: req.temperature,
        top_p: req.top_p,
        max_output_tokens: output_limit,
        tool_choice: req.tool_choice.map(tool_choice_to_responses),
        tools: (!tools.is_empty()).then_some(tools),
        store: None,
        reasoning: req.reasoning_effort.map(|effort| json!({"effort": effort})),
        extra: Map::new(),
    };
    to_value(WireFormat::OpenAIResponses, &out)
}

fn tool_choice_to_responses(choice: Value) -> Value {
    match choice
        .get("function")
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
    {
        Some(name) => json!({"type": "function", "name": name}),
        None => choice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_become_items() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "rules"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "done"}
            ],
            "max_tokens": 20,
            "reasoning_effort": "low",
            "tool_choice": {"type": "function", "function": {"name": "f"}}
        }))
        .unwrap();
        let ctx = TranslateCtx::new(WireFormat::OpenAIChat, WireFormat::OpenAIResponses, "gpt-5-codex", true);
        let out = transform_request(req, &ctx).unwrap();
        assert_eq!(out["model"], "gpt-5-codex");
        assert_eq!(out["instructions"], "rules");
        assert_eq!(out["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(out["input"][1]["type"], "function_call");
        assert_eq!(out["input"][2]["output"], "done");
        assert_eq!(out["max_output_tokens"], 20);
        assert_eq!(out["reasoning"]["effort"], "low");
        assert_eq!(out["tool_choice"], json!({"type": "function", "name": "f"}));
        assert_eq!(out["stream"], true);
    }
}
