use std::collections::HashMap;

use serde_json::{Map, Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::ollama::{
    OllamaChatRequest, OllamaFunctionCall, OllamaMessage, OllamaOptions, OllamaToolCall,
};
use omnigate_protocol::openai_chat::{ChatContentPart, ChatRequest, ChatRole};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{parse_arguments, parse_data_url, to_value};

pub fn transform_request(req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let output_limit = req.output_limit();
    let mut names: HashMap<String, String> = HashMap::new();
    let mut messages = Vec::with_capacity(req.messages.len());

    for message in req.messages {
        let mut out = OllamaMessage::default();
        match message.role {
            ChatRole::System | ChatRole::Developer => {
                out.role = "system".to_string();
                out.content = message.text_content();
            }
            ChatRole::User => {
                out.role = "user".to_string();
                let mut images = Vec::new();
                for part in message.content.map(|c| c.into_parts()).unwrap_or_default() {
                    match part {
                        ChatContentPart::Text { text } => out.content.push_str(&text),
                        ChatContentPart::ImageUrl { image_url } => match parse_data_url(&image_url.url) {
                            Some((_, data)) => images.push(data),
                            None => ctx.unsupported_part(ctx.target, "image_url:remote")?,
                        },
                        other => ctx.unsupported_part(ctx.target, other.kind())?,
                    }
                }
                out.images = (!images.is_empty()).then_some(images);
            }
            ChatRole::Assistant => {
                out.role = "assistant".to_string();
                out.content = message.content.map(|c| c.text()).unwrap_or_default();
                let calls: Vec<_> = message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|call| {
                        names.insert(call.id, call.function.name.clone());
                        OllamaToolCall {
                            function: OllamaFunctionCall {
                                name: call.function.name,
                                arguments: parse_arguments(&call.function.arguments),
                            },
                        }
                    })
                    .collect();
                out.tool_calls = (!calls.is_empty()).then_some(calls);
            }
            ChatRole::Tool => {
                out.role = "tool".to_string();
                out.tool_name = message
                    .tool_call_id
                    .as_ref()
                    .and_then(|id| names.get(id).cloned())
                    .or(message.name.clone());
                out.content = message.content.map(|c| c.text()).unwrap_or_default();
            }
        }
        messages.push(out);
    }

    let options = OllamaOptions {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        num_predict: output_limit.map(|n| n as i64),
        stop: req.stop.map(|s| s.into_vec()),
        extra: Map::new(),
    };
    let has_options = options != OllamaOptions::default();

    let out = OllamaChatRequest {
        model: ctx.model.to_string(),
        messages,
        stream: Some(ctx.stream),
        options: has_options.then_some(options),
        tools: req.tools.filter(|tools| !tools.is_empty()),
        format: req.extra.get("response_format").and_then(ollama_format),
        keep_alive: None,
        think: req.reasoning_effort.map(|_| Value::Bool(true)),
        extra: Map::new(),
    };
    to_value(WireFormat::Ollama, &out)
}

fn ollama_format(response_format: &Value) -> Option<Value> {
    match response_format.get("type").and_then(Value::as_str)? {
        "json_object" => Some(json!("json")),
        "json_schema" => response_format
            .get("json_schema")
            .and_then(|s| s.get("schema"))
            .cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_request_becomes_ollama_chat() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": [
                    {"type": "text", "text": "see"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBOR"}}
                ]},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "f", "arguments": "{\"x\":1}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "ok"}
            ],
            "max_tokens": 10,
            "response_format": {"type": "json_object"}
        }))
        .unwrap();
        let ctx = TranslateCtx::new(WireFormat::OpenAIChat, WireFormat::Ollama, "llama3.2", false);
        let out = transform_request(req, &ctx).unwrap();
        assert_eq!(out["model"], "llama3.2");
        assert_eq!(out["stream"], false);
        assert_eq!(out["messages"][1]["images"][0], "iVBOR");
        assert_eq!(out["messages"][2]["tool_calls"][0]["function"]["arguments"]["x"], 1);
        assert_eq!(out["messages"][3]["tool_name"], "f");
        assert_eq!(out["options"]["num_predict"], 10);
        assert_eq!(out["format"], "json");
    }
}
