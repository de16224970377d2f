use std::collections::{HashMap, VecDeque};

use serde_json::{Value, json};
use tracing::debug;

use omnigate_protocol::WireFormat;
use omnigate_protocol::ollama::{OllamaChatRequest, OllamaMessage};
use omnigate_protocol::openai_chat::{
    ChatContent, ChatContentPart, ChatMessage, ChatRequest, ChatRole, ImageUrl, StopSequences,
    ToolCall,
};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{arguments_string, data_url, new_id, parse};

pub fn transform_request(body: Value, ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    let req: OllamaChatRequest = parse(WireFormat::Ollama, body)?;

    // Ollama links tool results to calls by function name only.
    let mut pending: HashMap<String, VecDeque<String>> = HashMap::new();
    let mut messages = Vec::with_capacity(req.messages.len());
    for message in req.messages {
        messages.push(convert_message(message, &mut pending, ctx)?);
    }

    let options = req.options.unwrap_or_default();
    if options.top_k.is_some() {
        debug!(event = "param_dropped", param = "top_k", "hub has no top_k");
    }
    let mut extra = serde_json::Map::new();
    if let Some(format) = req.format.as_ref().and_then(response_format) {
        extra.insert("response_format".to_string(), format);
    }

    Ok(ChatRequest {
        model: req.model,
        messages,
        stream: Some(ctx.stream),
        temperature: options.temperature,
        top_p: options.top_p,
        max_tokens: options.num_predict.filter(|n| *n > 0).map(|n| n as u64),
        stop: options.stop.map(StopSequences::Many),
        tools: req.tools.filter(|tools| !tools.is_empty()),
        reasoning_effort: req.think.as_ref().and_then(think_effort),
        extra,
        ..ChatRequest::default()
    })
}

fn convert_message(
    message: OllamaMessage,
    pending: &mut HashMap<String, VecDeque<String>>,
    ctx: &TranslateCtx<'_>,
) -> TransformResult<ChatMessage> {
    let role = match message.role.as_str() {
        "system" => ChatRole::System,
        "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        "user" => ChatRole::User,
        other => {
            ctx.unsupported_part(ctx.target, &format!("role:{other}"))?;
            ChatRole::User
        }
    };

    let out = match role {
        ChatRole::Assistant => {
            let calls: Vec<ToolCall> = message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| {
                    let id = new_id("call_");
                    pending
                        .entry(call.function.name.clone())
                        .or_default()
                        .push_back(id.clone());
                    ToolCall::function(id, call.function.name, arguments_string(&call.function.arguments))
                })
                .collect();
            ChatMessage {
                role,
                content: (!message.content.is_empty() || calls.is_empty())
                    .then_some(ChatContent::Text(message.content)),
                tool_calls: (!calls.is_empty()).then_some(calls),
                ..ChatMessage::default()
            }
        }
        ChatRole::Tool => {
            let id = message
                .tool_name
                .as_ref()
                .and_then(|name| pending.get_mut(name))
                .and_then(VecDeque::pop_front)
                .or_else(|| pending.values_mut().find_map(VecDeque::pop_front))
                .unwrap_or_else(|| new_id("call_"));
            ChatMessage {
                role,
                content: Some(ChatContent::Text(message.content)),
                tool_call_id: Some(id),
                ..ChatMessage::default()
            }
        }
        _ => {
            let images = message.images.unwrap_or_default();
            let content = if images.is_empty() {
                ChatContent::Text(message.content)
            } else {
                let mut parts = vec![ChatContentPart::Text {
                    text: message.content,
                }];
                parts.extend(images.iter().map(|data| ChatContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(sniff_image_mime(data), data),
                        detail: None,
                    },
                }));
                ChatContent::Parts(parts)
            };
            ChatMessage {
                role,
                content: Some(content),
                ..ChatMessage::default()
            }
        }
    };
    Ok(out)
}

/// Guess an image type from the first base64 characters.
pub(crate) fn sniff_image_mime(data: &str) -> &'static str {
    if data.starts_with("/9j/") {
        "image/jpeg"
    } else if data.starts_with("R0lG") {
        "image/gif"
    } else if data.starts_with("UklG") {
        "image/webp"
    } else {
        "image/png"
    }
}

fn response_format(format: &Value) -> Option<Value> {
    match format {
        Value::String(kind) if kind == "json" => Some(json!({"type": "json_object"})),
        Value::Object(_) => Some(json!({
            "type": "json_schema",
            "json_schema": {"name": "response", "schema": format}
        })),
        _ => None,
    }
}

fn think_effort(think: &Value) -> Option<String> {
    match think {
        Value::Bool(true) => Some("medium".to_string()),
        Value::String(level) => Some(level.clone()),
        _ => None,
    }
}
