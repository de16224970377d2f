//! Canned replies for liveness probes, answered without an upstream call.

use serde_json::Value;
use tokio::sync::mpsc;

use omnigate_common::BypassRules;
use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{
    ChatChoice, ChatChunk, ChatMessage, ChatResponse, ChatRole, ChatUsage, ChunkChoice, ChunkDelta,
};
use omnigate_transform::{StreamEvent, StreamTransformer, TransformResult, TranslatorRegistry};

use crate::error::ChatResult;
use crate::relay::encode_openai_chat_done;

/// Whether `body` is a probe under `rules`.
pub fn is_bypass(rules: &BypassRules, model: &str, body: &Value) -> bool {
    if rules.models.iter().any(|m| m == model) {
        return true;
    }
    match last_user_text(body) {
        Some(text) => {
            let text = text.trim();
            rules.probe_texts.iter().any(|probe| probe == text)
        }
        None => false,
    }
}

/// Render the canned reply in `source` format.
pub fn bypass_reply(
    registry: &TranslatorRegistry,
    rules: &BypassRules,
    source: WireFormat,
    model: &str,
    stream: bool,
) -> TransformResult<ChatResult> {
    let id = format!("chatcmpl-bypass-{}", uuid::Uuid::new_v4().simple());
    let created = time::OffsetDateTime::now_utc().unix_timestamp();
    if !stream {
        let hub = ChatResponse {
            id,
            object: "chat.completion".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::text(ChatRole::Assistant, rules.reply_text.clone()),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(ChatUsage::new(1, 1)),
        };
        let hub = serde_json::to_value(hub)
            .map_err(|err| omnigate_transform::TransformError::invalid(WireFormat::OpenAIChat, err))?;
        let body = registry.translate_response(WireFormat::OpenAIChat, source, hub)?;
        let bytes = serde_json::to_vec(&body)
            .map_err(|err| omnigate_transform::TransformError::invalid(source, err))?;
        return Ok(ChatResult::json(bytes));
    }

    let chunk = |delta: ChunkDelta, finish_reason: Option<&str>, usage: Option<ChatUsage>| ChatChunk {
        id: id.clone(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(str::to_string),
        }],
        usage,
    };
    let hub = [
        chunk(
            ChunkDelta {
                role: Some(ChatRole::Assistant),
                content: Some(rules.reply_text.clone()),
                ..ChunkDelta::default()
            },
            None,
            None,
        ),
        chunk(ChunkDelta::default(), Some("stop"), Some(ChatUsage::new(1, 1))),
    ];

    let mut transformer = StreamTransformer::new(WireFormat::OpenAIChat, source);
    let mut events = Vec::new();
    for chunk in hub {
        events.extend(transformer.push(StreamEvent::OpenAIChat(chunk))?);
    }
    events.extend(transformer.finish());
    let mut frames = events
        .iter()
        .map(|event| event.encode(source))
        .collect::<TransformResult<Vec<_>>>()?;
    if source.has_done_marker() {
        frames.push(encode_openai_chat_done());
    }

    let (tx, rx) = mpsc::channel(frames.len().max(1));
    for frame in frames {
        // Capacity covers every frame.
        let _ = tx.try_send(frame);
    }
    Ok(ChatResult::stream(source, rx))
}

/// Text of the last user turn, across all supported request shapes.
fn last_user_text(body: &Value) -> Option<String> {
    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))?;
        return content_text(last.get("content")?);
    }
    let contents = body
        .get("contents")
        .or_else(|| body.pointer("/request/contents"))
        .and_then(Value::as_array);
    if let Some(contents) = contents {
        let last = contents
            .iter()
            .rev()
            .find(|c| c.get("role").and_then(Value::as_str).unwrap_or("user") == "user")?;
        return content_text(last.get("parts")?);
    }
    match body.get("input")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let last = items
                .iter()
                .rev()
                .find(|item| item.get("role").and_then(Value::as_str) == Some("user"))?;
            content_text(last.get("content")?)
        }
        _ => None,
    }
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            Some(text)
        }
        _ => None,
    }
}
