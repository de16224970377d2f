use serde_json::{Value, json};
use tracing::debug;

use omnigate_protocol::WireFormat;
use omnigate_protocol::claude::{ClaudeContent, ClaudeRole, ClaudeTool, ContentBlock, MessagesRequest};
use omnigate_protocol::openai_chat::{
    ChatContent, ChatContentPart, ChatMessage, ChatRequest, ChatRole, ChatTool, FunctionDefinition,
    ImageUrl, StopSequences, ToolCall,
};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{data_url, parse, tool_choice_from_claude};

pub fn transform_request(body: Value, ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    let req: MessagesRequest = parse(WireFormat::Claude, body)?;

    let mut messages = Vec::new();
    if let Some(system) = req.system {
        let text = system_text(system, ctx)?;
        if !text.is_empty() {
            messages.push(ChatMessage::text(ChatRole::System, text));
        }
    }
    for message in req.messages {
        match message.role {
            ClaudeRole::User => push_user(&mut messages, message.content, ctx)?,
            ClaudeRole::Assistant => messages.push(assistant_message(message.content, ctx)?),
        }
    }

    let tools = match req.tools {
        Some(tools) => {
            let mut out = Vec::with_capacity(tools.len());
            for tool in tools {
                if let Some(tool) = convert_tool(tool, ctx)? {
                    out.push(tool);
                }
            }
            (!out.is_empty()).then_some(out)
        }
        None => None,
    };

    Ok(ChatRequest {
        model: req.model,
        messages,
        stream: Some(ctx.stream),
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens,
        stop: req.stop_sequences.map(StopSequences::Many),
        tool_choice: req.tool_choice.as_ref().and_then(tool_choice_from_claude),
        tools,
        reasoning_effort: req.thinking.as_ref().and_then(reasoning_effort),
        ..ChatRequest::default()
    })
}

fn system_text(system: ClaudeContent, ctx: &TranslateCtx<'_>) -> TransformResult<String> {
    let mut parts = Vec::new();
    for block in system.into_blocks() {
        match block {
            ContentBlock::Text { text, .. } => parts.push(text),
            other => ctx.unsupported_part(ctx.target, other.kind())?,
        }
    }
    Ok(parts.join("\n"))
}

fn push_user(
    messages: &mut Vec<ChatMessage>,
    content: ClaudeContent,
    ctx: &TranslateCtx<'_>,
) -> TransformResult<()> {
    let blocks = match content {
        ClaudeContent::Text(text) => {
            messages.push(ChatMessage::text(ChatRole::User, text));
            return Ok(());
        }
        ClaudeContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => parts.push(ChatContentPart::Text { text }),
            ContentBlock::Image { source } => {
                let url = match (source.kind.as_str(), source.data, source.url) {
                    ("base64", Some(data), _) => Some(data_url(
                        source.media_type.as_deref().unwrap_or("image/png"),
                        &data,
                    )),
                    (_, _, Some(url)) => Some(url),
                    _ => None,
                };
                match url {
                    Some(url) => parts.push(ChatContentPart::ImageUrl {
                        image_url: ImageUrl { url, detail: None },
                    }),
                    None => ctx.unsupported_part(ctx.target, "image")?,
                }
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut text = content.map(|c| tool_result_text(c, ctx)).transpose()?.unwrap_or_default();
                if is_error == Some(true) && text.is_empty() {
                    text = "error".to_string();
                }
                messages.push(ChatMessage {
                    role: ChatRole::Tool,
                    content: Some(ChatContent::Text(text)),
                    tool_call_id: Some(tool_use_id),
                    ..ChatMessage::default()
                });
            }
            other => ctx.unsupported_part(ctx.target, other.kind())?,
        }
    }

    if parts.is_empty() {
        return Ok(());
    }
    let content = match parts.as_slice() {
        [ChatContentPart::Text { text }] => ChatContent::Text(text.clone()),
        _ => ChatContent::Parts(parts),
    };
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: Some(content),
        ..ChatMessage::default()
    });
    Ok(())
}

fn tool_result_text(content: ClaudeContent, ctx: &TranslateCtx<'_>) -> TransformResult<String> {
    let blocks = match content {
        ClaudeContent::Text(text) => return Ok(text),
        ClaudeContent::Blocks(blocks) => blocks,
    };
    let mut out = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => out.push(text),
            other => ctx.unsupported_part(ctx.target, other.kind())?,
        }
    }
    Ok(out.join("\n"))
}

fn assistant_message(content: ClaudeContent, ctx: &TranslateCtx<'_>) -> TransformResult<ChatMessage> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in content.into_blocks() {
        match block {
            ContentBlock::Text { text: t, .. } => text.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = if input.is_null() { "{}".to_string() } else { input.to_string() };
                tool_calls.push(ToolCall::function(id, name, arguments));
            }
            ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. } => {
                debug!(event = "thinking_block_skipped", "prior thinking block not forwarded");
            }
            other => ctx.unsupported_part(ctx.target, other.kind())?,
        }
    }
    Ok(ChatMessage {
        role: ChatRole::Assistant,
        content: (!text.is_empty() || tool_calls.is_empty()).then_some(ChatContent::Text(text)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        ..ChatMessage::default()
    })
}

fn convert_tool(tool: ClaudeTool, ctx: &TranslateCtx<'_>) -> TransformResult<Option<ChatTool>> {
    if tool.input_schema.is_none() && tool.kind.is_some() {
        let kind = tool.kind.unwrap_or_default();
        ctx.unsupported_part(ctx.target, &format!("server_tool:{kind}"))?;
        return Ok(None);
    }
    Ok(Some(ChatTool::function(FunctionDefinition {
        name: tool.name,
        description: tool.description,
        parameters: Some(
            tool.input_schema
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        ),
    })))
}

/// Map an extended-thinking budget onto an effort level.
fn reasoning_effort(thinking: &Value) -> Option<String> {
    if thinking.get("type").and_then(Value::as_str) != Some("enabled") {
        return None;
    }
    let budget = thinking.get("budget_tokens").and_then(Value::as_u64).unwrap_or(0);
    let effort = match budget {
        0..=2048 => "low",
        2049..=8192 => "medium",
        _ => "high",
    };
    Some(effort.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TranslateCtx<'static> {
        TranslateCtx::new(WireFormat::Claude, WireFormat::OpenAIChat, "gpt-4o", false)
    }

    #[test]
    fn tool_results_become_tool_messages_before_user_text() {
        let body = json!({
            "model": "claude-sonnet-4",
            "system": [{"type": "text", "text": "sys"}],
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "checking"},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "sunny"},
                    {"type": "text", "text": "thanks"}
                ]}
            ]
        });
        let out = transform_request(body, &ctx()).unwrap();
        let roles: Vec<_> = out.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::Tool, ChatRole::User]
        );
        let call = &out.messages[2].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, "toolu_1");
        assert_eq!(call.function.arguments, "{\"city\":\"Paris\"}");
        assert_eq!(out.messages[3].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(out.messages[3].text_content(), "sunny");
        assert_eq!(out.max_tokens, Some(100));
    }

    #[test]
    fn base64_image_becomes_data_url() {
        let body = json!({
            "model": "c",
            "messages": [{"role": "user", "content": [
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "Zm9v"}},
                {"type": "text", "text": "what is this"}
            ]}]
        });
        let out = transform_request(body, &ctx()).unwrap();
        let Some(ChatContent::Parts(parts)) = &out.messages[0].content else {
            panic!("unexpected content");
        };
        assert_eq!(
            parts[0],
            ChatContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/jpeg;base64,Zm9v".to_string(),
                    detail: None
                }
            }
        );
    }

    #[test]
    fn rejected_parts_fail_under_reject_policy() {
        let body = json!({
            "model": "c",
            "messages": [{"role": "user", "content": [
                {"type": "document", "source": {"type": "base64", "media_type": "application/pdf", "data": "x"}}
            ]}]
        });
        let reject = ctx().with_part_policy(crate::PartPolicy::Reject);
        let err = transform_request(body.clone(), &reject).unwrap_err();
        assert!(matches!(err, crate::TransformError::UnsupportedContentPart { .. }));
        let dropped = transform_request(body, &ctx()).unwrap();
        assert!(dropped.messages.is_empty());
    }

    #[test]
    fn thinking_budget_maps_to_effort() {
        assert_eq!(reasoning_effort(&json!({"type": "enabled", "budget_tokens": 10000})).as_deref(), Some("high"));
        assert_eq!(reasoning_effort(&json!({"type": "disabled"})), None);
    }
}
