use serde_json::{Map, Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::claude::{
    ClaudeContent, ClaudeMessage, ClaudeRole, ClaudeTool, ContentBlock, ImageSource,
    MessagesRequest,
};
use omnigate_protocol::openai_chat::{ChatContent, ChatContentPart, ChatRequest, ChatRole};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{parse_arguments, parse_data_url, to_value, tool_choice_to_claude};

/// Anthropic requires `max_tokens`; used when the client sent no limit.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

pub fn transform_request(req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let output_limit = req.output_limit();
    let mut system = Vec::new();
    let mut messages: Vec<ClaudeMessage> = Vec::new();

    for message in req.messages {
        match message.role {
            ChatRole::System | ChatRole::Developer => {
                let text = message.text_content();
                if !text.is_empty() {
                    system.push(text);
                }
            }
            ChatRole::User => {
                let blocks = match message.content {
                    Some(content) => user_blocks(content, ctx)?,
                    None => Vec::new(),
                };
                push_blocks(&mut messages, ClaudeRole::User, blocks);
            }
            ChatRole::Assistant => {
                let mut blocks = Vec::new();
                let text = message.content.map(|c| c.text()).unwrap_or_default();
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(text));
                }
                for call in message.tool_calls.unwrap_or_default() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id,
                        name: call.function.name,
                        input: parse_arguments(&call.function.arguments),
                    });
                }
                push_blocks(&mut messages, ClaudeRole::Assistant, blocks);
            }
            ChatRole::Tool => {
                let text = message.content.map(|c| c.text()).unwrap_or_default();
                push_blocks(
                    &mut messages,
                    ClaudeRole::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: message.tool_call_id.unwrap_or_default(),
                        content: Some(ClaudeContent::Text(text)),
                        is_error: None,
                    }],
                );
            }
        }
    }

    let mut tools = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        match tool.function {
            Some(function) => tools.push(ClaudeTool {
                kind: None,
                name: function.name,
                description: function.description,
                input_schema: Some(
                    function
                        .parameters
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                ),
            }),
            None => ctx.unsupported_part(ctx.target, &format!("tool:{}", tool.kind))?,
        }
    }

    let thinking = req.reasoning_effort.as_deref().and_then(thinking_budget);
    let mut max_tokens = output_limit.unwrap_or(DEFAULT_MAX_TOKENS);
    let mut temperature = req.temperature.map(|t| t.clamp(0.0, 1.0));
    if let Some(budget) = thinking {
        max_tokens = max_tokens.max(budget + 1024);
        // extended thinking only accepts the default temperature
        temperature = None;
    }

    let out = MessagesRequest {
        model: ctx.model.to_string(),
        messages,
        system: (!system.is_empty()).then(|| ClaudeContent::Text(system.join("\n\n"))),
        max_tokens: Some(max_tokens),
        temperature,
        top_p: req.top_p,
        top_k: None,
        stop_sequences: req.stop.map(|s| s.into_vec()),
        stream: Some(ctx.stream),
        tool_choice: if tools.is_empty() {
            None
        } else {
            req.tool_choice.as_ref().and_then(tool_choice_to_claude)
        },
        tools: (!tools.is_empty()).then_some(tools),
        thinking: thinking.map(|budget| json!({"type": "enabled", "budget_tokens": budget})),
        metadata: None,
        extra: Map::new(),
    };
    to_value(WireFormat::Claude, &out)
}

fn user_blocks(content: ChatContent, ctx: &TranslateCtx<'_>) -> TransformResult<Vec<ContentBlock>> {
    let mut blocks = Vec::new();
    for part in content.into_parts() {
        match part {
            ChatContentPart::Text { text } => {
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(text));
                }
            }
            ChatContentPart::ImageUrl { image_url } => {
                let source = match parse_data_url(&image_url.url) {
                    Some((media_type, data)) => ImageSource {
                        kind: "base64".to_string(),
                        media_type: Some(media_type),
                        data: Some(data),
                        url: None,
                    },
                    None => ImageSource {
                        kind: "url".to_string(),
                        media_type: None,
                        data: None,
                        url: Some(image_url.url),
                    },
                };
                blocks.push(ContentBlock::Image { source });
            }
            other => ctx.unsupported_part(ctx.target, other.kind())?,
        }
    }
    Ok(blocks)
}

/// Append blocks, merging into the previous message when the role repeats.
fn push_blocks(messages: &mut Vec<ClaudeMessage>, role: ClaudeRole, blocks: Vec<ContentBlock>) {
    if blocks.is_empty() {
        return;
    }
    if let Some(last) = messages.last_mut()
        && last.role == role
    {
        let mut merged = std::mem::replace(&mut last.content, ClaudeContent::Blocks(Vec::new()))
            .into_blocks();
        merged.extend(blocks);
        last.content = ClaudeContent::Blocks(merged);
        return;
    }
    messages.push(ClaudeMessage {
        role,
        content: ClaudeContent::Blocks(blocks),
    });
}

fn thinking_budget(effort: &str) -> Option<u64> {
    match effort {
        "minimal" | "low" => Some(1024),
        "medium" => Some(8192),
        "high" => Some(24576),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(body: Value) -> Value {
        let req: ChatRequest = serde_json::from_value(body).unwrap();
        let ctx = TranslateCtx::new(WireFormat::OpenAIChat, WireFormat::Claude, "claude-sonnet-4", true);
        transform_request(req, &ctx).unwrap()
    }

    #[test]
    fn defaults_and_system_extraction() {
        let out = translate(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ],
            "temperature": 1.7,
            "presence_penalty": 0.5
        }));
        assert_eq!(out["system"], "be brief");
        assert_eq!(out["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(out["temperature"], 1.0);
        assert_eq!(out["stream"], true);
        assert!(out.get("presence_penalty").is_none());
        assert_eq!(out["messages"][0]["content"][0]["text"], "hi");
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let out = translate(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "go"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}},
                    {"id": "b", "type": "function", "function": {"name": "g", "arguments": "{\"x\":2}"}}
                ]},
                {"role": "tool", "tool_call_id": "a", "content": "1"},
                {"role": "tool", "tool_call_id": "b", "content": "2"}
            ]
        }));
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["input"], json!({"x": 2}));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "b");
    }

    #[test]
    fn reasoning_effort_enables_thinking() {
        let out = translate(json!({
            "model": "o3",
            "messages": [{"role": "user", "content": "think"}],
            "reasoning_effort": "medium",
            "max_tokens": 100,
            "temperature": 0.2
        }));
        assert_eq!(out["thinking"]["budget_tokens"], 8192);
        assert_eq!(out["max_tokens"], 8192 + 1024);
        assert!(out.get("temperature").is_none());
    }
}
