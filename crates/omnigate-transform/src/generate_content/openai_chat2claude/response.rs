use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::claude::{ContentBlock, MessagesResponse};
use omnigate_protocol::openai_chat::{
    ChatChoice, ChatContent, ChatMessage, ChatResponse, ChatRole, ChatUsage, ToolCall,
};

use crate::error::TransformResult;
use crate::generate_content::{arguments_string, finish, now_unix, parse};

pub fn transform_response(body: Value) -> TransformResult<ChatResponse> {
    let resp: MessagesResponse = parse(WireFormat::Claude, body)?;

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    for block in resp.content {
        match block {
            ContentBlock::Text { text: t, .. } => text.push_str(&t),
            ContentBlock::Thinking { thinking, .. } => reasoning.push_str(&thinking),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, arguments_string(&input)));
            }
            _ => {}
        }
    }

    let usage = &resp.usage;
    let prompt_tokens = usage.input_tokens
        + usage.cache_read_input_tokens.unwrap_or(0)
        + usage.cache_creation_input_tokens.unwrap_or(0);

    Ok(ChatResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created: now_unix(),
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: (!text.is_empty() || tool_calls.is_empty())
                    .then_some(ChatContent::Text(text)),
                name: None,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            },
            finish_reason: Some(
                finish::from_claude(resp.stop_reason.as_deref().unwrap_or("end_turn")).to_string(),
            ),
        }],
        usage: Some(ChatUsage::new(prompt_tokens, resp.usage.output_tokens)),
    })
}
