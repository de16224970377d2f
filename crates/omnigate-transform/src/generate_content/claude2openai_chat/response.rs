use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::claude::{ClaudeRole, ClaudeUsage, ContentBlock, MessagesResponse};
use omnigate_protocol::openai_chat::ChatResponse;

use crate::error::TransformResult;
use crate::generate_content::{finish, new_id, parse_arguments, to_value};

pub fn transform_response(resp: ChatResponse) -> TransformResult<Value> {
    let choice = resp.choices.into_iter().next().unwrap_or_default();
    let message = choice.message;

    let mut content = Vec::new();
    if let Some(reasoning) = message.reasoning_content.filter(|r| !r.is_empty()) {
        content.push(ContentBlock::Thinking {
            thinking: reasoning,
            signature: None,
        });
    }
    let text = message.content.map(|c| c.text()).unwrap_or_default();
    if !text.is_empty() {
        content.push(ContentBlock::text(text));
    }
    for call in message.tool_calls.unwrap_or_default() {
        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input: parse_arguments(&call.function.arguments),
        });
    }

    let usage = resp.usage.unwrap_or_default();
    let out = MessagesResponse {
        id: if resp.id.is_empty() { new_id("msg_") } else { resp.id },
        kind: "message".to_string(),
        role: ClaudeRole::Assistant,
        model: resp.model,
        content,
        stop_reason: Some(
            finish::to_claude(choice.finish_reason.as_deref().unwrap_or("stop")).to_string(),
        ),
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            ..ClaudeUsage::default()
        },
    };
    to_value(WireFormat::Claude, &out)
}
