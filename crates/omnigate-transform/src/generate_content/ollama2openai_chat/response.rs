use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::ollama::{OllamaChatResponse, OllamaFunctionCall, OllamaMessage, OllamaToolCall};
use omnigate_protocol::openai_chat::{ChatResponse, ToolCall};

use crate::error::TransformResult;
use crate::generate_content::{finish, now_rfc3339, parse_arguments, to_value};

pub fn transform_response(resp: ChatResponse) -> TransformResult<Value> {
    let mut message = OllamaMessage {
        role: "assistant".to_string(),
        ..OllamaMessage::default()
    };
    let mut finish_reason = None;
    if let Some(choice) = resp.choices.into_iter().next() {
        message.content = choice.message.content.map(|c| c.text()).unwrap_or_default();
        message.thinking = choice.message.reasoning_content.filter(|r| !r.is_empty());
        message.tool_calls = choice
            .message
            .tool_calls
            .filter(|calls| !calls.is_empty())
            .map(|calls| calls.into_iter().map(tool_call).collect());
        finish_reason = choice.finish_reason;
    }

    let out = OllamaChatResponse {
        model: resp.model,
        created_at: now_rfc3339(),
        message,
        done: true,
        done_reason: Some(finish::to_ollama(finish_reason.as_deref().unwrap_or("stop")).to_string()),
        total_duration: None,
        prompt_eval_count: resp.usage.map(|u| u.prompt_tokens),
        eval_count: resp.usage.map(|u| u.completion_tokens),
    };
    to_value(WireFormat::Ollama, &out)
}

pub(crate) fn tool_call(call: ToolCall) -> OllamaToolCall {
    OllamaToolCall {
        function: OllamaFunctionCall {
            name: call.function.name,
            arguments: parse_arguments(&call.function.arguments),
        },
    }
}
