use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::gemini::{
    Candidate, Content, FunctionCall, GenerateContentResponse, Part, UsageMetadata,
};
use omnigate_protocol::openai_chat::{ChatResponse, ChatUsage, ToolCall};

use crate::error::TransformResult;
use crate::generate_content::{finish, parse_arguments, to_value};

pub fn transform_response(resp: ChatResponse) -> TransformResult<Value> {
    let mut parts = Vec::new();
    let mut finish_reason = None;
    if let Some(choice) = resp.choices.into_iter().next() {
        let message = choice.message;
        if let Some(reasoning) = message.reasoning_content.filter(|r| !r.is_empty()) {
            parts.push(thought(reasoning));
        }
        let text = message.content.map(|c| c.text()).unwrap_or_default();
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
        parts.extend(message.tool_calls.unwrap_or_default().into_iter().map(function_call));
        finish_reason = choice.finish_reason;
    }

    let out = GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts,
            }),
            finish_reason: Some(finish::to_gemini(finish_reason.as_deref().unwrap_or("stop")).to_string()),
            index: Some(0),
        }],
        usage_metadata: resp.usage.map(usage_metadata),
        model_version: (!resp.model.is_empty()).then_some(resp.model),
        response_id: (!resp.id.is_empty()).then_some(resp.id),
    };
    to_value(WireFormat::Gemini, &out)
}

pub(crate) fn thought(text: String) -> Part {
    Part {
        text: Some(text),
        thought: Some(true),
        ..Part::default()
    }
}

pub(crate) fn function_call(call: ToolCall) -> Part {
    Part {
        function_call: Some(FunctionCall {
            id: Some(call.id),
            name: call.function.name,
            args: parse_arguments(&call.function.arguments),
        }),
        ..Part::default()
    }
}

pub(crate) fn usage_metadata(usage: ChatUsage) -> UsageMetadata {
    UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens,
        total_token_count: usage.total_tokens,
        thoughts_token_count: None,
    }
}
