use serde_json::{Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{ChatResponse, ChatUsage};
use omnigate_protocol::openai_responses::{OutputItem, ResponseObject, ResponsesPart, ResponsesUsage};

use crate::error::TransformResult;
use crate::generate_content::{new_id, to_value};

pub fn transform_response(resp: ChatResponse) -> TransformResult<Value> {
    let mut output = Vec::new();
    let mut finish_reason = None;
    if let Some(choice) = resp.choices.into_iter().next() {
        let message = choice.message;
        if let Some(reasoning) = message.reasoning_content.filter(|r| !r.is_empty()) {
            output.push(reasoning_item(new_id("rs_"), reasoning));
        }
        let text = message.content.map(|c| c.text()).unwrap_or_default();
        if !text.is_empty() {
            output.push(message_item(new_id("msg_"), text, "completed"));
        }
        for call in message.tool_calls.unwrap_or_default() {
            output.push(function_call_item(
                new_id("fc_"),
                call.id,
                call.function.name,
                call.function.arguments,
                "completed",
            ));
        }
        finish_reason = choice.finish_reason;
    }

    let out = response_object(
        response_id(&resp.id),
        resp.model,
        resp.created,
        finish_reason.as_deref(),
        output,
        resp.usage,
    );
    to_value(WireFormat::OpenAIResponses, &out)
}

/// Responses ids carry a `resp_` prefix.
pub(crate) fn response_id(id: &str) -> String {
    if id.starts_with("resp_") {
        id.to_string()
    } else if id.is_empty() {
        new_id("resp_")
    } else {
        format!("resp_{id}")
    }
}

pub(crate) fn response_object(
    id: String,
    model: String,
    created_at: i64,
    finish_reason: Option<&str>,
    output: Vec<OutputItem>,
    usage: Option<ChatUsage>,
) -> ResponseObject {
    let truncated = finish_reason == Some("length");
    ResponseObject {
        id,
        object: "response".to_string(),
        created_at,
        model,
        status: if truncated { "incomplete" } else { "completed" }.to_string(),
        output,
        usage: usage.map(|u| ResponsesUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        incomplete_details: truncated.then(|| json!({"reason": "max_output_tokens"})),
        error: None,
    }
}

pub(crate) fn message_item(id: String, text: String, status: &str) -> OutputItem {
    OutputItem {
        kind: "message".to_string(),
        id: Some(id),
        role: Some("assistant".to_string()),
        status: Some(status.to_string()),
        content: Some(if text.is_empty() && status != "completed" {
            Vec::new()
        } else {
            vec![ResponsesPart::output_text(text)]
        }),
        ..OutputItem::default()
    }
}

pub(crate) fn reasoning_item(id: String, text: String) -> OutputItem {
    let summary = if text.is_empty() {
        Vec::new()
    } else {
        vec![json!({"type": "summary_text", "text": text})]
    };
    OutputItem {
        kind: "reasoning".to_string(),
        id: Some(id),
        summary: Some(summary),
        ..OutputItem::default()
    }
}

pub(crate) fn function_call_item(
    id: String,
    call_id: String,
    name: String,
    arguments: String,
    status: &str,
) -> OutputItem {
    OutputItem {
        kind: "function_call".to_string(),
        id: Some(id),
        status: Some(status.to_string()),
        call_id: Some(call_id),
        name: Some(name),
        arguments: Some(arguments),
        ..OutputItem::default()
    }
}
