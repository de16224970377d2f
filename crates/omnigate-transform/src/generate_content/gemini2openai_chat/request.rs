use std::collections::{HashMap, VecDeque};

use serde_json::{Value, json};
use tracing::debug;

use omnigate_protocol::WireFormat;
use omnigate_protocol::gemini::{Content, GenerateContentRequest, GenerationConfig};
use omnigate_protocol::openai_chat::{
    ChatContent, ChatContentPart, ChatMessage, ChatRequest, ChatRole, ChatTool,
    FunctionDefinition, ImageUrl, StopSequences, ToolCall,
};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{arguments_string, data_url, new_id, parse};

pub fn transform_request(body: Value, ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    let req: GenerateContentRequest = parse(WireFormat::Gemini, body)?;

    let mut messages = Vec::new();
    if let Some(system) = req.system_instruction {
        let text = system.text();
        if !text.is_empty() {
            messages.push(ChatMessage::text(ChatRole::System, text));
        }
    }

    // Gemini pairs calls and responses by name; the hub needs ids.
    let mut pending: HashMap<String, VecDeque<String>> = HashMap::new();
    for content in req.contents {
        if content.role.as_deref() == Some("model") {
            model_turn(content, &mut pending, &mut messages, ctx)?;
        } else {
            user_turn(content, &mut pending, &mut messages, ctx)?;
        }
    }

    let mut tools = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        for declaration in tool.function_declarations.unwrap_or_default() {
            tools.push(ChatTool::function(FunctionDefinition {
                name: declaration.name,
                description: declaration.description,
                parameters: declaration.parameters,
            }));
        }
        for kind in tool.extra.keys() {
            ctx.unsupported_part(ctx.target, &format!("tool:{kind}"))?;
        }
    }

    let config = req.generation_config.unwrap_or_default();
    if config.top_k.is_some() {
        debug!(event = "param_dropped", param = "topK", "hub has no top_k");
    }

    Ok(ChatRequest {
        model: ctx.model.to_string(),
        messages,
        stream: Some(ctx.stream),
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_output_tokens,
        stop: config.stop_sequences.clone().map(StopSequences::Many),
        tool_choice: req.tool_config.as_ref().and_then(tool_choice),
        tools: (!tools.is_empty()).then_some(tools),
        reasoning_effort: reasoning_effort(&config),
        ..ChatRequest::default()
    })
}

fn model_turn(
    content: Content,
    pending: &mut HashMap<String, VecDeque<String>>,
    messages: &mut Vec<ChatMessage>,
    ctx: &TranslateCtx<'_>,
) -> TransformResult<()> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in content.parts {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(t) = part.text {
            text.push_str(&t);
        } else if let Some(call) = part.function_call {
            let id = call.id.unwrap_or_else(|| new_id("call_"));
            pending
                .entry(call.name.clone())
                .or_default()
                .push_back(id.clone());
            tool_calls.push(ToolCall::function(id, call.name, arguments_string(&call.args)));
        } else {
            ctx.unsupported_part(ctx.target, part.kind())?;
        }
    }
    if text.is_empty() && tool_calls.is_empty() {
        return Ok(());
    }
    messages.push(ChatMessage {
        role: ChatRole::Assistant,
        content: (!text.is_empty()).then_some(ChatContent::Text(text)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        ..ChatMessage::default()
    });
    Ok(())
}

fn user_turn(
    content: Content,
    pending: &mut HashMap<String, VecDeque<String>>,
    messages: &mut Vec<ChatMessage>,
    ctx: &TranslateCtx<'_>,
) -> TransformResult<()> {
    let mut parts = Vec::new();
    for part in content.parts {
        if let Some(text) = part.text {
            parts.push(ChatContentPart::Text { text });
        } else if let Some(blob) = part.inline_data {
            if blob.mime_type.starts_with("image/") {
                parts.push(image(data_url(&blob.mime_type, &blob.data)));
            } else {
                ctx.unsupported_part(ctx.target, &format!("inlineData:{}", blob.mime_type))?;
            }
        } else if let Some(file) = part.file_data {
            if file.mime_type.as_deref().is_none_or(|m| m.starts_with("image/")) {
                parts.push(image(file.file_uri));
            } else {
                ctx.unsupported_part(ctx.target, "fileData")?;
            }
        } else if let Some(result) = part.function_response {
            let id = result
                .id
                .or_else(|| pending.get_mut(&result.name).and_then(VecDeque::pop_front))
                .unwrap_or_else(|| new_id("call_"));
            messages.push(ChatMessage {
                role: ChatRole::Tool,
                content: Some(ChatContent::Text(function_output(&result.response))),
                tool_call_id: Some(id),
                ..ChatMessage::default()
            });
        } else {
            ctx.unsupported_part(ctx.target, part.kind())?;
        }
    }
    if parts.is_empty() {
        return Ok(());
    }
    let all_text = parts.iter().all(|p| matches!(p, ChatContentPart::Text { .. }));
    let content = if all_text {
        ChatContent::Text(ChatContent::Parts(parts).text())
    } else {
        ChatContent::Parts(parts)
    };
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: Some(content),
        ..ChatMessage::default()
    });
    Ok(())
}

fn image(url: String) -> ChatContentPart {
    ChatContentPart::ImageUrl {
        image_url: ImageUrl { url, detail: None },
    }
}

/// Tool output as text: a lone `content`/`output` string is unwrapped.
fn function_output(response: &Value) -> String {
    for key in ["content", "output", "result"] {
        if let Some(Value::String(text)) = response.get(key)
            && response.as_object().is_some_and(|o| o.len() == 1)
        {
            return text.clone();
        }
    }
    arguments_string(response)
}

fn tool_choice(config: &Value) -> Option<Value> {
    let calling = config.get("functionCallingConfig")?;
    let allowed: Vec<&str> = calling
        .get("allowedFunctionNames")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    match calling.get("mode").and_then(Value::as_str)? {
        "AUTO" => Some(json!("auto")),
        "NONE" => Some(json!("none")),
        "ANY" if allowed.len() == 1 => {
            Some(json!({"type": "function", "function": {"name": allowed[0]}}))
        }
        "ANY" => Some(json!("required")),
        _ => None,
    }
}

fn reasoning_effort(config: &GenerationConfig) -> Option<String> {
    let budget = config
        .thinking_config
        .as_ref()?
        .get("thinkingBudget")?
        .as_i64()?;
    let effort = match budget {
        i64::MIN..=0 => return None,
        1..=1024 => "low",
        1025..=8192 => "medium",
        _ => "high",
    };
    Some(effort.to_string())
}
