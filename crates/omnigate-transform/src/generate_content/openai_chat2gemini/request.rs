use std::collections::HashMap;

use serde_json::{Map, Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::gemini::{
    Blob, Content, FileData, FunctionCall, FunctionDeclaration, FunctionResponse, GeminiTool,
    GenerateContentRequest, GenerationConfig, Part,
};
use omnigate_protocol::openai_chat::{ChatContentPart, ChatRequest, ChatRole};

use crate::context::TranslateCtx;
use crate::error::TransformResult;
use crate::generate_content::{parse_arguments, parse_data_url, to_value};

/// JSON-schema keywords Gemini's OpenAPI subset rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties", "strict", "$id"];

pub fn transform_request(req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let output_limit = req.output_limit();
    let mut system = Vec::new();
    let mut contents: Vec<Content> = Vec::new();
    // functionResponse needs the function name; the hub only carries the call id.
    let mut call_names: HashMap<String, String> = HashMap::new();

    for message in req.messages {
        match message.role {
            ChatRole::System | ChatRole::Developer => {
                let text = message.text_content();
                if !text.is_empty() {
                    system.push(Part::text(text));
                }
            }
            ChatRole::User => {
                let mut parts = Vec::new();
                if let Some(content) = message.content {
                    for part in content.into_parts() {
                        match part {
                            ChatContentPart::Text { text } => parts.push(Part::text(text)),
                            ChatContentPart::ImageUrl { image_url } => {
                                parts.push(match parse_data_url(&image_url.url) {
                                    Some((mime_type, data)) => Part {
                                        inline_data: Some(Blob { mime_type, data }),
                                        ..Part::default()
                                    },
                                    None => Part {
                                        file_data: Some(FileData {
                                            mime_type: None,
                                            file_uri: image_url.url,
                                        }),
                                        ..Part::default()
                                    },
                                });
                            }
                            other => ctx.unsupported_part(ctx.target, other.kind())?,
                        }
                    }
                }
                push_content(&mut contents, "user", parts);
            }
            ChatRole::Assistant => {
                let mut parts = Vec::new();
                let text = message.content.map(|c| c.text()).unwrap_or_default();
                if !text.is_empty() {
                    parts.push(Part::text(text));
                }
                for call in message.tool_calls.unwrap_or_default() {
                    call_names.insert(call.id.clone(), call.function.name.clone());
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: call.function.name,
                            args: parse_arguments(&call.function.arguments),
                        }),
                        ..Part::default()
                    });
                }
                push_content(&mut contents, "model", parts);
            }
            ChatRole::Tool => {
                let id = message.tool_call_id.unwrap_or_default();
                let name = call_names
                    .get(&id)
                    .cloned()
                    .or(message.name)
                    .unwrap_or_else(|| "unknown_function".to_string());
                let text = message.content.map(|c| c.text()).unwrap_or_default();
                let response = match serde_json::from_str::<Value>(&text) {
                    Ok(value @ Value::Object(_)) => value,
                    _ => json!({ "content": text }),
                };
                push_content(
                    &mut contents,
                    "user",
                    vec![Part {
                        function_response: Some(FunctionResponse {
                            id: None,
                            name,
                            response,
                        }),
                        ..Part::default()
                    }],
                );
            }
        }
    }

    let mut declarations = Vec::new();
    for tool in req.tools.unwrap_or_default() {
        match tool.function {
            Some(function) => declarations.push(FunctionDeclaration {
                name: function.name,
                description: function.description,
                parameters: function.parameters.map(clean_schema),
            }),
            None => ctx.unsupported_part(ctx.target, &format!("tool:{}", tool.kind))?,
        }
    }

    let config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        max_output_tokens: output_limit,
        stop_sequences: req.stop.map(|s| s.into_vec()),
        thinking_config: req
            .reasoning_effort
            .as_deref()
            .and_then(thinking_budget)
            .map(|budget| json!({"thinkingBudget": budget, "includeThoughts": true})),
        ..GenerationConfig::default()
    };
    let has_config = config != GenerationConfig::default();

    let out = GenerateContentRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: system,
        }),
        generation_config: has_config.then_some(config),
        tool_config: if declarations.is_empty() {
            None
        } else {
            req.tool_choice.as_ref().and_then(tool_config)
        },
        tools: (!declarations.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: Some(declarations),
                extra: Map::new(),
            }]
        }),
        safety_settings: None,
        extra: Map::new(),
    };
    to_value(WireFormat::Gemini, &out)
}

fn push_content(contents: &mut Vec<Content>, role: &str, parts: Vec<Part>) {
    if parts.is_empty() {
        return;
    }
    if let Some(last) = contents.last_mut()
        && last.role.as_deref() == Some(role)
    {
        last.parts.extend(parts);
        return;
    }
    contents.push(Content {
        role: Some(role.to_string()),
        parts,
    });
}

/// Strip schema keywords Gemini refuses, recursively.
pub(crate) fn clean_schema(schema: Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key, clean_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_schema).collect()),
        other => other,
    }
}

fn tool_config(choice: &Value) -> Option<Value> {
    let calling = match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => json!({"mode": "AUTO"}),
            "required" => json!({"mode": "ANY"}),
            "none" => json!({"mode": "NONE"}),
            _ => return None,
        },
        Value::Object(_) => {
            let name = choice.get("function")?.get("name")?.as_str()?;
            json!({"mode": "ANY", "allowedFunctionNames": [name]})
        }
        _ => return None,
    };
    Some(json!({ "functionCallingConfig": calling }))
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
        let ctx = TranslateCtx::new(WireFormat::OpenAIChat, WireFormat::Gemini, "gemini-2.5-pro", false);
        transform_request(req, &ctx).unwrap()
    }

    #[test]
    fn roles_system_and_config() {
        let out = translate(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "terse"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": [{"type": "text", "text": "img"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,/9j/"}}]}
            ],
            "max_completion_tokens": 50,
            "stop": "END"
        }));
        assert_eq!(out["systemInstruction"]["parts"][0]["text"], "terse");
        assert_eq!(out["contents"][1]["role"], "model");
        assert_eq!(out["contents"][2]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(out["generationConfig"]["maxOutputTokens"], 50);
        assert_eq!(out["generationConfig"]["stopSequences"], json!(["END"]));
        assert!(out.get("model").is_none());
        assert!(out.get("stream").is_none());
    }

    #[test]
    fn tool_results_recover_function_names() {
        let out = translate(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_9", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_9", "content": "rainy"}
            ],
            "tools": [{"type": "function", "function": {"name": "weather", "parameters": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object", "additionalProperties": false,
                "properties": {"city": {"type": "string"}}
            }}}],
            "tool_choice": "required"
        }));
        let response = &out["contents"][2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "weather");
        assert_eq!(response["response"]["content"], "rainy");
        let params = &out["tools"][0]["functionDeclarations"][0]["parameters"];
        assert!(params.get("$schema").is_none());
        assert!(params.get("additionalProperties").is_none());
        assert_eq!(out["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
    }
}
