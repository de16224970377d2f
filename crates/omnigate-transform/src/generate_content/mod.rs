//! Request, response and stream codecs between each format and the OpenAI
//! chat hub.
//!
//! Module `a2b` translates for a client speaking `a` against an upstream
//! speaking `b`: its `request` converts `a -> b`, while `response` and
//! `stream` convert `b -> a`.

pub mod claude2openai_chat;
pub mod gemini2openai_chat;
pub mod gemini_cli;
pub mod ollama2openai_chat;
pub mod openai_chat;
pub mod openai_chat2claude;
pub mod openai_chat2gemini;
pub mod openai_chat2ollama;
pub mod openai_chat2openai_response;
pub mod openai_response2openai_chat;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{ChatRequest, ChatResponse};

use crate::context::TranslateCtx;
use crate::error::{TransformError, TransformResult};

pub type RequestToHub = fn(Value, &TranslateCtx<'_>) -> TransformResult<ChatRequest>;
pub type RequestFromHub = fn(ChatRequest, &TranslateCtx<'_>) -> TransformResult<Value>;
pub type ResponseToHub = fn(Value) -> TransformResult<ChatResponse>;
pub type ResponseFromHub = fn(ChatResponse) -> TransformResult<Value>;

/// The four hub legs a format must provide to take part in translation.
#[derive(Clone, Copy)]
pub struct FormatCodec {
    pub format: WireFormat,
    pub request_to_hub: RequestToHub,
    pub request_from_hub: RequestFromHub,
    pub response_to_hub: ResponseToHub,
    pub response_from_hub: ResponseFromHub,
}

impl std::fmt::Debug for FormatCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatCodec")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Codecs compiled into this crate.
pub fn builtin_codecs() -> Vec<FormatCodec> {
    vec![
        FormatCodec {
            format: WireFormat::OpenAIChat,
            request_to_hub: openai_chat::parse_request,
            request_from_hub: openai_chat::emit_request,
            response_to_hub: openai_chat::parse_response,
            response_from_hub: openai_chat::emit_response,
        },
        FormatCodec {
            format: WireFormat::Claude,
            request_to_hub: claude2openai_chat::request::transform_request,
            request_from_hub: openai_chat2claude::request::transform_request,
            response_to_hub: openai_chat2claude::response::transform_response,
            response_from_hub: claude2openai_chat::response::transform_response,
        },
        FormatCodec {
            format: WireFormat::Gemini,
            request_to_hub: gemini2openai_chat::request::transform_request,
            request_from_hub: openai_chat2gemini::request::transform_request,
            response_to_hub: openai_chat2gemini::response::transform_response,
            response_from_hub: gemini2openai_chat::response::transform_response,
        },
        FormatCodec {
            format: WireFormat::GeminiCli,
            request_to_hub: gemini_cli::request_to_hub,
            request_from_hub: gemini_cli::request_from_hub,
            response_to_hub: gemini_cli::response_to_hub,
            response_from_hub: gemini_cli::response_from_hub,
        },
        FormatCodec {
            format: WireFormat::OpenAIResponses,
            request_to_hub: openai_response2openai_chat::request::transform_request,
            request_from_hub: openai_chat2openai_response::request::transform_request,
            response_to_hub: openai_chat2openai_response::response::transform_response,
            response_from_hub: openai_response2openai_chat::response::transform_response,
        },
        FormatCodec {
            format: WireFormat::Ollama,
            request_to_hub: ollama2openai_chat::request::transform_request,
            request_from_hub: openai_chat2ollama::request::transform_request,
            response_to_hub: openai_chat2ollama::response::transform_response,
            response_from_hub: ollama2openai_chat::response::transform_response,
        },
    ]
}

pub(crate) fn parse<T: DeserializeOwned>(format: WireFormat, value: Value) -> TransformResult<T> {
    serde_json::from_value(value).map_err(|err| TransformError::invalid(format, err))
}

pub(crate) fn to_value<T: Serialize>(format: WireFormat, value: &T) -> TransformResult<Value> {
    serde_json::to_value(value).map_err(|err| TransformError::invalid(format, err))
}

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Split a `data:<mime>;base64,<data>` URL.
pub(crate) fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    Some((mime.to_string(), data.to_string()))
}

pub(crate) fn data_url(mime: &str, data: &str) -> String {
    format!("data:{mime};base64,{data}")
}

/// Tool-call arguments arrive as a JSON string; targets that need an object get
/// `{}` for empty or non-object input.
pub(crate) fn parse_arguments(arguments: &str) -> Value {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
        Err(_) => {
            tracing::warn!(
                event = "tool_arguments_unparsable",
                length = arguments.len(),
                "tool call arguments are not valid JSON"
            );
            Value::Object(Map::new())
        }
    }
}

pub(crate) fn arguments_string(args: &Value) -> String {
    match args {
        Value::Null => "{}".to_string(),
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Convert an OpenAI `tool_choice` into the Anthropic shape.
pub(crate) fn tool_choice_to_claude(choice: &Value) -> Option<Value> {
    match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => Some(serde_json::json!({"type": "auto"})),
            "required" => Some(serde_json::json!({"type": "any"})),
            "none" => Some(serde_json::json!({"type": "none"})),
            _ => None,
        },
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(|name| serde_json::json!({"type": "tool", "name": name})),
        _ => None,
    }
}

/// Convert an Anthropic `tool_choice` into the OpenAI shape.
pub(crate) fn tool_choice_from_claude(choice: &Value) -> Option<Value> {
    match choice.get("type").and_then(Value::as_str)? {
        "auto" => Some(Value::String("auto".to_string())),
        "any" => Some(Value::String("required".to_string())),
        "none" => Some(Value::String("none".to_string())),
        "tool" => choice
            .get("name")
            .and_then(Value::as_str)
            .map(|name| serde_json::json!({"type": "function", "function": {"name": name}})),
        _ => None,
    }
}

pub(crate) mod finish {
    //! Finish reasons. The hub uses OpenAI's `stop | length | tool_calls | content_filter`.

    pub fn from_claude(reason: &str) -> &'static str {
        match reason {
            "max_tokens" => "length",
            "tool_use" => "tool_calls",
            "refusal" => "content_filter",
            _ => "stop",
        }
    }

    pub fn to_claude(reason: &str) -> &'static str {
        match reason {
            "length" => "max_tokens",
            "tool_calls" | "function_call" => "tool_use",
            "content_filter" => "refusal",
            _ => "end_turn",
        }
    }

    pub fn from_gemini(reason: &str, saw_tool: bool) -> &'static str {
        match reason {
            "MAX_TOKENS" => "length",
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                "content_filter"
            }
            _ if saw_tool => "tool_calls",
            _ => "stop",
        }
    }

    pub fn to_gemini(reason: &str) -> &'static str {
        match reason {
            "length" => "MAX_TOKENS",
            "content_filter" => "SAFETY",
            _ => "STOP",
        }
    }

    pub fn from_ollama(reason: Option<&str>, saw_tool: bool) -> &'static str {
        match reason {
            _ if saw_tool => "tool_calls",
            Some("length") => "length",
            _ => "stop",
        }
    }

    pub fn to_ollama(reason: &str) -> &'static str {
        match reason {
            "length" => "length",
            _ => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_urls() {
        assert_eq!(
            parse_data_url("data:image/png;base64,AAAA"),
            Some(("image/png".to_string(), "AAAA".to_string()))
        );
        assert_eq!(parse_data_url("https://example.com/cat.png"), None);
        assert_eq!(data_url("image/jpeg", "Zm9v"), "data:image/jpeg;base64,Zm9v");
    }

    #[test]
    fn arguments_always_become_objects() {
        assert_eq!(parse_arguments(""), serde_json::json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_arguments("[1]"), serde_json::json!({"value": [1]}));
        assert_eq!(parse_arguments("{broken"), serde_json::json!({}));
    }

    #[test]
    fn tool_choice_maps_both_ways() {
        let forced = serde_json::json!({"type": "function", "function": {"name": "f"}});
        let claude = tool_choice_to_claude(&forced).unwrap();
        assert_eq!(claude, serde_json::json!({"type": "tool", "name": "f"}));
        assert_eq!(tool_choice_from_claude(&claude).unwrap(), forced);
        assert_eq!(
            tool_choice_from_claude(&serde_json::json!({"type": "any"})).unwrap(),
            "required"
        );
    }
}
