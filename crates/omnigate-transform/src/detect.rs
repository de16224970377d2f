//! Source format detection.
//!
//! Detection walks [`DETECTION_TABLE`] in order and returns the first format
//! whose predicate matches. It never fails: anything unrecognised is treated
//! as [`DEFAULT_FORMAT`].

use serde_json::Value;

use omnigate_protocol::WireFormat;

pub type Predicate = fn(&Value) -> bool;

pub const DEFAULT_FORMAT: WireFormat = WireFormat::OpenAIChat;

/// Ordered `(predicate, format)` pairs, most specific first.
pub const DETECTION_TABLE: &[(Predicate, WireFormat)] = &[
    (is_openai_responses, WireFormat::OpenAIResponses),
    (is_gemini_cli, WireFormat::GeminiCli),
    (is_gemini, WireFormat::Gemini),
    (is_ollama, WireFormat::Ollama),
    (has_openai_only_fields, WireFormat::OpenAIChat),
    (is_claude, WireFormat::Claude),
];

pub fn detect_format(body: &Value) -> WireFormat {
    DETECTION_TABLE
        .iter()
        .find(|(predicate, _)| predicate(body))
        .map(|(_, format)| *format)
        .unwrap_or(DEFAULT_FORMAT)
}

fn is_openai_responses(body: &Value) -> bool {
    body.get("input").is_some() && body.get("messages").is_none()
}

fn is_gemini_cli(body: &Value) -> bool {
    body.get("request")
        .and_then(|req| req.get("contents"))
        .is_some_and(Value::is_array)
}

fn is_gemini(body: &Value) -> bool {
    body.get("contents").is_some_and(Value::is_array)
}

fn is_ollama(body: &Value) -> bool {
    if body.get("options").is_some_and(Value::is_object)
        || body.get("keep_alive").is_some()
        || body.get("think").is_some()
    {
        return true;
    }
    messages(body).iter().any(|msg| msg.get("images").is_some_and(Value::is_array))
}

const OPENAI_ONLY_FIELDS: &[&str] = &[
    "stream_options",
    "response_format",
    "logprobs",
    "top_logprobs",
    "n",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
    "user",
];

fn has_openai_only_fields(body: &Value) -> bool {
    OPENAI_ONLY_FIELDS.iter().any(|field| body.get(field).is_some())
}

fn is_claude(body: &Value) -> bool {
    if !body.get("messages").is_some_and(Value::is_array) {
        return false;
    }
    if body.get("system").is_some()
        || body.get("anthropic_version").is_some()
        || body.get("stop_sequences").is_some()
        || body.get("top_k").is_some()
    {
        return true;
    }
    if messages(body).iter().any(|msg| {
        msg.get("content")
            .and_then(Value::as_array)
            .is_some_and(|parts| parts.iter().any(is_claude_block))
    }) {
        return true;
    }
    body.get("max_tokens").is_some() && has_only_text_blocks(body)
}

/// Typed text blocks in at least one message, with no OpenAI-only roles or
/// part types anywhere.
fn has_only_text_blocks(body: &Value) -> bool {
    let mut saw_block = false;
    for msg in messages(body) {
        if matches!(
            msg.get("role").and_then(Value::as_str),
            Some("system" | "developer" | "tool")
        ) {
            return false;
        }
        let Some(parts) = msg.get("content").and_then(Value::as_array) else {
            continue;
        };
        for part in parts {
            match part.get("type").and_then(Value::as_str) {
                Some("text") => saw_block = true,
                _ => return false,
            }
        }
    }
    saw_block
}

fn is_claude_block(part: &Value) -> bool {
    match part.get("type").and_then(Value::as_str) {
        Some("tool_use") | Some("tool_result") | Some("thinking") => true,
        Some("image") | Some("document") => part.get("source").is_some(),
        _ => false,
    }
}

fn messages(body: &Value) -> &[Value] {
    body.get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_and_odd_bodies_fall_back_to_default() {
        assert_eq!(detect_format(&json!({})), DEFAULT_FORMAT);
        assert_eq!(detect_format(&json!(null)), DEFAULT_FORMAT);
        assert_eq!(detect_format(&json!([1, 2])), DEFAULT_FORMAT);
        assert_eq!(detect_format(&json!({"contents": "nope"})), DEFAULT_FORMAT);
    }

    #[test]
    fn fingerprints() {
        let cases = [
            (json!({"model": "gpt-5", "input": "hi"}), WireFormat::OpenAIResponses),
            (
                json!({"model": "m", "project": "p", "request": {"contents": []}}),
                WireFormat::GeminiCli,
            ),
            (json!({"contents": [{"parts": [{"text": "hi"}]}]}), WireFormat::Gemini),
            (
                json!({"model": "llama3", "messages": [], "options": {"temperature": 0.1}}),
                WireFormat::Ollama,
            ),
            (
                json!({"model": "llama3", "messages": [{"role": "user", "content": "x", "images": ["aGk="]}]}),
                WireFormat::Ollama,
            ),
            (
                json!({"model": "claude", "system": "be nice", "messages": [], "max_tokens": 10}),
                WireFormat::Claude,
            ),
            (
                json!({"model": "claude", "messages": [{"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "t", "content": "1"}
                ]}]}),
                WireFormat::Claude,
            ),
            (
                json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
                WireFormat::OpenAIChat,
            ),
            (
                json!({"model": "claude", "max_tokens": 64, "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "hi"}
                ]}]}),
                WireFormat::Claude,
            ),
        ];
        for (body, expected) in cases {
            assert_eq!(detect_format(&body), expected, "body: {body}");
        }
    }

    #[test]
    fn openai_only_fields_win_over_claude_hints() {
        let body = json!({
            "model": "gpt-4o",
            "system": "legacy",
            "messages": [],
            "stream_options": {"include_usage": true}
        });
        assert_eq!(detect_format(&body), WireFormat::OpenAIChat);
    }

    #[test]
    fn text_blocks_need_max_tokens_and_no_openai_parts() {
        let without_budget = json!({"model": "m", "messages": [{"role": "user", "content": [
            {"type": "text", "text": "hi"}
        ]}]});
        assert_eq!(detect_format(&without_budget), WireFormat::OpenAIChat);

        let with_image_url = json!({"model": "m", "max_tokens": 10, "messages": [{"role": "user", "content": [
            {"type": "text", "text": "hi"},
            {"type": "image_url", "image_url": {"url": "https://x/y.png"}}
        ]}]});
        assert_eq!(detect_format(&with_image_url), WireFormat::OpenAIChat);

        let with_system_role = json!({"model": "m", "max_tokens": 10, "messages": [
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [{"type": "text", "text": "hi"}]}
        ]});
        assert_eq!(detect_format(&with_system_role), WireFormat::OpenAIChat);
    }

    #[test]
    fn table_order_is_most_specific_first() {
        let formats: Vec<_> = DETECTION_TABLE.iter().map(|(_, f)| *f).collect();
        let cli = formats.iter().position(|f| *f == WireFormat::GeminiCli).unwrap();
        let gemini = formats.iter().position(|f| *f == WireFormat::Gemini).unwrap();
        assert!(cli < gemini);
    }
}
