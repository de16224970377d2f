use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use omnigate_protocol::{ErrorBody, WireFormat};
use omnigate_provider_core::{ByteStream, ProviderError, UpstreamFailure};
use omnigate_transform::TransformError;

/// Why a chat call did not produce a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The client went away before the upstream answered.
    ClientAbort,
    /// No HTTP response was received from the upstream.
    UpstreamTransport(String),
    /// The upstream answered with a non-2xx status.
    UpstreamRejected { status: u16, message: String },
    /// The request body could not be translated for the target format.
    InvalidRequest(String),
    /// The provider could not build the upstream call.
    Provider { status: u16, message: String },
}

impl ChatError {
    pub fn status(&self) -> u16 {
        match self {
            ChatError::ClientAbort => 499,
            ChatError::UpstreamTransport(_) => 502,
            ChatError::UpstreamRejected { status, .. } => *status,
            ChatError::InvalidRequest(_) => 400,
            ChatError::Provider { status, .. } => *status,
        }
    }

    /// The caller-facing message, prefixed with the status code except for aborts.
    pub fn message(&self) -> String {
        match self {
            ChatError::ClientAbort => "Request aborted".to_string(),
            ChatError::UpstreamTransport(message) => format_provider_error(502, message),
            ChatError::UpstreamRejected { status, message } => format_provider_error(*status, message),
            ChatError::InvalidRequest(message) => format_provider_error(400, message),
            ChatError::Provider { status, message } => format_provider_error(*status, message),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ChatError {}

impl From<TransformError> for ChatError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::TranslatorMissing { .. } => ChatError::Provider {
                status: 500,
                message: err.to_string(),
            },
            other => ChatError::InvalidRequest(other.to_string()),
        }
    }
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        let status = match err {
            ProviderError::MissingCredentialField(_) => 401,
            ProviderError::Unsupported(_) | ProviderError::InvalidConfig(_) => 400,
            ProviderError::Other(_) => 500,
        };
        ChatError::Provider {
            status,
            message: err.to_string(),
        }
    }
}

impl From<UpstreamFailure> for ChatError {
    fn from(err: UpstreamFailure) -> Self {
        match err {
            UpstreamFailure::Transport { message, .. } => ChatError::UpstreamTransport(message),
            UpstreamFailure::Http { status, body, .. } => ChatError::UpstreamRejected {
                status,
                message: parse_upstream_error(status, &body),
            },
        }
    }
}

pub fn format_provider_error(status: u16, message: &str) -> String {
    format!("[{status}]: {message}")
}

/// Pull a human readable message out of an upstream error body.
///
/// Tries `error.message`, then `message`, then `error`, then the raw text.
pub fn parse_upstream_error(status: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("Upstream error: {status}");
    }
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    let picked = json
        .pointer("/error/message")
        .filter(|value| is_present(value))
        .or_else(|| json.get("message").filter(|value| is_present(value)))
        .or_else(|| json.get("error").filter(|value| is_present(value)));
    match picked {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => text.to_string(),
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        _ => true,
    }
}

/// The response half of a [`ChatResult`].
#[derive(Debug)]
pub enum ProxyResponse {
    Json { status: u16, body: Bytes },
    Stream { content_type: &'static str, body: ByteStream },
}

/// Outcome of one chat call. Errors never escape the orchestrator; they are
/// reported here together with a ready-to-send error body.
#[derive(Debug)]
pub struct ChatResult {
    pub success: bool,
    pub status: u16,
    pub error: Option<String>,
    pub response: ProxyResponse,
}

impl ChatResult {
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            success: true,
            status: 200,
            error: None,
            response: ProxyResponse::Json {
                status: 200,
                body: body.into(),
            },
        }
    }

    pub fn stream(format: WireFormat, body: ByteStream) -> Self {
        Self {
            success: true,
            status: 200,
            error: None,
            response: ProxyResponse::Stream {
                content_type: stream_content_type(format),
                body,
            },
        }
    }

    pub fn error(err: &ChatError) -> Self {
        Self::error_with(err.status(), err.message())
    }

    pub fn error_with(status: u16, message: String) -> Self {
        let body = ErrorBody::new(status, message.clone()).to_json();
        Self {
            success: false,
            status,
            error: Some(message),
            response: ProxyResponse::Json {
                status,
                body: Bytes::from(body),
            },
        }
    }
}

pub fn stream_content_type(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Ollama => "application/x-ndjson",
        _ => "text/event-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_extraction_order() {
        assert_eq!(
            parse_upstream_error(429, br#"{"error":{"message":"rate limited"}}"#),
            "rate limited"
        );
        assert_eq!(parse_upstream_error(400, br#"{"message":"bad field"}"#), "bad field");
        assert_eq!(parse_upstream_error(401, br#"{"error":"invalid_token"}"#), "invalid_token");
        assert_eq!(
            parse_upstream_error(400, br#"{"error":{"code":7}}"#),
            r#"{"code":7}"#
        );
        assert_eq!(parse_upstream_error(500, b"gateway exploded"), "gateway exploded");
        assert_eq!(parse_upstream_error(503, b""), "Upstream error: 503");
    }

    #[test]
    fn taxonomy_statuses_and_messages() {
        assert_eq!(ChatError::ClientAbort.status(), 499);
        assert_eq!(ChatError::ClientAbort.message(), "Request aborted");
        let transport = ChatError::UpstreamTransport("connection refused".into());
        assert_eq!(transport.status(), 502);
        assert_eq!(transport.message(), "[502]: connection refused");

        let rejected: ChatError = UpstreamFailure::Http {
            status: 429,
            headers: Vec::new(),
            body: Bytes::from_static(br#"{"error":{"message":"rate limited"}}"#),
        }
        .into();
        assert_eq!(rejected.message(), "[429]: rate limited");
    }

    #[test]
    fn error_result_carries_openai_body() {
        let result = ChatResult::error(&ChatError::UpstreamRejected {
            status: 404,
            message: "no such model".into(),
        });
        assert!(!result.success);
        assert_eq!(result.status, 404);
        let ProxyResponse::Json { status, body } = result.response else {
            panic!("expected json");
        };
        assert_eq!(status, 404);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "[404]: no such model");
        assert_eq!(json["error"]["code"], "model_not_found");
    }
}
