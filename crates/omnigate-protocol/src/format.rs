use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The chat protocol a request body (or response stream) is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireFormat {
    #[serde(rename = "openai-chat")]
    OpenAIChat,
    #[serde(rename = "openai-responses")]
    OpenAIResponses,
    #[serde(rename = "anthropic-messages")]
    Claude,
    #[serde(rename = "gemini-generate")]
    Gemini,
    /// Gemini request wrapped in the Cloud Code `{model, project, request}` envelope.
    #[serde(rename = "gemini-cli")]
    GeminiCli,
    #[serde(rename = "ollama-chat")]
    Ollama,
}

/// How a format frames its streaming responses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    Sse,
    Ndjson,
}

impl WireFormat {
    pub const ALL: [WireFormat; 6] = [
        WireFormat::OpenAIChat,
        WireFormat::OpenAIResponses,
        WireFormat::Claude,
        WireFormat::Gemini,
        WireFormat::GeminiCli,
        WireFormat::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::OpenAIChat => "openai-chat",
            WireFormat::OpenAIResponses => "openai-responses",
            WireFormat::Claude => "anthropic-messages",
            WireFormat::Gemini => "gemini-generate",
            WireFormat::GeminiCli => "gemini-cli",
            WireFormat::Ollama => "ollama-chat",
        }
    }

    pub fn stream_framing(&self) -> StreamFraming {
        match self {
            WireFormat::Ollama => StreamFraming::Ndjson,
            _ => StreamFraming::Sse,
        }
    }

    /// Whether the stream ends with a literal `data: [DONE]` frame.
    pub fn has_done_marker(&self) -> bool {
        matches!(self, WireFormat::OpenAIChat)
    }

    /// Whether the request body carries the model id. Gemini puts it in the URL.
    pub fn carries_model(&self) -> bool {
        !matches!(self, WireFormat::Gemini)
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWireFormat(pub String);

impl fmt::Display for UnknownWireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown wire format: {}", self.0)
    }
}

impl std::error::Error for UnknownWireFormat {}

impl FromStr for WireFormat {
    type Err = UnknownWireFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        WireFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| UnknownWireFormat(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for format in WireFormat::ALL {
            assert_eq!(format.as_str().parse::<WireFormat>().unwrap(), format);
        }
        assert!("openai".parse::<WireFormat>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&WireFormat::Claude).unwrap();
        assert_eq!(json, "\"anthropic-messages\"");
    }
}
