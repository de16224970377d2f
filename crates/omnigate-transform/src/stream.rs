//! Incremental translation of stream events between formats.

use bytes::Bytes;
use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_protocol::claude::ClaudeStreamEvent;
use omnigate_protocol::gemini::GenerateContentResponse;
use omnigate_protocol::ollama::OllamaChatResponse;
use omnigate_protocol::openai_chat::ChatChunk;
use omnigate_protocol::openai_responses::ResponsesStreamEvent;
use omnigate_protocol::sse::encode_sse;

use crate::error::{TransformError, TransformResult};
use crate::generate_content::claude2openai_chat::ChatToClaudeStream;
use crate::generate_content::gemini2openai_chat::ChatToGeminiStream;
use crate::generate_content::gemini_cli;
use crate::generate_content::ollama2openai_chat::ChatToOllamaStream;
use crate::generate_content::openai_chat2claude::ClaudeToChatStream;
use crate::generate_content::openai_chat2gemini::GeminiToChatStream;
use crate::generate_content::openai_chat2ollama::OllamaToChatStream;
use crate::generate_content::openai_chat2openai_response::ResponsesToChatStream;
use crate::generate_content::openai_response2openai_chat::ChatToResponsesStream;

/// One decoded stream event. Gemini and its Cloud Code envelope share a shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    OpenAIChat(ChatChunk),
    OpenAIResponses(ResponsesStreamEvent),
    Claude(ClaudeStreamEvent),
    Gemini(GenerateContentResponse),
    Ollama(OllamaChatResponse),
}

/// Parse one SSE `data:` payload (or NDJSON line) emitted in `format`.
pub fn decode_stream_event(format: WireFormat, data: &str) -> Result<StreamEvent, serde_json::Error> {
    Ok(match format {
        WireFormat::OpenAIChat => StreamEvent::OpenAIChat(serde_json::from_str(data)?),
        WireFormat::OpenAIResponses => StreamEvent::OpenAIResponses(serde_json::from_str(data)?),
        WireFormat::Claude => StreamEvent::Claude(serde_json::from_str(data)?),
        WireFormat::Gemini => StreamEvent::Gemini(serde_json::from_str(data)?),
        WireFormat::GeminiCli => {
            let value: Value = serde_json::from_str(data)?;
            StreamEvent::Gemini(serde_json::from_value(gemini_cli::unwrap_response(value))?)
        }
        WireFormat::Ollama => StreamEvent::Ollama(serde_json::from_str(data)?),
    })
}

impl StreamEvent {
    /// Whether this event closes the stream in its own format. A stream that
    /// ends without one was cut short.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamEvent::OpenAIChat(chunk) => chunk.choices.iter().any(|c| c.finish_reason.is_some()),
            StreamEvent::OpenAIResponses(event) => matches!(
                event,
                ResponsesStreamEvent::Completed { .. }
                    | ResponsesStreamEvent::Incomplete { .. }
                    | ResponsesStreamEvent::Failed { .. }
                    | ResponsesStreamEvent::Error { .. }
            ),
            StreamEvent::Claude(event) => {
                matches!(event, ClaudeStreamEvent::MessageStop | ClaudeStreamEvent::Error { .. })
            }
            StreamEvent::Gemini(chunk) => chunk.candidates.iter().any(|c| c.finish_reason.is_some()),
            StreamEvent::Ollama(line) => line.done,
        }
    }

    /// Encode as one frame of `format`: SSE for most formats, an NDJSON line for Ollama.
    pub fn encode(&self, format: WireFormat) -> TransformResult<Bytes> {
        let json = |value: Result<String, serde_json::Error>| {
            value.map_err(|err| TransformError::invalid(format, err))
        };
        Ok(match self {
            StreamEvent::OpenAIChat(chunk) => encode_sse(None, &json(serde_json::to_string(chunk))?),
            StreamEvent::OpenAIResponses(event) => {
                encode_sse(Some(event.event_name()), &json(serde_json::to_string(event))?)
            }
            StreamEvent::Claude(event) => {
                encode_sse(Some(event.event_name()), &json(serde_json::to_string(event))?)
            }
            StreamEvent::Gemini(chunk) if format == WireFormat::GeminiCli => {
                let wrapped = gemini_cli::wrap_stream_chunk(chunk)?;
                encode_sse(None, &json(serde_json::to_string(&wrapped))?)
            }
            StreamEvent::Gemini(chunk) => encode_sse(None, &json(serde_json::to_string(chunk))?),
            StreamEvent::Ollama(line) => {
                let mut text = json(serde_json::to_string(line))?;
                text.push('\n');
                Bytes::from(text)
            }
        })
    }
}

enum UpstreamLeg {
    Hub,
    Claude(ClaudeToChatStream),
    Gemini(GeminiToChatStream),
    Responses(ResponsesToChatStream),
    Ollama(OllamaToChatStream),
}

enum ClientLeg {
    Hub,
    Claude(ChatToClaudeStream),
    Gemini(ChatToGeminiStream),
    Responses(ChatToResponsesStream),
    Ollama(ChatToOllamaStream),
}

/// Per-request stream state: upstream events in, client events out.
pub struct StreamTransformer {
    upstream: WireFormat,
    client: WireFormat,
    direct: bool,
    up: UpstreamLeg,
    down: ClientLeg,
}

impl std::fmt::Debug for StreamTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransformer")
            .field("upstream", &self.upstream)
            .field("client", &self.client)
            .field("direct", &self.direct)
            .finish_non_exhaustive()
    }
}

fn is_gemini(format: WireFormat) -> bool {
    matches!(format, WireFormat::Gemini | WireFormat::GeminiCli)
}

impl StreamTransformer {
    pub fn new(upstream: WireFormat, client: WireFormat) -> Self {
        let direct = upstream == client || (is_gemini(upstream) && is_gemini(client));
        let up = match upstream {
            WireFormat::OpenAIChat => UpstreamLeg::Hub,
            WireFormat::Claude => UpstreamLeg::Claude(ClaudeToChatStream::new()),
            WireFormat::Gemini | WireFormat::GeminiCli => UpstreamLeg::Gemini(GeminiToChatStream::new()),
            WireFormat::OpenAIResponses => UpstreamLeg::Responses(ResponsesToChatStream::new()),
            WireFormat::Ollama => UpstreamLeg::Ollama(OllamaToChatStream::new()),
        };
        let down = match client {
            WireFormat::OpenAIChat => ClientLeg::Hub,
            WireFormat::Claude => ClientLeg::Claude(ChatToClaudeStream::new()),
            WireFormat::Gemini | WireFormat::GeminiCli => ClientLeg::Gemini(ChatToGeminiStream::new()),
            WireFormat::OpenAIResponses => ClientLeg::Responses(ChatToResponsesStream::new()),
            WireFormat::Ollama => ClientLeg::Ollama(ChatToOllamaStream::new()),
        };
        Self {
            upstream,
            client,
            direct,
            up,
            down,
        }
    }

    pub fn upstream(&self) -> WireFormat {
        self.upstream
    }

    pub fn client(&self) -> WireFormat {
        self.client
    }

    /// Feed one upstream event; returns the client events it produces, in order.
    pub fn push(&mut self, event: StreamEvent) -> TransformResult<Vec<StreamEvent>> {
        if self.direct {
            return Ok(vec![event]);
        }
        let chunks = match (&mut self.up, event) {
            (UpstreamLeg::Hub, StreamEvent::OpenAIChat(chunk)) => vec![chunk],
            (UpstreamLeg::Claude(state), StreamEvent::Claude(event)) => state.push(event)?,
            (UpstreamLeg::Gemini(state), StreamEvent::Gemini(chunk)) => state.push(chunk),
            (UpstreamLeg::Responses(state), StreamEvent::OpenAIResponses(event)) => state.push(event)?,
            (UpstreamLeg::Ollama(state), StreamEvent::Ollama(line)) => state.push(line),
            _ => {
                return Err(TransformError::StreamMismatch {
                    expected: self.upstream,
                });
            }
        };
        Ok(self.emit(chunks))
    }

    /// Flush held state at end of stream. Idempotent.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.direct {
            return Vec::new();
        }
        let chunks = match &mut self.up {
            UpstreamLeg::Hub => Vec::new(),
            UpstreamLeg::Claude(state) => state.finish(),
            UpstreamLeg::Gemini(state) => state.finish(),
            UpstreamLeg::Responses(state) => state.finish(),
            UpstreamLeg::Ollama(state) => state.finish(),
        };
        let mut out = self.emit(chunks);
        match &mut self.down {
            ClientLeg::Hub => {}
            ClientLeg::Claude(state) => out.extend(state.finish().into_iter().map(StreamEvent::Claude)),
            ClientLeg::Gemini(state) => out.extend(state.finish().into_iter().map(StreamEvent::Gemini)),
            ClientLeg::Responses(state) => {
                out.extend(state.finish().into_iter().map(StreamEvent::OpenAIResponses))
            }
            ClientLeg::Ollama(state) => out.extend(state.finish().into_iter().map(StreamEvent::Ollama)),
        }
        out
    }

    fn emit(&mut self, chunks: Vec<ChatChunk>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        for chunk in chunks {
            match &mut self.down {
                ClientLeg::Hub => out.push(StreamEvent::OpenAIChat(chunk)),
                ClientLeg::Claude(state) => out.extend(state.push(chunk).into_iter().map(StreamEvent::Claude)),
                ClientLeg::Gemini(state) => out.extend(state.push(chunk).into_iter().map(StreamEvent::Gemini)),
                ClientLeg::Responses(state) => {
                    out.extend(state.push(chunk).into_iter().map(StreamEvent::OpenAIResponses))
                }
                ClientLeg::Ollama(state) => out.extend(state.push(chunk).into_iter().map(StreamEvent::Ollama)),
            }
        }
        out
    }
}
