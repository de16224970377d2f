use bytes::Bytes;
use serde_json::json;

use omnigate_protocol::sse::encode_sse;
use omnigate_protocol::{ErrorBody, SseParser, StreamFraming, WireFormat};
use omnigate_transform::{StreamEvent, decode_stream_event};

/// One complete upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(StreamEvent),
    /// The literal `[DONE]` terminal marker.
    Done,
    /// A frame whose payload did not parse.
    Malformed { data: String, error: String },
}

/// Splits upstream bytes into frames of one format.
///
/// Bytes are buffered until a whole frame is available, so chunk boundaries
/// may fall anywhere (inside a line, a JSON value or a UTF-8 sequence).
#[derive(Debug)]
pub struct StreamDecoder {
    format: WireFormat,
    sse: SseParser,
    lines: Vec<u8>,
}

impl StreamDecoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            sse: SseParser::new(),
            lines: Vec::new(),
        }
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<Frame> {
        match self.format.stream_framing() {
            StreamFraming::Sse => {
                let events = self.sse.push_bytes(chunk);
                events.iter().filter_map(|ev| self.decode(&ev.data)).collect()
            }
            StreamFraming::Ndjson => {
                self.lines.extend_from_slice(chunk);
                let mut out = Vec::new();
                while let Some(pos) = self.lines.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = self.lines.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    if let Some(frame) = self.decode(&line) {
                        out.push(frame);
                    }
                }
                out
            }
        }
    }

    pub fn finish(&mut self) -> Vec<Frame> {
        match self.format.stream_framing() {
            StreamFraming::Sse => {
                let events = self.sse.finish();
                events.iter().filter_map(|ev| self.decode(&ev.data)).collect()
            }
            StreamFraming::Ndjson => {
                let rest = std::mem::take(&mut self.lines);
                let line = String::from_utf8_lossy(&rest).into_owned();
                self.decode(&line).into_iter().collect()
            }
        }
    }

    fn decode(&self, data: &str) -> Option<Frame> {
        let data = data.trim();
        if data.is_empty() {
            return None;
        }
        // Ollama lines sometimes arrive SSE-wrapped behind proxies.
        let data = data.strip_prefix("data:").map(str::trim).unwrap_or(data);
        if data == "[DONE]" {
            return Some(Frame::Done);
        }
        Some(match decode_stream_event(self.format, data) {
            Ok(event) => Frame::Event(event),
            Err(err) => Frame::Malformed {
                data: data.to_string(),
                error: err.to_string(),
            },
        })
    }
}

pub fn encode_openai_chat_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// A terminal error frame in the client's format.
pub fn encode_error_frame(client: WireFormat, status: u16, message: &str) -> Bytes {
    match client {
        WireFormat::Claude => {
            let (kind, _, _) = omnigate_protocol::error_kind_for_status(status);
            let payload = json!({
                "type": "error",
                "error": {"type": kind, "message": message},
            });
            encode_sse(Some("error"), &payload.to_string())
        }
        WireFormat::OpenAIResponses => {
            let body = ErrorBody::new(status, message);
            let payload = json!({
                "type": "error",
                "code": body.error.code,
                "message": body.error.message,
            });
            encode_sse(Some("error"), &payload.to_string())
        }
        WireFormat::Ollama => {
            let mut line = json!({"error": message}).to_string();
            line.push('\n');
            Bytes::from(line)
        }
        _ => encode_sse(None, &ErrorBody::new(status, message).to_json()),
    }
}
