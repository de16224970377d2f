//! Upstream stream -> client stream.
//!
//! Same-format streams are forwarded byte for byte. Otherwise each upstream
//! frame is decoded, fed through a per-request [`StreamTransformer`] and
//! re-encoded in the client's format as soon as it is complete.
//!
//! A translated stream that stops before its terminal event, or an upstream
//! read that fails in either mode, ends with an error frame instead of the
//! normal terminal marker.

mod wire;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{ByteStream, UpstreamStream};
use omnigate_transform::{StreamTransformer, needs_translation};

use crate::controller::StreamController;
use crate::error::ChatError;
use crate::request_log::{MAX_LOG_BODY_BYTES, RequestLog, append_capped};

pub use wire::{Frame, StreamDecoder, encode_error_frame, encode_openai_chat_done};

/// Bound on frames queued for a slow client.
pub const RELAY_CHANNEL_CAPACITY: usize = 32;

struct Translating {
    client: WireFormat,
    decoder: StreamDecoder,
    transformer: StreamTransformer,
    frames: usize,
    /// A terminal event (or `[DONE]`) was seen upstream.
    terminated: bool,
    ended: bool,
    failed: bool,
}

enum RelayMode {
    Passthrough,
    Translate(Box<Translating>),
}

/// Synchronous core of the relay: bytes in, client frames out.
pub struct StreamRelay {
    mode: RelayMode,
    client: WireFormat,
    interrupted: bool,
}

impl StreamRelay {
    pub fn new(upstream: WireFormat, client: WireFormat) -> Self {
        if !needs_translation(upstream, client) {
            return Self::passthrough(client);
        }
        Self {
            mode: RelayMode::Translate(Box::new(Translating {
                client,
                decoder: StreamDecoder::new(upstream),
                transformer: StreamTransformer::new(upstream, client),
                frames: 0,
                terminated: false,
                ended: false,
                failed: false,
            })),
            client,
            interrupted: false,
        }
    }

    pub fn passthrough(client: WireFormat) -> Self {
        Self {
            mode: RelayMode::Passthrough,
            client,
            interrupted: false,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.mode, RelayMode::Passthrough)
    }

    /// Whether the stream failed closed; later input is ignored.
    pub fn is_failed(&self) -> bool {
        match &self.mode {
            RelayMode::Passthrough => self.interrupted,
            RelayMode::Translate(state) => state.failed,
        }
    }

    pub fn push(&mut self, chunk: Bytes) -> Vec<Bytes> {
        match &mut self.mode {
            RelayMode::Passthrough => vec![chunk],
            RelayMode::Translate(state) => {
                let frames = state.decoder.push_bytes(&chunk);
                state.handle(frames)
            }
        }
    }

    /// End of the upstream body. Flushes held state and the terminal marker,
    /// or an error frame when the upstream never sent its terminal event.
    pub fn finish(&mut self) -> Vec<Bytes> {
        match &mut self.mode {
            RelayMode::Passthrough => Vec::new(),
            RelayMode::Translate(state) => {
                let frames = state.decoder.finish();
                let mut out = state.handle(frames);
                if !state.terminated && !state.ended && !state.failed {
                    warn!(event = "upstream_stream_truncated", frames = state.frames);
                    out.push(state.fail(502, "[502]: upstream stream ended before completion"));
                }
                out.extend(state.end());
                out
            }
        }
    }

    /// The upstream read failed mid-stream. Emits one error frame in the
    /// client's format and fails the relay.
    pub fn interrupt(&mut self, message: &str) -> Vec<Bytes> {
        match &mut self.mode {
            RelayMode::Passthrough if !self.interrupted => {
                self.interrupted = true;
                vec![encode_error_frame(self.client, 502, message)]
            }
            RelayMode::Translate(state) if !state.ended && !state.failed => vec![state.fail(502, message)],
            _ => Vec::new(),
        }
    }
}

impl Translating {
    fn handle(&mut self, frames: Vec<Frame>) -> Vec<Bytes> {
        let mut out = Vec::new();
        for frame in frames {
            if self.ended || self.failed {
                break;
            }
            match frame {
                Frame::Done => {
                    self.terminated = true;
                    out.extend(self.end());
                }
                Frame::Malformed { data, error } => {
                    self.frames += 1;
                    if self.frames == 1 {
                        warn!(event = "stream_first_frame_invalid", error = %error);
                        out.push(self.fail(502, &format!("invalid upstream stream: {error}")));
                    } else {
                        warn!(
                            event = "stream_frame_skipped",
                            error = %error,
                            bytes = data.len(),
                        );
                    }
                }
                Frame::Event(event) => {
                    self.frames += 1;
                    self.terminated |= event.is_terminal();
                    match self.transformer.push(event) {
                        Ok(events) => self.encode_into(events, &mut out),
                        Err(err) => {
                            warn!(event = "stream_transform_error", error = %err);
                            out.push(self.fail(502, &err.to_string()));
                        }
                    }
                }
            }
        }
        out
    }

    fn end(&mut self) -> Vec<Bytes> {
        if self.ended || self.failed {
            return Vec::new();
        }
        self.ended = true;
        let mut out = Vec::new();
        let events = self.transformer.finish();
        self.encode_into(events, &mut out);
        if self.client.has_done_marker() {
            out.push(encode_openai_chat_done());
        }
        out
    }

    fn fail(&mut self, status: u16, message: &str) -> Bytes {
        self.failed = true;
        encode_error_frame(self.client, status, message)
    }

    fn encode_into(&mut self, events: Vec<omnigate_transform::StreamEvent>, out: &mut Vec<Bytes>) {
        for event in events {
            match event.encode(self.client) {
                Ok(bytes) => out.push(bytes),
                Err(err) => warn!(event = "stream_frame_skipped", error = %err),
            }
        }
    }
}

/// Spawn the relay task and return the client side of the stream.
///
/// The task ends when the upstream body ends, the stream fails, or the
/// client drops its receiver. The last case aborts the controller, which
/// cancels the upstream call and fires `on_disconnect`.
pub fn spawn_relay(
    upstream: UpstreamStream,
    mut relay: StreamRelay,
    controller: Arc<StreamController>,
    log: RequestLog,
) -> ByteStream {
    let (tx_out, rx_out) = mpsc::channel::<Bytes>(RELAY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut rx_in = upstream;
        let mut upstream_log = Vec::new();
        let mut client_log = Vec::new();
        let mut disconnected = false;

        'stream_loop: loop {
            let chunk = tokio::select! {
                biased;
                _ = tx_out.closed() => {
                    disconnected = true;
                    break 'stream_loop;
                }
                _ = controller.token().cancelled() => {
                    disconnected = true;
                    break 'stream_loop;
                }
                chunk = rx_in.recv() => chunk,
            };
            let pushed = match chunk {
                None => break 'stream_loop,
                Some(Ok(chunk)) => {
                    append_capped(&mut upstream_log, &chunk, MAX_LOG_BODY_BYTES);
                    relay.push(chunk)
                }
                Some(Err(failure)) => {
                    let message = ChatError::from(failure).message();
                    warn!(event = "upstream_stream_interrupted", error = %message);
                    log.error(&message, None);
                    relay.interrupt(&message)
                }
            };
            for bytes in pushed {
                append_capped(&mut client_log, &bytes, MAX_LOG_BODY_BYTES);
                if tx_out.send(bytes).await.is_err() {
                    disconnected = true;
                    break 'stream_loop;
                }
            }
            if relay.is_failed() {
                break 'stream_loop;
            }
        }

        if !disconnected && !relay.is_failed() {
            for bytes in relay.finish() {
                append_capped(&mut client_log, &bytes, MAX_LOG_BODY_BYTES);
                if tx_out.send(bytes).await.is_err() {
                    disconnected = true;
                    break;
                }
            }
        }
        drop(rx_in);

        if disconnected {
            controller.abort();
        } else if relay.is_failed() {
            controller.fail();
        } else {
            controller.complete();
        }
        debug!(
            event = "stream_relay_finished",
            state = ?controller.state(),
            upstream_bytes = upstream_log.len(),
            client_bytes = client_log.len(),
        );
        log.upstream_stream(upstream_log);
        if !relay.is_passthrough() {
            log.client_stream(client_log);
        }
    });
    rx_out
}
