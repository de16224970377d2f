use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::headers::Headers;

pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

/// One read from a streaming upstream body. An `Err` is the last item.
pub type UpstreamChunk = Result<Bytes, UpstreamFailure>;

pub type UpstreamStream = tokio::sync::mpsc::Receiver<UpstreamChunk>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub is_stream: bool,
}

impl UpstreamHttpRequest {
    pub fn post(url: impl Into<String>, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers,
            body: Some(body.into()),
            is_stream: false,
        }
    }

    pub fn get(url: impl Into<String>, headers: Headers) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers,
            body: None,
            is_stream: false,
        }
    }
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(UpstreamStream),
}

impl UpstreamBody {
    /// Drain the body into one buffer. A stream that fails mid-way yields
    /// what arrived before the failure.
    pub async fn collect(self) -> Bytes {
        match self {
            UpstreamBody::Bytes(bytes) => bytes,
            UpstreamBody::Stream(mut rx) => {
                let mut buf = BytesMut::new();
                while let Some(Ok(chunk)) = rx.recv().await {
                    buf.extend_from_slice(&chunk);
                }
                buf.freeze()
            }
        }
    }
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

impl UpstreamHttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamTransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

#[derive(Debug, Clone)]
pub enum UpstreamFailure {
    /// No HTTP response was received, or its body broke off mid-stream.
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
    /// A non-2xx response captured as bytes.
    Http {
        status: u16,
        headers: Headers,
        body: Bytes,
    },
}

impl UpstreamFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamFailure::Transport { .. } => None,
            UpstreamFailure::Http { status, .. } => Some(*status),
        }
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::Transport { kind, message } => {
                write!(f, "transport error ({kind:?}): {message}")
            }
            UpstreamFailure::Http { status, body, .. } => {
                write!(f, "{status} {}", String::from_utf8_lossy(body))
            }
        }
    }
}

pub type UpstreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamFailure>> + Send + 'a>>;

/// Performs upstream IO. Implementations return any HTTP response they
/// receive, whatever its status; [`UpstreamFailure::Transport`] is reserved
/// for calls that produced no response.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a>;
}
