//! The chat orchestrator and everything it drives at request time.

pub mod bypass;
pub mod chat;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod relay;
pub mod request_log;
pub mod upstream_client;

pub use chat::{ChatCore, ChatRequest, ChatSettings, ClientRawRequest};
pub use controller::{AbortGuard, StreamController, StreamState};
pub use error::{ChatError, ChatResult, ProxyResponse, parse_upstream_error};
pub use hooks::{ChatHooks, NoopHooks};
pub use relay::{StreamRelay, spawn_relay};
pub use request_log::{RequestLog, RequestLogSink, mask_headers};
pub use upstream_client::{UpstreamClientConfig, WreqUpstreamClient};
