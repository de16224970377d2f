//! Wire-level shapes for every chat protocol the gateway speaks.
//!
//! The types here are deliberately lean: they model the fields the translators
//! read or write, and keep everything else in `extra` maps so same-format
//! traffic never loses data.

pub mod claude;
pub mod error_body;
pub mod format;
pub mod gemini;
pub mod ollama;
pub mod openai_chat;
pub mod openai_responses;
pub mod sse;

pub use error_body::{ErrorBody, ErrorDetail, error_kind_for_status};
pub use format::{StreamFraming, UnknownWireFormat, WireFormat};
pub use sse::{SseEvent, SseParser};
