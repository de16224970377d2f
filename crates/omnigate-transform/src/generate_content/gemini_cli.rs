//! The Cloud Code envelope around Gemini bodies.
//!
//! Requests are `{model, project, request}`, responses and stream chunks are
//! `{response}`. Translation unwraps, reuses the Gemini codecs, and rewraps.

use serde_json::{Map, Value};

use omnigate_protocol::WireFormat;
use omnigate_protocol::gemini::{CliRequest, CliResponse, GenerateContentRequest, GenerateContentResponse};
use omnigate_protocol::openai_chat::{ChatRequest, ChatResponse};

use super::{gemini2openai_chat, openai_chat2gemini, parse, to_value};
use crate::context::TranslateCtx;
use crate::error::TransformResult;

pub fn request_to_hub(body: Value, ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    let inner = unwrap_request(body)?;
    gemini2openai_chat::request::transform_request(inner, ctx)
}

pub fn request_from_hub(req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let inner = openai_chat2gemini::request::transform_request(req, ctx)?;
    wrap_request(inner, ctx)
}

pub fn response_to_hub(body: Value) -> TransformResult<ChatResponse> {
    openai_chat2gemini::response::transform_response(unwrap_response(body))
}

pub fn response_from_hub(resp: ChatResponse) -> TransformResult<Value> {
    let inner = gemini2openai_chat::response::transform_response(resp)?;
    Ok(wrap_response(inner))
}

/// Extract the inner Gemini request from an envelope.
pub fn unwrap_request(body: Value) -> TransformResult<Value> {
    let envelope: CliRequest = parse(WireFormat::GeminiCli, body)?;
    to_value(WireFormat::Gemini, &envelope.request)
}

/// Wrap a Gemini request, taking the project id from the credentials.
pub fn wrap_request(inner: Value, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    let request: GenerateContentRequest = parse(WireFormat::Gemini, inner)?;
    let envelope = CliRequest {
        model: ctx.model.to_string(),
        project: ctx.provider_str("projectId").map(str::to_string),
        request,
        extra: Map::new(),
    };
    to_value(WireFormat::GeminiCli, &envelope)
}

/// Strip the `response` wrapper; bare Gemini bodies pass through.
pub fn unwrap_response(body: Value) -> Value {
    match body {
        Value::Object(mut obj) if obj.contains_key("response") => {
            obj.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub fn wrap_response(inner: Value) -> Value {
    let mut obj = Map::new();
    obj.insert("response".to_string(), inner);
    Value::Object(obj)
}

pub fn wrap_stream_chunk(chunk: &GenerateContentResponse) -> TransformResult<Value> {
    to_value(
        WireFormat::GeminiCli,
        &CliResponse {
            response: chunk.clone(),
        },
    )
}
