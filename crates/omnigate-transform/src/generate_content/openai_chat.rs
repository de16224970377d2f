//! The hub's own legs: parsing and emitting OpenAI chat bodies.

use serde_json::{Value, json};

use omnigate_protocol::WireFormat;
use omnigate_protocol::openai_chat::{ChatRequest, ChatResponse};

use super::{parse, to_value};
use crate::context::TranslateCtx;
use crate::error::TransformResult;

pub fn parse_request(body: Value, _ctx: &TranslateCtx<'_>) -> TransformResult<ChatRequest> {
    parse(WireFormat::OpenAIChat, body)
}

pub fn emit_request(mut req: ChatRequest, ctx: &TranslateCtx<'_>) -> TransformResult<Value> {
    req.model = ctx.model.to_string();
    req.stream = Some(ctx.stream);
    req.stream_options = if ctx.stream {
        let mut options = req
            .stream_options
            .take()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        options["include_usage"] = Value::Bool(true);
        Some(options)
    } else {
        None
    };
    to_value(WireFormat::OpenAIChat, &req)
}

pub fn parse_response(body: Value) -> TransformResult<ChatResponse> {
    parse(WireFormat::OpenAIChat, body)
}

pub fn emit_response(mut resp: ChatResponse) -> TransformResult<Value> {
    if resp.object.is_empty() {
        resp.object = "chat.completion".to_string();
    }
    to_value(WireFormat::OpenAIChat, &resp)
}
