use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use omnigate_common::GatewayConfig;
use omnigate_core::{ChatCore, ChatRequest, ChatResult, ClientRawRequest, ProxyResponse};
use omnigate_protocol::{ErrorBody, WireFormat};
use omnigate_provider_core::Headers;

use crate::models::{
    estimate_tokens, gemini_model_list, listed_models, ollama_tags, openai_model_list,
};
use crate::resolve::resolve_model;
use crate::store::CredentialStore;

#[derive(Clone)]
pub struct ProxyState {
    pub core: Arc<ChatCore>,
    pub store: Arc<CredentialStore>,
    pub config: Arc<GatewayConfig>,
}

pub fn proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(openai_chat_completions))
        .route("/v1/responses", post(openai_responses))
        .route("/v1/messages", post(claude_messages))
        .route("/v1/messages/count_tokens", post(claude_count_tokens))
        .route("/v1/models", get(models_list_v1))
        .route("/v1beta/models", get(gemini_models_list))
        .route("/v1beta/models/{*name}", post(gemini_post))
        .route("/api/chat", post(ollama_chat))
        .route("/api/tags", get(ollama_models_list))
        .with_state(state)
}

async fn openai_chat_completions(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = ChatRoute::detect("/v1/chat/completions");
    forward_chat(&state, route, &headers, body).await
}

async fn openai_responses(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = ChatRoute::new("/v1/responses", WireFormat::OpenAIResponses);
    forward_chat(&state, route, &headers, body).await
}

async fn claude_messages(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = ChatRoute::new("/v1/messages", WireFormat::Claude);
    forward_chat(&state, route, &headers, body).await
}

async fn ollama_chat(State(state): State<ProxyState>, headers: HeaderMap, body: Bytes) -> Response {
    let route = ChatRoute::new("/api/chat", WireFormat::Ollama);
    forward_chat(&state, route, &headers, body).await
}

async fn gemini_post(
    State(state): State<ProxyState>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((model, action)) = split_model_action(&model_action) else {
        return error_response(StatusCode::BAD_REQUEST, "bad_gemini_model_action");
    };
    let endpoint = format!("/v1beta/models/{model}:{action}");
    let gemini = |stream| ChatRoute {
        path_model: Some(model),
        stream: Some(stream),
        ..ChatRoute::new(&endpoint, WireFormat::Gemini)
    };
    match action {
        "generateContent" => forward_chat(&state, gemini(false), &headers, body).await,
        "streamGenerateContent" => forward_chat(&state, gemini(true), &headers, body).await,
        "countTokens" => match parse_object(&body) {
            Ok(body) => Json(json!({ "totalTokens": estimate_tokens(&body) })).into_response(),
            Err(resp) => resp,
        },
        _ => error_response(StatusCode::NOT_FOUND, "unsupported_gemini_action"),
    }
}

async fn claude_count_tokens(body: Bytes) -> Response {
    match parse_object(&body) {
        Ok(body) => Json(json!({ "input_tokens": estimate_tokens(&body) })).into_response(),
        Err(resp) => resp,
    }
}

async fn models_list_v1(State(state): State<ProxyState>) -> Response {
    let models = listed_models(&state.config, state.core.providers(), &state.store);
    Json(openai_model_list(&models)).into_response()
}

async fn gemini_models_list(State(state): State<ProxyState>) -> Response {
    let models = listed_models(&state.config, state.core.providers(), &state.store);
    Json(gemini_model_list(&models)).into_response()
}

async fn ollama_models_list(State(state): State<ProxyState>) -> Response {
    let models = listed_models(&state.config, state.core.providers(), &state.store);
    Json(ollama_tags(&models)).into_response()
}

/// What the endpoint itself says about a chat call.
struct ChatRoute<'a> {
    endpoint: &'a str,
    /// `None` on the shared OpenAI path, where the body decides.
    source: Option<WireFormat>,
    path_model: Option<&'a str>,
    stream: Option<bool>,
}

impl<'a> ChatRoute<'a> {
    fn new(endpoint: &'a str, source: WireFormat) -> Self {
        Self {
            source: Some(source),
            ..Self::detect(endpoint)
        }
    }

    fn detect(endpoint: &'a str) -> Self {
        Self {
            endpoint,
            source: None,
            path_model: None,
            stream: None,
        }
    }
}

/// Resolve the model, load the provider's credentials and run the call.
async fn forward_chat(state: &ProxyState, route: ChatRoute<'_>, headers: &HeaderMap, body: Bytes) -> Response {
    let ChatRoute {
        endpoint,
        source,
        path_model,
        stream,
    } = route;
    let body = match parse_object(&body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let requested = path_model
        .or_else(|| body.get("model").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let resolved = match resolve_model(&state.config, state.core.providers(), &requested) {
        Ok(resolved) => resolved,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    let (Some(slot), Some(hooks)) = (
        state.store.slot(resolved.provider),
        state.store.hooks(resolved.provider),
    ) else {
        let message = format!("provider not configured: {}", resolved.provider);
        return error_response(StatusCode::BAD_REQUEST, &message);
    };

    info!(
        event = "downstream_request",
        endpoint = %endpoint,
        requested = %requested,
        provider = %resolved.provider,
        model = %resolved.model,
    );

    let mut req = ChatRequest::new(body, resolved.provider, &resolved.model, slot.credentials().await)
        .with_hooks(hooks);
    req.base_url = slot.base_url().map(str::to_string);
    req.stream = stream;
    req.source = source;
    req.client_request = Some(ClientRawRequest {
        endpoint: endpoint.to_string(),
        headers: headers_to_vec(headers),
    });

    let result = state.core.handle(req).await;
    if !result.success
        && let Some(error) = &result.error
    {
        state.store.record_error(resolved.provider, error.clone()).await;
    }
    to_axum_response(result)
}

fn to_axum_response(result: ChatResult) -> Response {
    match result.response {
        ProxyResponse::Json { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                body,
            )
                .into_response()
        }
        ProxyResponse::Stream { content_type, body } => {
            let stream = ReceiverStream::new(body).map(Ok::<_, Infallible>);
            let mut resp = Response::new(Body::from_stream(stream));
            let headers = resp.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            // Hint common reverse proxies to avoid buffering streamed responses.
            headers.insert(
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            );
            resp
        }
    }
}

fn parse_object(body: &Bytes) -> Result<Value, Response> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(error_response(StatusCode::BAD_REQUEST, "request body must be a JSON object")),
        Err(err) => Err(error_response(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {err}"))),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        ErrorBody::new(status.as_u16(), message).to_json(),
    )
        .into_response()
}

fn split_model_action(input: &str) -> Option<(&str, &str)> {
    let raw = input.trim().trim_start_matches('/');
    let (model, action) = raw.rsplit_once(':')?;
    let model = model.trim();
    let action = action.trim();
    if model.is_empty() || action.is_empty() {
        return None;
    }
    Some((model, action))
}

fn headers_to_vec(headers: &HeaderMap) -> Headers {
    let mut out: Headers = Vec::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.push((name.as_str().to_string(), v.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_action_split() {
        assert_eq!(
            split_model_action("gc/gemini-2.5-pro:streamGenerateContent"),
            Some(("gc/gemini-2.5-pro", "streamGenerateContent"))
        );
        assert_eq!(split_model_action("gemini-2.5-pro"), None);
        assert_eq!(split_model_action(":generateContent"), None);
    }
}
