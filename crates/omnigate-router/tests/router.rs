use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use omnigate_common::{GatewayConfig, ProviderEntry};
use omnigate_core::{ChatCore, ChatSettings};
use omnigate_provider_core::{
    Credentials, UpstreamBody, UpstreamClient, UpstreamFuture, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamStream, header_get,
};
use omnigate_provider_impl::builtin_registry;
use omnigate_router::{CredentialStore, ProxyState, proxy_router};

enum Reply {
    Json(u16, Value),
    Stream(UpstreamStream),
}

#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<UpstreamHttpRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<UpstreamHttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(req);
            let reply = self.replies.lock().unwrap().pop_front().expect("unscripted call");
            Ok(match reply {
                Reply::Json(status, body) => UpstreamHttpResponse {
                    status,
                    headers: Vec::new(),
                    body: UpstreamBody::Bytes(Bytes::from(body.to_string())),
                },
                Reply::Stream(rx) => UpstreamHttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: UpstreamBody::Stream(rx),
                },
            })
        })
    }
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.providers.insert(
        "openai".into(),
        ProviderEntry {
            credentials: Credentials::api_key("sk-test"),
            base_url: None,
            enabled: true,
        },
    );
    config.providers.insert(
        "gemini".into(),
        ProviderEntry {
            credentials: Credentials::api_key("g-key"),
            base_url: None,
            enabled: true,
        },
    );
    config
        .model_aliases
        .insert("fast".into(), "openai/gpt-4o-mini".into());
    config
}

fn build_app(client: Arc<ScriptedClient>) -> (axum::Router, Arc<CredentialStore>) {
    let config = config();
    let registry = builtin_registry();
    let store = Arc::new(CredentialStore::from_config(&config, &registry));
    let core = ChatCore::new(Arc::new(registry), client, ChatSettings::from_config(&config));
    let state = ProxyState {
        core: Arc::new(core),
        store: store.clone(),
        config: Arc::new(config),
    };
    (proxy_router(state), store)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer client-secret-token")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
    })
}

#[tokio::test]
async fn chat_completion_is_routed_by_provider_prefix() {
    let client = ScriptedClient::new(vec![Reply::Json(200, completion("hello"))]);
    let (app, _) = build_app(client.clone());

    let resp = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "openai/gpt-4o", "stream": false, "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_json(resp).await["choices"][0]["message"]["content"], "hello");

    let seen = client.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "https://api.openai.com/v1/chat/completions");
    assert_eq!(header_get(&seen[0].headers, "authorization"), Some("Bearer sk-test"));
    let sent: Value = serde_json::from_slice(seen[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(sent["model"], "gpt-4o");
}

#[tokio::test]
async fn configured_alias_selects_provider_and_model() {
    let client = ScriptedClient::new(vec![Reply::Json(200, completion("hi"))]);
    let (app, _) = build_app(client.clone());

    let resp = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "fast", "stream": false, "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let sent: Value = serde_json::from_slice(client.seen()[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn unresolvable_models_are_bad_requests() {
    let client = ScriptedClient::new(Vec::new());
    let (app, _) = build_app(client.clone());

    let resp = app
        .clone()
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post(
            "/v1/messages",
            json!({"model": "cc/claude-sonnet-4-5-20250929", "max_tokens": 10, "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["message"], "provider not configured: claude");

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(client.seen().is_empty());
}

#[tokio::test]
async fn upstream_error_is_relayed_and_recorded() {
    let client = ScriptedClient::new(vec![
        Reply::Json(429, json!({"error": {"message": "slow down"}})),
        Reply::Json(200, completion("ok")),
    ]);
    let (app, store) = build_app(client);
    let request = || {
        post(
            "/v1/chat/completions",
            json!({"model": "openai/gpt-4o", "stream": false, "messages": [{"role": "user", "content": "hi"}]}),
        )
    };

    let resp = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"]["message"], "[429]: slow down");
    let slot = store.slot("openai").unwrap();
    assert_eq!(slot.last_error().await.as_deref(), Some("[429]: slow down"));

    let resp = app.oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(slot.last_error().await, None);
}

#[tokio::test]
async fn stream_response_carries_sse_headers() {
    let (tx, rx) = mpsc::channel(4);
    let upstream = "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hey\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
    tx.send(Ok(Bytes::from_static(upstream.as_bytes()))).await.unwrap();
    drop(tx);
    let client = ScriptedClient::new(vec![Reply::Stream(rx)]);
    let (app, _) = build_app(client.clone());

    let resp = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "openai/gpt-4o", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(upstream.as_bytes()));
    assert!(client.seen()[0].is_stream);
}

#[tokio::test]
async fn claude_endpoint_answers_in_claude_shape_without_fingerprints() {
    let client = ScriptedClient::new(vec![Reply::Json(200, completion("hello"))]);
    let (app, _) = build_app(client.clone());

    let resp = app
        .oneshot(post(
            "/v1/messages",
            json!({
                "model": "openai/gpt-4o",
                "max_tokens": 32,
                "stream": false,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["type"], "message");
    assert_eq!(body["content"][0]["text"], "hello");
    assert!(body.get("choices").is_none());

    let sent: Value = serde_json::from_slice(client.seen()[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(sent["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn missing_stream_flag_defaults_to_streaming() {
    let (tx, rx) = mpsc::channel(4);
    let upstream = "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hey\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
    tx.send(Ok(Bytes::from_static(upstream.as_bytes()))).await.unwrap();
    drop(tx);
    let client = ScriptedClient::new(vec![Reply::Stream(rx)]);
    let (app, _) = build_app(client.clone());

    let resp = app
        .oneshot(post(
            "/v1/chat/completions",
            json!({"model": "openai/gpt-4o", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(upstream.as_bytes()));
    assert!(client.seen()[0].is_stream);
}

#[tokio::test]
async fn gemini_path_carries_model_and_stream_flag() {
    let reply = json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": "hi"}]}, "finishReason": "STOP"}]
    });
    let client = ScriptedClient::new(vec![Reply::Json(200, reply.clone())]);
    let (app, _) = build_app(client.clone());

    let body = json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]});
    let resp = app
        .oneshot(post("/v1beta/models/gemini/gemini-2.5-pro:generateContent", body.clone()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, reply);
    let seen = client.seen();
    assert!(seen[0].url.ends_with("/models/gemini-2.5-pro:generateContent"));
    assert!(!seen[0].is_stream);
    let sent: Value = serde_json::from_slice(seen[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(sent, body);
}

#[tokio::test]
async fn model_listings_cover_configured_providers() {
    let (app, _) = build_app(ScriptedClient::new(Vec::new()));

    let body = body_json(app.clone().oneshot(get("/v1/models")).await.unwrap()).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"openai/gpt-4o"));
    assert!(ids.contains(&"gemini/gemini-2.5-pro"));
    assert!(ids.contains(&"fast"));
    assert!(!ids.iter().any(|id| id.starts_with("cc/")));

    let body = body_json(app.clone().oneshot(get("/v1beta/models")).await.unwrap()).await;
    assert!(
        body["models"]
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["name"] == "models/gemini/gemini-2.5-flash")
    );

    let body = body_json(app.oneshot(get("/api/tags")).await.unwrap()).await;
    assert!(body["models"].as_array().unwrap().iter().any(|m| m["name"] == "openai/o3"));
}

#[tokio::test]
async fn count_tokens_estimates_from_text() {
    let (app, _) = build_app(ScriptedClient::new(Vec::new()));
    let resp = app
        .oneshot(post(
            "/v1/messages/count_tokens",
            json!({"model": "cc/claude-sonnet-4-5-20250929", "messages": [{"role": "user", "content": "123456789"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"input_tokens": 3}));
}
