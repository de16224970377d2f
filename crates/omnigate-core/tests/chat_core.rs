use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use omnigate_core::{ChatCore, ChatHooks, ChatRequest, ChatSettings, ProxyResponse};
use omnigate_protocol::{SseParser, WireFormat};
use omnigate_provider_core::{
    CredentialUpdate, Credentials, Headers, ProviderError, ProviderRegistry, ProviderResult,
    RefreshCtx, RouteCtx, UpstreamBody, UpstreamClient, UpstreamFailure, UpstreamFuture,
    UpstreamHttpRequest, UpstreamHttpResponse, UpstreamProvider, UpstreamStream,
    UpstreamTransportErrorKind, bearer, header_get, header_set,
};

enum Reply {
    Json(u16, Value),
    Stream(UpstreamStream),
    Transport(&'static str),
    Hang,
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

    fn seen_body(&self, index: usize) -> Value {
        serde_json::from_slice(self.seen()[index].body.as_ref().unwrap()).unwrap()
    }
}

impl UpstreamClient for ScriptedClient {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(req);
            let reply = self.replies.lock().unwrap().pop_front().expect("unscripted call");
            match reply {
                Reply::Json(status, body) => Ok(UpstreamHttpResponse {
                    status,
                    headers: Vec::new(),
                    body: UpstreamBody::Bytes(Bytes::from(body.to_string())),
                }),
                Reply::Stream(rx) => Ok(UpstreamHttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: UpstreamBody::Stream(rx),
                }),
                Reply::Transport(message) => Err(UpstreamFailure::Transport {
                    kind: UpstreamTransportErrorKind::Connect,
                    message: message.to_string(),
                }),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

/// A provider whose refresh outcome is scripted.
struct StubProvider {
    name: &'static str,
    format: WireFormat,
    refresh: Option<ProviderResult<Option<CredentialUpdate>>>,
    refresh_calls: AtomicUsize,
}

impl StubProvider {
    fn new(name: &'static str, format: WireFormat) -> Self {
        Self {
            name,
            format,
            refresh: None,
            refresh_calls: AtomicUsize::new(0),
        }
    }

    fn refreshing(mut self, outcome: ProviderResult<Option<CredentialUpdate>>) -> Self {
        self.refresh = Some(outcome);
        self
    }
}

#[async_trait]
impl UpstreamProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_format(&self) -> WireFormat {
        self.format
    }

    fn build_url(&self, _ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        Ok(format!("https://{}.test/v1", self.name))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        let token = ctx
            .credentials
            .bearer_token()
            .ok_or(ProviderError::MissingCredentialField("accessToken"))?;
        bearer(&mut headers, token);
        header_set(&mut headers, "x-stub", "1");
        Ok(headers)
    }

    async fn refresh(
        &self,
        _ctx: &RefreshCtx<'_>,
        _credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh.clone().unwrap_or(Ok(None))
    }
}

#[derive(Default)]
struct Recorder {
    refreshed: Mutex<Vec<CredentialUpdate>>,
    successes: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait]
impl ChatHooks for Recorder {
    async fn on_credentials_refreshed(&self, update: &CredentialUpdate) {
        self.refreshed.lock().unwrap().push(update.clone());
    }

    async fn on_request_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn core_with(provider: StubProvider, client: Arc<ScriptedClient>) -> (ChatCore, Arc<StubProvider>) {
    let provider = Arc::new(provider);
    let mut registry = ProviderRegistry::new();
    registry.register(provider.clone());
    let mut settings = ChatSettings::default();
    settings.bypass.probe_texts = vec!["Warmup".to_string()];
    settings.bypass.reply_text = "OK".to_string();
    (ChatCore::new(Arc::new(registry), client, settings), provider)
}

fn creds() -> Credentials {
    Credentials {
        access_token: Some("old-token".into()),
        refresh_token: Some("rt".into()),
        ..Credentials::default()
    }
}

fn json_body(response: ProxyResponse) -> Value {
    match response {
        ProxyResponse::Json { body, .. } => serde_json::from_slice(&body).unwrap(),
        ProxyResponse::Stream { .. } => panic!("expected a json response"),
    }
}

async fn drain(response: ProxyResponse) -> String {
    let ProxyResponse::Stream { mut body, .. } = response else {
        panic!("expected a stream response");
    };
    let mut out = Vec::new();
    while let Some(chunk) = body.recv().await {
        out.extend_from_slice(&chunk);
    }
    String::from_utf8(out).unwrap()
}

fn openai_text(sse: &str) -> (String, usize) {
    let mut parser = SseParser::new();
    let mut events = parser.push_str(sse);
    events.extend(parser.finish());
    let mut text = String::new();
    let mut done = 0;
    for event in events {
        if event.data == "[DONE]" {
            done += 1;
            continue;
        }
        let chunk: Value = serde_json::from_str(&event.data).unwrap();
        if let Some(delta) = chunk.pointer("/choices/0/delta/content").and_then(Value::as_str) {
            text.push_str(delta);
        }
    }
    (text, done)
}

const CLAUDE_STREAM: &str = concat!(
    "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-x\",\"content\":[],\"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n",
    "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"One, \"}}\n\n",
    "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"two, \"}}\n\n",
    "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"thrée.\"}}\n\n",
    "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\n",
    "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
);

fn chunked(parts: Vec<Bytes>) -> UpstreamStream {
    let (tx, rx) = mpsc::channel(parts.len().max(1));
    for part in parts {
        tx.try_send(Ok(part)).unwrap();
    }
    rx
}

fn stream_request(model: &str) -> Value {
    json!({"model": model, "messages": [{"role": "user", "content": "count"}], "stream": true})
}

#[tokio::test]
async fn same_format_body_only_gets_model_rewritten() {
    let upstream_reply = json!({"id": "chatcmpl-1", "object": "chat.completion", "choices": [], "vendor_field": 1});
    let client = ScriptedClient::new(vec![Reply::Json(200, upstream_reply.clone())]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client.clone());

    let input = json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": false,
        "x-passthrough": {"kept": [1, 2, 3]}
    });
    let result = core
        .handle(ChatRequest::new(input.clone(), "stub", "gpt-4o-2024-08-06", creds()))
        .await;

    assert!(result.success);
    let mut expected = input;
    expected["model"] = json!("gpt-4o-2024-08-06");
    assert_eq!(client.seen_body(0), expected);
    assert_eq!(json_body(result.response), upstream_reply);
}

#[tokio::test]
async fn rate_limit_is_surfaced_without_retry() {
    let client = ScriptedClient::new(vec![Reply::Json(429, json!({"error": {"message": "rate limited"}}))]);
    let (core, provider) = core_with(
        StubProvider::new("stub", WireFormat::OpenAIChat).refreshing(Ok(None)),
        client.clone(),
    );

    let result = core
        .handle(ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds()))
        .await;

    assert!(!result.success);
    assert_eq!(result.status, 429);
    assert_eq!(result.error.as_deref(), Some("[429]: rate limited"));
    assert_eq!(json_body(result.response)["error"]["type"], "rate_limit_error");
    assert_eq!(client.seen().len(), 1);
    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_failure_refreshes_once_and_retries_once() {
    let client = ScriptedClient::new(vec![
        Reply::Json(401, json!({"error": {"message": "token expired"}})),
        Reply::Json(200, json!({"id": "ok", "choices": []})),
    ]);
    let update = CredentialUpdate {
        access_token: Some("new-token".into()),
        ..CredentialUpdate::default()
    };
    let (core, provider) = core_with(
        StubProvider::new("stub", WireFormat::OpenAIChat).refreshing(Ok(Some(update.clone()))),
        client.clone(),
    );
    let hooks = Arc::new(Recorder::default());

    let result = core
        .handle(
            ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds())
                .with_hooks(hooks.clone()),
        )
        .await;

    assert!(result.success);
    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*hooks.refreshed.lock().unwrap(), vec![update]);
    assert_eq!(hooks.successes.load(Ordering::SeqCst), 1);
    let seen = client.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(header_get(&seen[0].headers, "authorization"), Some("Bearer old-token"));
    assert_eq!(header_get(&seen[1].headers, "authorization"), Some("Bearer new-token"));
    assert_eq!(seen[0].body, seen[1].body);
}

#[tokio::test]
async fn failed_refresh_returns_original_error() {
    let client = ScriptedClient::new(vec![Reply::Json(401, json!({"error": {"message": "token expired"}}))]);
    let (core, provider) = core_with(
        StubProvider::new("stub", WireFormat::OpenAIChat)
            .refreshing(Err(ProviderError::Other("refresh_token_failed: 400 invalid_grant".into()))),
        client.clone(),
    );
    let hooks = Arc::new(Recorder::default());

    let result = core
        .handle(
            ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds())
                .with_hooks(hooks.clone()),
        )
        .await;

    assert_eq!(result.status, 401);
    assert_eq!(result.error.as_deref(), Some("[401]: token expired"));
    assert_eq!(client.seen().len(), 1);
    assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(hooks.refreshed.lock().unwrap().is_empty());
    assert_eq!(hooks.successes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_retry_surfaces_the_retry_error() {
    let client = ScriptedClient::new(vec![
        Reply::Json(403, json!({"error": {"message": "forbidden"}})),
        Reply::Json(500, json!({"message": "upstream broke"})),
    ]);
    let update = CredentialUpdate {
        access_token: Some("new-token".into()),
        ..CredentialUpdate::default()
    };
    let (core, _) = core_with(
        StubProvider::new("stub", WireFormat::OpenAIChat).refreshing(Ok(Some(update))),
        client.clone(),
    );

    let result = core
        .handle(ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds()))
        .await;

    assert_eq!(result.status, 500);
    assert_eq!(result.error.as_deref(), Some("[500]: upstream broke"));
    assert_eq!(client.seen().len(), 2);
}

#[tokio::test]
async fn transport_failure_is_bad_gateway() {
    let client = ScriptedClient::new(vec![Reply::Transport("connection refused")]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client);

    let result = core
        .handle(ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds()))
        .await;

    assert_eq!(result.status, 502);
    assert_eq!(result.error.as_deref(), Some("[502]: connection refused"));
    assert_eq!(json_body(result.response)["error"]["code"], "bad_gateway");
}

#[tokio::test]
async fn translated_stream_has_all_deltas_and_one_done() {
    let client = ScriptedClient::new(vec![Reply::Stream(chunked(vec![Bytes::from_static(
        CLAUDE_STREAM.as_bytes(),
    )]))]);
    let (core, _) = core_with(StubProvider::new("claude-stub", WireFormat::Claude), client.clone());
    let hooks = Arc::new(Recorder::default());

    let result = core
        .handle(ChatRequest::new(stream_request("claude-x"), "claude-stub", "claude-x", creds()).with_hooks(hooks.clone()))
        .await;
    assert!(result.success);
    let text = drain(result.response).await;

    let (content, done) = openai_text(&text);
    assert_eq!(content, "One, two, thrée.");
    assert_eq!(done, 1);
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(hooks.successes.load(Ordering::SeqCst), 1);

    let sent = client.seen_body(0);
    assert_eq!(sent["model"], "claude-x");
    assert_eq!(sent["max_tokens"], 4096);
    assert_eq!(header_get(&client.seen()[0].headers, "accept"), Some("text/event-stream"));
}

#[tokio::test]
async fn arbitrary_chunking_yields_the_same_client_stream() {
    let raw = CLAUDE_STREAM.as_bytes();
    let mut expected = None;
    for size in [raw.len(), 1, 7, 64] {
        let parts: Vec<Bytes> = raw.chunks(size).map(Bytes::copy_from_slice).collect();
        let client = ScriptedClient::new(vec![Reply::Stream(chunked(parts))]);
        let (core, _) = core_with(StubProvider::new("claude-stub", WireFormat::Claude), client);
        let result = core
            .handle(ChatRequest::new(stream_request("claude-x"), "claude-stub", "claude-x", creds()))
            .await;
        let decoded = openai_text(&drain(result.response).await);
        match &expected {
            None => expected = Some(decoded),
            Some(first) => assert_eq!(&decoded, first, "chunk size {size}"),
        }
    }
}

#[tokio::test]
async fn same_format_stream_is_passed_through() {
    let raw = "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}],\"vendor\":true}\n\ndata: [DONE]\n\n";
    let client = ScriptedClient::new(vec![Reply::Stream(chunked(vec![
        Bytes::copy_from_slice(&raw.as_bytes()[..10]),
        Bytes::copy_from_slice(&raw.as_bytes()[10..]),
    ]))]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client);

    let result = core
        .handle(ChatRequest::new(stream_request("gpt-4o"), "stub", "gpt-4o", creds()))
        .await;
    assert_eq!(drain(result.response).await, raw);
}

#[tokio::test]
async fn client_disconnect_aborts_the_upstream_stream() {
    let (upstream_tx, upstream_rx) = mpsc::channel(4);
    let client = ScriptedClient::new(vec![Reply::Stream(upstream_rx)]);
    let (core, _) = core_with(StubProvider::new("claude-stub", WireFormat::Claude), client);
    let hooks = Arc::new(Recorder::default());

    let result = core
        .handle(ChatRequest::new(stream_request("claude-x"), "claude-stub", "claude-x", creds()).with_hooks(hooks.clone()))
        .await;
    let ProxyResponse::Stream { mut body, .. } = result.response else {
        panic!("expected a stream response");
    };

    let first_frame = CLAUDE_STREAM.split_inclusive("\n\n").next().unwrap();
    upstream_tx.send(Ok(Bytes::from(first_frame))).await.unwrap();
    assert!(body.recv().await.is_some());
    drop(body);

    tokio::time::timeout(Duration::from_secs(1), upstream_tx.closed())
        .await
        .expect("upstream was not released");
    assert_eq!(hooks.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_before_headers_is_client_abort() {
    let client = ScriptedClient::new(vec![Reply::Hang]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client);
    let hooks = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();

    let request = ChatRequest::new(json!({"messages": [{"role": "user", "content": "hi"}], "stream": false}), "stub", "gpt-4o", creds())
        .with_hooks(hooks.clone())
        .with_cancel(cancel.clone());
    let call = tokio::spawn(async move { core.handle(request).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = call.await.unwrap();
    assert_eq!(result.status, 499);
    assert_eq!(result.error.as_deref(), Some("Request aborted"));
    assert_eq!(hooks.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warmup_request_never_reaches_upstream() {
    let client = ScriptedClient::new(Vec::new());
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::Claude), client.clone());

    let result = core
        .handle(ChatRequest::new(
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "Warmup"}], "stream": false}),
            "stub",
            "gpt-4o",
            Credentials::default(),
        ))
        .await;

    assert!(result.success);
    assert_eq!(json_body(result.response)["choices"][0]["message"]["content"], "OK");
    assert!(client.seen().is_empty());
}

#[tokio::test]
async fn unknown_provider_and_missing_credentials_are_reported() {
    let client = ScriptedClient::new(Vec::new());
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client.clone());
    let body = json!({"messages": [{"role": "user", "content": "hi"}], "stream": false});

    let result = core
        .handle(ChatRequest::new(body.clone(), "nope", "gpt-4o", creds()))
        .await;
    assert_eq!(result.status, 400);

    let result = core
        .handle(ChatRequest::new(body, "stub", "gpt-4o", Credentials::default()))
        .await;
    assert_eq!(result.status, 401);
    assert!(result.error.unwrap().contains("accessToken"));
    assert!(client.seen().is_empty());
}

#[tokio::test]
async fn missing_stream_flag_means_streaming() {
    let raw = "data: {\"id\":\"c\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
    let client = ScriptedClient::new(vec![Reply::Stream(chunked(vec![Bytes::from_static(raw.as_bytes())]))]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client.clone());

    let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
    let result = core.handle(ChatRequest::new(body, "stub", "gpt-4o", creds())).await;

    assert!(client.seen()[0].is_stream);
    assert_eq!(drain(result.response).await, raw);
}

#[tokio::test]
async fn endpoint_format_wins_over_body_detection() {
    let completion = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
    });
    let client = ScriptedClient::new(vec![Reply::Json(200, completion)]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client);

    // Nothing in this body marks it as a messages request.
    let body = json!({"model": "gpt-4o", "max_tokens": 16, "stream": false, "messages": [{"role": "user", "content": "hi"}]});
    let result = core
        .handle(ChatRequest::new(body, "stub", "gpt-4o", creds()).with_source(WireFormat::Claude))
        .await;

    assert!(result.success);
    let reply = json_body(result.response);
    assert_eq!(reply["type"], "message");
    assert_eq!(reply["content"][0]["text"], "hello");
}

#[tokio::test]
async fn text_blocks_with_max_tokens_are_answered_as_messages() {
    let completion = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}]
    });
    let client = ScriptedClient::new(vec![Reply::Json(200, completion)]);
    let (core, _) = core_with(StubProvider::new("stub", WireFormat::OpenAIChat), client.clone());

    let body = json!({
        "model": "gpt-4o",
        "max_tokens": 16,
        "stream": false,
        "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
    });
    let result = core.handle(ChatRequest::new(body, "stub", "gpt-4o", creds())).await;

    assert_eq!(json_body(result.response)["type"], "message");
    assert!(client.seen_body(0)["messages"][0]["content"].to_string().contains("hi"));
}

#[tokio::test]
async fn upstream_read_failure_ends_the_client_stream_with_an_error() {
    let (upstream_tx, upstream_rx) = mpsc::channel(8);
    let client = ScriptedClient::new(vec![Reply::Stream(upstream_rx)]);
    let (core, _) = core_with(StubProvider::new("claude-stub", WireFormat::Claude), client);

    let result = core
        .handle(ChatRequest::new(stream_request("claude-x"), "claude-stub", "claude-x", creds()))
        .await;
    for frame in CLAUDE_STREAM.split_inclusive("\n\n").take(3) {
        upstream_tx.send(Ok(Bytes::from(frame))).await.unwrap();
    }
    upstream_tx
        .send(Err(UpstreamFailure::Transport {
            kind: UpstreamTransportErrorKind::ReadTimeout,
            message: "no data from upstream for 120s".to_string(),
        }))
        .await
        .unwrap();
    drop(upstream_tx);

    let text = drain(result.response).await;
    let (content, done) = openai_text(&text);
    assert_eq!(content, "One, ");
    assert_eq!(done, 0);
    assert!(text.contains("[502]: no data from upstream for 120s"));
    assert!(!text.contains("\"finish_reason\":\"stop\""));
}

#[tokio::test]
async fn upstream_stream_cut_before_message_stop_is_an_error() {
    let truncated: String = CLAUDE_STREAM.split_inclusive("\n\n").take(5).collect();
    let client = ScriptedClient::new(vec![Reply::Stream(chunked(vec![Bytes::from(truncated)]))]);
    let (core, _) = core_with(StubProvider::new("claude-stub", WireFormat::Claude), client);

    let result = core
        .handle(ChatRequest::new(stream_request("claude-x"), "claude-stub", "claude-x", creds()))
        .await;
    let text = drain(result.response).await;

    let (content, done) = openai_text(&text);
    assert_eq!(content, "One, two, thrée.");
    assert_eq!(done, 0);
    assert!(text.contains("upstream stream ended before completion"));
    assert!(!text.contains("\"finish_reason\":\"stop\""));
}
