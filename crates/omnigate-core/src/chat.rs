//! End-to-end lifecycle of one chat call.
//!
//! `detect -> bypass check -> translate -> dispatch -> [401/403: refresh, retry once]
//! -> translate or relay the response`.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omnigate_common::{BypassRules, GatewayConfig};
use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    Credentials, Headers, ProviderRegistry, RefreshCtx, RefreshPolicy, RouteCtx,
    UpstreamBody, UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse, UpstreamProvider,
    UpstreamStream,
};
use omnigate_transform::{
    PartPolicy, TranslateCtx, TranslatorRegistry, detect_format, ensure_initialized,
    needs_translation,
};

use crate::bypass::{bypass_reply, is_bypass};
use crate::controller::{AbortGuard, StreamController};
use crate::error::{ChatError, ChatResult};
use crate::hooks::{ChatHooks, NoopHooks};
use crate::relay::{StreamRelay, spawn_relay};
use crate::request_log::{RequestLog, RequestLogSink, mask_headers};

/// Process-wide knobs of the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ChatSettings {
    pub bypass: BypassRules,
    pub part_policy: PartPolicy,
    pub refresh: RefreshPolicy,
}

impl ChatSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            bypass: config.bypass.clone(),
            part_policy: config.unsupported_parts,
            refresh: config.refresh.policy(),
        }
    }
}

/// The request as the client sent it, for the request log.
#[derive(Debug, Clone, Default)]
pub struct ClientRawRequest {
    pub endpoint: String,
    pub headers: Headers,
}

/// One chat call, already resolved to a provider and model.
pub struct ChatRequest {
    pub body: Value,
    pub provider: String,
    pub model: String,
    pub credentials: Credentials,
    pub base_url: Option<String>,
    /// Explicit streaming flag, for formats that signal it outside the body.
    pub stream: Option<bool>,
    /// Client format implied by the endpoint. Detected from the body when unset.
    pub source: Option<WireFormat>,
    pub hooks: Arc<dyn ChatHooks>,
    /// Cancelling this aborts the call as a client disconnect.
    pub cancel: CancellationToken,
    pub client_request: Option<ClientRawRequest>,
}

impl ChatRequest {
    pub fn new(body: Value, provider: impl Into<String>, model: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            body,
            provider: provider.into(),
            model: model.into(),
            credentials,
            base_url: None,
            stream: None,
            source: None,
            hooks: Arc::new(NoopHooks),
            cancel: CancellationToken::new(),
            client_request: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ChatHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_source(mut self, source: WireFormat) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Clone)]
pub struct ChatCore {
    providers: Arc<ProviderRegistry>,
    client: Arc<dyn UpstreamClient>,
    settings: ChatSettings,
    request_log: Option<RequestLogSink>,
}

impl ChatCore {
    pub fn new(providers: Arc<ProviderRegistry>, client: Arc<dyn UpstreamClient>, settings: ChatSettings) -> Self {
        Self {
            providers,
            client,
            settings,
            request_log: None,
        }
    }

    pub fn with_request_log(mut self, sink: RequestLogSink) -> Self {
        self.request_log = Some(sink);
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Run one call. Never fails: errors come back as a non-success result.
    pub async fn handle(&self, req: ChatRequest) -> ChatResult {
        let provider = req.provider.clone();
        let model = req.model.clone();
        match self.run(req).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    event = "chat_failed",
                    provider = %provider,
                    model = %model,
                    status = err.status(),
                    error = %err,
                );
                ChatResult::error(&err)
            }
        }
    }

    async fn run(&self, req: ChatRequest) -> Result<ChatResult, ChatError> {
        let registry = ensure_initialized().await?;
        let ChatRequest {
            body,
            provider: provider_name,
            model,
            mut credentials,
            base_url,
            stream,
            source,
            hooks,
            cancel,
            client_request,
        } = req;

        let source = source.unwrap_or_else(|| detect_format(&body));
        let stream = stream
            .or_else(|| body.get("stream").and_then(Value::as_bool))
            .unwrap_or(true);

        if is_bypass(&self.settings.bypass, &model, &body) {
            info!(event = "chat_bypassed", source = %source, model = %model, stream);
            return Ok(bypass_reply(registry, &self.settings.bypass, source, &model, stream)?);
        }

        let provider = self.providers.get(&provider_name).ok_or_else(|| ChatError::Provider {
            status: 400,
            message: format!("unknown provider: {provider_name}"),
        })?;
        let target = provider.target_format(&model);
        info!(
            event = "chat_detected",
            source = %source,
            target = %target,
            provider = %provider.name(),
            model = %model,
            stream,
        );

        let log = match &self.request_log {
            Some(sink) => sink.session(source, target, &model),
            None => RequestLog::disabled(),
        };
        if let Some(client_request) = &client_request {
            log.client_raw_request(&client_request.endpoint, &body, &client_request.headers);
        }
        log.raw_request(&body);
        log.format_info(source, target, provider.name(), &model, stream);

        let ctx = TranslateCtx::new(source, target, &model, stream)
            .with_provider(provider.name(), &credentials.provider_specific_data)
            .with_part_policy(self.settings.part_policy);
        let mut translated = registry.translate_request(&ctx, body)?;
        if target.carries_model()
            && let Some(object) = translated.as_object_mut()
        {
            object.insert("model".to_string(), Value::String(model.clone()));
        }

        let upstream_req = build_request(&*provider, &model, stream, &credentials, base_url.as_deref(), &translated)?;
        log.converted_request(&upstream_req.url, &upstream_req.headers, &translated);

        let controller = StreamController::new(&cancel, hooks.clone(), provider.name(), &model);
        controller.begin();
        let guard = AbortGuard::new(controller.clone());

        let mut resp = match self.dispatch(&controller, upstream_req, provider.name(), &model).await {
            Ok(resp) => resp,
            Err(err) => return Err(self.settle(&controller, &log, err, Some(&translated))),
        };

        if matches!(resp.status, 401 | 403) {
            let refresh_ctx = RefreshCtx {
                client: &*self.client,
                policy: self.settings.refresh,
            };
            let refreshed = tokio::select! {
                biased;
                _ = controller.token().cancelled() => {
                    return Err(self.settle(&controller, &log, ChatError::ClientAbort, None));
                }
                result = provider.refresh(&refresh_ctx, &credentials) => result,
            };
            match refreshed {
                Ok(Some(update)) => {
                    info!(
                        event = "credential_refresh",
                        provider = %provider.name(),
                        outcome = "refreshed",
                    );
                    credentials.apply(&update);
                    hooks.on_credentials_refreshed(&update).await;
                    let retry_req =
                        build_request(&*provider, &model, stream, &credentials, base_url.as_deref(), &translated)?;
                    resp = match self.dispatch(&controller, retry_req, provider.name(), &model).await {
                        Ok(retry) => retry,
                        Err(err) => return Err(self.settle(&controller, &log, err, Some(&translated))),
                    };
                }
                Ok(None) => {
                    debug!(event = "credential_refresh", provider = %provider.name(), outcome = "unsupported");
                }
                Err(err) => {
                    warn!(
                        event = "credential_refresh",
                        provider = %provider.name(),
                        outcome = "failed",
                        error = %err,
                    );
                }
            }
        }

        if !resp.is_success() {
            let status = resp.status;
            let body = resp.body.collect().await;
            log.upstream_response(status, &body);
            let err = ChatError::from(omnigate_provider_core::UpstreamFailure::Http {
                status,
                headers: resp.headers,
                body,
            });
            return Err(self.settle(&controller, &log, err, Some(&translated)));
        }

        if !stream {
            let body = tokio::select! {
                biased;
                _ = controller.token().cancelled() => {
                    return Err(self.settle(&controller, &log, ChatError::ClientAbort, None));
                }
                body = resp.body.collect() => body,
            };
            log.upstream_response(resp.status, &body);
            let body = match translate_body(registry, target, source, body) {
                Ok(body) => body,
                Err(err) => return Err(self.settle(&controller, &log, err, Some(&translated))),
            };
            hooks.on_request_success().await;
            controller.complete();
            guard.disarm();
            info!(
                event = "downstream_responded",
                provider = %provider.name(),
                model = %model,
                stream = false,
                bytes = body.len(),
            );
            return Ok(ChatResult::json(body));
        }

        hooks.on_request_success().await;
        let relay = StreamRelay::new(target, source);
        info!(
            event = "downstream_responded",
            provider = %provider.name(),
            model = %model,
            stream = true,
            passthrough = relay.is_passthrough(),
        );
        let upstream = into_stream(resp.body);
        let rx = spawn_relay(upstream, relay, controller, log);
        guard.disarm();
        Ok(ChatResult::stream(source, rx))
    }

    /// One upstream call, raced against cancellation.
    async fn dispatch(
        &self,
        controller: &StreamController,
        req: UpstreamHttpRequest,
        provider: &str,
        model: &str,
    ) -> Result<UpstreamHttpResponse, ChatError> {
        info!(
            event = "upstream_request",
            provider = %provider,
            model = %model,
            url = %req.url,
            stream = req.is_stream,
        );
        debug!(event = "upstream_headers", headers = ?mask_headers(&req.headers));
        let started = Instant::now();
        let resp = tokio::select! {
            biased;
            _ = controller.token().cancelled() => Err(ChatError::ClientAbort),
            result = self.client.send(req) => result.map_err(ChatError::from),
        }?;
        info!(
            event = "upstream_response",
            provider = %provider,
            model = %model,
            status = resp.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
        Ok(resp)
    }

    /// Record a terminal error on the controller and the request log.
    fn settle(&self, controller: &StreamController, log: &RequestLog, err: ChatError, body: Option<&Value>) -> ChatError {
        match err {
            ChatError::ClientAbort => {
                controller.abort();
            }
            _ => {
                controller.fail();
                log.error(&err.message(), body);
            }
        }
        err
    }
}

fn build_request(
    provider: &dyn UpstreamProvider,
    model: &str,
    stream: bool,
    credentials: &Credentials,
    base_url: Option<&str>,
    body: &Value,
) -> Result<UpstreamHttpRequest, ChatError> {
    let route = RouteCtx {
        model,
        stream,
        credentials,
        base_url,
    };
    Ok(provider.build_request(&route, body.clone())?)
}

/// Non-stream upstream body in the client's format. Same format: verbatim.
fn translate_body(
    registry: &TranslatorRegistry,
    target: WireFormat,
    source: WireFormat,
    body: Bytes,
) -> Result<Bytes, ChatError> {
    if !needs_translation(target, source) {
        return Ok(body);
    }
    let value: Value = serde_json::from_slice(&body)
        .map_err(|err| ChatError::UpstreamTransport(format!("invalid upstream response: {err}")))?;
    let value = registry.translate_response(target, source, value)?;
    serde_json::to_vec(&value)
        .map(Bytes::from)
        .map_err(|err| ChatError::Provider {
            status: 500,
            message: err.to_string(),
        })
}

fn into_stream(body: UpstreamBody) -> UpstreamStream {
    match body {
        UpstreamBody::Stream(rx) => rx,
        UpstreamBody::Bytes(bytes) => {
            let (tx, rx) = mpsc::channel(1);
            if !bytes.is_empty() {
                let _ = tx.try_send(Ok(bytes));
            }
            rx
        }
    }
}
