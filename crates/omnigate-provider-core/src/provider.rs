use async_trait::async_trait;
use serde_json::Value;

use omnigate_protocol::{StreamFraming, WireFormat};

use crate::credentials::{CredentialUpdate, Credentials};
use crate::errors::{ProviderError, ProviderResult};
use crate::headers::{Headers, header_get, header_set};
use crate::refresh::RefreshPolicy;
use crate::upstream::{UpstreamClient, UpstreamHttpRequest};

/// Inputs for building one upstream call.
#[derive(Debug, Clone, Copy)]
pub struct RouteCtx<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub credentials: &'a Credentials,
    /// Configured base url override, if any.
    pub base_url: Option<&'a str>,
}

/// Inputs for a credential refresh.
#[derive(Clone, Copy)]
pub struct RefreshCtx<'a> {
    pub client: &'a dyn UpstreamClient,
    pub policy: RefreshPolicy,
}

/// A per-model target format exception. A pattern ending in `*` matches by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFormatRule {
    pub pattern: &'static str,
    pub format: WireFormat,
}

impl ModelFormatRule {
    pub const fn new(pattern: &'static str, format: WireFormat) -> Self {
        Self { pattern, format }
    }

    pub fn matches(&self, model: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => model.starts_with(prefix),
            None => model == self.pattern,
        }
    }
}

/// Routing and refresh capability of one upstream provider.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Short prefix accepted in model strings, e.g. `cc` for `claude`.
    fn alias(&self) -> Option<&'static str> {
        None
    }

    fn default_format(&self) -> WireFormat;

    /// Consulted before [`UpstreamProvider::default_format`].
    fn model_formats(&self) -> &'static [ModelFormatRule] {
        &[]
    }

    fn target_format(&self, model: &str) -> WireFormat {
        self.model_formats()
            .iter()
            .find(|rule| rule.matches(model))
            .map(|rule| rule.format)
            .unwrap_or_else(|| self.default_format())
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String>;

    /// Auth and provider-specific headers. Content negotiation headers are
    /// added by [`UpstreamProvider::build_request`].
    fn build_headers(&self, ctx: &RouteCtx<'_>, body: &Value) -> ProviderResult<Headers>;

    /// Last chance to add fields the upstream requires.
    fn finalize_body(&self, _ctx: &RouteCtx<'_>, body: Value) -> ProviderResult<Value> {
        Ok(body)
    }

    /// Obtain replacement credentials. `Ok(None)` means this provider cannot
    /// refresh, and the original upstream error stands.
    async fn refresh(
        &self,
        _ctx: &RefreshCtx<'_>,
        _credentials: &Credentials,
    ) -> ProviderResult<Option<CredentialUpdate>> {
        Ok(None)
    }

    /// Model ids advertised by the model listing endpoints.
    fn models(&self) -> &'static [&'static str] {
        &[]
    }

    fn build_request(&self, ctx: &RouteCtx<'_>, body: Value) -> ProviderResult<UpstreamHttpRequest> {
        let url = self.build_url(ctx)?;
        let body = self.finalize_body(ctx, body)?;
        let mut headers = self.build_headers(ctx, &body)?;
        if header_get(&headers, "content-type").is_none() {
            header_set(&mut headers, "Content-Type", "application/json");
        }
        let framing = self.target_format(ctx.model).stream_framing();
        if ctx.stream && framing == StreamFraming::Sse {
            header_set(&mut headers, "Accept", "text/event-stream");
        }
        let bytes = serde_json::to_vec(&body)
            .map_err(|err| ProviderError::Other(format!("encode upstream body: {err}")))?;
        let mut req = UpstreamHttpRequest::post(url, headers, bytes);
        req.is_stream = ctx.stream;
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_and_exact_rules() {
        let prefix = ModelFormatRule::new("gpt-5*", WireFormat::OpenAIResponses);
        assert!(prefix.matches("gpt-5-codex"));
        assert!(!prefix.matches("gpt-4o"));
        let exact = ModelFormatRule::new("o3", WireFormat::OpenAIResponses);
        assert!(exact.matches("o3"));
        assert!(!exact.matches("o3-mini"));
    }
}
