use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{
    Headers, ProviderError, ProviderResult, RouteCtx, UpstreamProvider, bearer,
};

const PROVIDER_NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "o3", "o4-mini"];

#[derive(Debug, Default)]
pub struct OpenAIProvider;

impl UpstreamProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIChat
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        bearer(&mut headers, ctx.credentials.require_api_key()?);
        Ok(headers)
    }

    fn models(&self) -> &'static [&'static str] {
        MODELS
    }
}

/// Any endpoint speaking OpenAI chat completions at `{baseUrl}/chat/completions`.
#[derive(Debug, Default)]
pub struct OpenAICompatibleProvider;

impl UpstreamProvider for OpenAICompatibleProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn alias(&self) -> Option<&'static str> {
        Some("oc")
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::OpenAIChat
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx
            .base_url
            .or_else(|| ctx.credentials.data_str("baseUrl"))
            .ok_or_else(|| ProviderError::InvalidConfig("openai-compatible requires baseUrl".to_string()))?;
        Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        if let Some(token) = ctx.credentials.bearer_token() {
            bearer(&mut headers, token);
        }
        Ok(headers)
    }
}
