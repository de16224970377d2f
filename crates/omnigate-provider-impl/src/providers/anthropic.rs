use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{Headers, ProviderResult, RouteCtx, UpstreamProvider, header_set};

const PROVIDER_NAME: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) const CLAUDE_MODELS: &[&str] = &[
    "claude-opus-4-1-20250805",
    "claude-sonnet-4-5-20250929",
    "claude-sonnet-4-20250514",
    "claude-3-5-haiku-20241022",
];

/// Anthropic Messages API with an API key.
#[derive(Debug, Default)]
pub struct AnthropicProvider;

impl UpstreamProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::Claude
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/v1/messages", base.trim_end_matches('/')))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        header_set(&mut headers, "x-api-key", ctx.credentials.require_api_key()?);
        header_set(&mut headers, "anthropic-version", ANTHROPIC_VERSION);
        Ok(headers)
    }

    fn models(&self) -> &'static [&'static str] {
        CLAUDE_MODELS
    }
}
