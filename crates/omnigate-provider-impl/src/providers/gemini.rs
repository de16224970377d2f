use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{Headers, ProviderResult, RouteCtx, UpstreamProvider, header_set};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) const GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
];

/// `generateContent` / `streamGenerateContent?alt=sse` verb for a model.
pub(crate) fn generate_verb(stream: bool) -> &'static str {
    if stream {
        "streamGenerateContent?alt=sse"
    } else {
        "generateContent"
    }
}

/// Google AI Studio with an API key. The model travels in the url.
#[derive(Debug, Default)]
pub struct GeminiProvider;

impl UpstreamProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::Gemini
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx.base_url.unwrap_or(DEFAULT_BASE_URL);
        let model = ctx.model.strip_prefix("models/").unwrap_or(ctx.model);
        Ok(format!(
            "{}/models/{}:{}",
            base.trim_end_matches('/'),
            urlencoding::encode(model),
            generate_verb(ctx.stream)
        ))
    }

    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        header_set(&mut headers, "x-goog-api-key", ctx.credentials.require_api_key()?);
        Ok(headers)
    }

    fn models(&self) -> &'static [&'static str] {
        GEMINI_MODELS
    }
}
