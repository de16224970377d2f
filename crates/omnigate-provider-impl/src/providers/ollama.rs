use serde_json::Value;

use omnigate_protocol::WireFormat;
use omnigate_provider_core::{Headers, ProviderResult, RouteCtx, UpstreamProvider, bearer};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Default)]
pub struct OllamaProvider;

impl UpstreamProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_format(&self) -> WireFormat {
        WireFormat::Ollama
    }

    fn build_url(&self, ctx: &RouteCtx<'_>) -> ProviderResult<String> {
        let base = ctx
            .base_url
            .or_else(|| ctx.credentials.data_str("baseUrl"))
            .unwrap_or(DEFAULT_BASE_URL);
        Ok(format!("{}/api/chat", base.trim_end_matches('/')))
    }

    /// Local instances take no auth; a key is forwarded for hosted ones.
    fn build_headers(&self, ctx: &RouteCtx<'_>, _body: &Value) -> ProviderResult<Headers> {
        let mut headers = Headers::new();
        if let Some(key) = ctx.credentials.api_key.as_deref() {
            bearer(&mut headers, key);
        }
        Ok(headers)
    }
}
